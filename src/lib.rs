//! # ferroreq
//!
//! A bounded multiplexing window for nonblocking MPI sends and receives.
//!
//! Instead of holding one request per operation and waiting on each, submit
//! operations into a [`RequestManager`] together with a handle of your choice,
//! then poll it: every poll checks all in-flight operations with one bulk
//! completion call and hands back the handle, buffer and status of each
//! operation that finished. Operations that fail are reported with their handle, so a
//! partially failed batch never loses track of *which* operation failed.
//!
//! The manager is generic over a [`Transport`]. With the `mpi` feature the
//! crate compiles a thin C shim and provides [`MpiTransport`] together with a
//! small pass-through layer ([`Mpi`], [`Communicator`], [`Request`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ferroreq::{Mpi, MpiTransport, RequestManager};
//!
//! let mpi = Mpi::init()?;
//! let world = mpi.world();
//! let peer = (world.rank() + 1) % world.size();
//!
//! let mut manager = RequestManager::new(MpiTransport::new(&mpi, world)?, 8)?;
//! for i in 0..8 {
//!     manager.send(vec![i as f64; 1024], peer, i as i32, i)?;
//! }
//!
//! while !manager.is_empty() {
//!     for done in manager.poll()? {
//!         println!("chunk {} delivered ({} values)", done.handle, done.buffer.len());
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mpi"))]
//! # fn main() {}
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `mpi`   | C shim, [`MpiTransport`] and the pass-through layer | system MPI |
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (submit at `trace`, completions at
//! `debug`, partial failures and drop-time waits at `warn`). Install any
//! subscriber to see them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod buffer;
mod datatype;
mod error;
mod manager;
mod status;
mod transport;

#[cfg(feature = "mpi")]
mod comm;
#[cfg(feature = "mpi")]
mod ffi;
#[cfg(feature = "mpi")]
mod mpi_transport;
#[cfg(feature = "mpi")]
mod request;

pub use buffer::{Buffer, BufferMut};
pub use datatype::{DatatypeTag, MpiDatatype};
pub use error::{describe_error, unknown_error, Error, Result, SUCCESS};
pub use manager::{
    Completion, PollError, RequestManager, StatusErrors, StatusFailure, SubmitError,
};
pub use status::{RawStatus, Status};
pub use transport::{SomeOutcome, Transport};

#[cfg(feature = "mpi")]
pub use comm::{Communicator, ErrorHandler};
#[cfg(feature = "mpi")]
pub use error::error_string;
#[cfg(feature = "mpi")]
pub use mpi_transport::{HandleKind, MpiTransport, RawRequest};
#[cfg(feature = "mpi")]
pub use request::Request;

/// Wildcard source rank for receives (`MPI_ANY_SOURCE`).
pub const ANY_SOURCE: i32 = -1;

/// Wildcard tag for receives (`MPI_ANY_TAG`).
pub const ANY_TAG: i32 = -1;

/// Null peer (`MPI_PROC_NULL`): a send to it or a receive from it completes
/// at once without transferring data.
pub const PROC_NULL: i32 = -2;

#[cfg(feature = "mpi")]
pub use environment::Mpi;

#[cfg(feature = "mpi")]
mod environment {
    use std::marker::PhantomData;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tracing::debug;

    use crate::comm::Communicator;
    use crate::error::{Error, Result};
    use crate::ffi;

    /// Global flag tracking whether MPI has been initialized
    static MPI_INITIALIZED: AtomicBool = AtomicBool::new(false);

    /// MPI environment handle.
    ///
    /// Only one instance can exist at a time. When dropped, it finalizes MPI.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ferroreq::Mpi;
    ///
    /// let mpi = Mpi::init().expect("Failed to initialize MPI");
    /// let world = mpi.world();
    /// println!("Running on {} processes", world.size());
    /// // MPI is finalized when `mpi` goes out of scope
    /// ```
    pub struct Mpi {
        /// Marker to make Mpi !Send and !Sync
        _marker: PhantomData<*const ()>,
    }

    impl Mpi {
        /// Initialize MPI.
        ///
        /// # Errors
        ///
        /// Returns an error if MPI is already initialized or if initialization fails.
        pub fn init() -> Result<Self> {
            if MPI_INITIALIZED.swap(true, Ordering::SeqCst) {
                return Err(Error::AlreadyInitialized);
            }

            let ret = unsafe { ffi::ferroreq_init() };
            if let Err(err) = Error::check(ret) {
                MPI_INITIALIZED.store(false, Ordering::SeqCst);
                return Err(err);
            }

            debug!("MPI initialized");
            Ok(Mpi {
                _marker: PhantomData,
            })
        }

        /// Get a handle to `MPI_COMM_WORLD`.
        pub fn world(&self) -> Communicator {
            Communicator::world()
        }

        /// Get a handle to `MPI_COMM_SELF`.
        pub fn self_comm(&self) -> Communicator {
            Communicator::self_comm()
        }

        /// Terminate every process in `MPI_COMM_WORLD` with `errorcode`.
        pub fn abort(&self, errorcode: i32) -> ! {
            self.world().abort(errorcode)
        }

        /// Check if MPI has been initialized.
        pub fn is_initialized() -> bool {
            let mut flag: i32 = 0;
            unsafe { ffi::ferroreq_initialized(&mut flag) };
            flag != 0
        }

        /// Check if MPI has been finalized.
        pub fn is_finalized() -> bool {
            let mut flag: i32 = 0;
            unsafe { ffi::ferroreq_finalized(&mut flag) };
            flag != 0
        }
    }

    impl Drop for Mpi {
        fn drop(&mut self) {
            if MPI_INITIALIZED.load(Ordering::SeqCst) {
                unsafe {
                    ffi::ferroreq_finalize();
                }
                debug!("MPI finalized");
                MPI_INITIALIZED.store(false, Ordering::SeqCst);
            }
        }
    }
}
