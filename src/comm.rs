//! Safe wrappers for MPI communicator operations.
//!
//! This is the pass-through layer: each method is one call into MPI. For
//! many concurrent nonblocking operations use a
//! [`RequestManager`](crate::RequestManager) on top of an
//! [`MpiTransport`](crate::MpiTransport) instead of individual [`Request`]s.

use std::marker::PhantomData;

use crate::datatype::MpiDatatype;
use crate::error::{Error, Result};
use crate::ffi;
use crate::request::Request;
use crate::status::{RawStatus, Status};

const COMM_WORLD: i32 = 0;
const COMM_SELF: i32 = 1;

/// What MPI does when a call on a communicator fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandler {
    /// Abort every process (`MPI_ERRORS_ARE_FATAL`, the MPI default).
    Fatal,
    /// Return the error code to the caller (`MPI_ERRORS_RETURN`).
    Return,
}

/// An MPI communicator.
///
/// # Example
///
/// ```no_run
/// use ferroreq::Mpi;
///
/// let mpi = Mpi::init().unwrap();
/// let world = mpi.world();
///
/// println!("I am rank {} of {}", world.rank(), world.size());
/// ```
#[derive(Clone)]
pub struct Communicator {
    handle: i32,
    /// Marker to prevent Send/Sync (MPI is initialized single-threaded)
    _marker: PhantomData<*mut ()>,
}

impl Communicator {
    /// `MPI_COMM_WORLD`.
    pub(crate) fn world() -> Self {
        Communicator {
            handle: COMM_WORLD,
            _marker: PhantomData,
        }
    }

    /// `MPI_COMM_SELF`.
    pub(crate) fn self_comm() -> Self {
        Communicator {
            handle: COMM_SELF,
            _marker: PhantomData,
        }
    }

    /// Get the raw communicator handle (for advanced use).
    pub fn raw_handle(&self) -> i32 {
        self.handle
    }

    /// Get the rank of the calling process in this communicator.
    pub fn rank(&self) -> i32 {
        let mut rank: i32 = 0;
        unsafe { ffi::ferroreq_comm_rank(self.handle, &mut rank) };
        rank
    }

    /// Get the number of processes in this communicator.
    pub fn size(&self) -> i32 {
        let mut size: i32 = 0;
        unsafe { ffi::ferroreq_comm_size(self.handle, &mut size) };
        size
    }

    /// Get the processor name for this process.
    pub fn processor_name(&self) -> Result<String> {
        let max = unsafe { ffi::ferroreq_max_processor_name() }.max(1);
        let mut buf = vec![0u8; max as usize];
        let mut len: i32 = 0;
        let ret = unsafe { ffi::ferroreq_get_processor_name(buf.as_mut_ptr().cast(), &mut len) };
        Error::check(ret)?;
        buf.truncate(len.clamp(0, max) as usize);
        String::from_utf8(buf).map_err(|_| Error::Internal("Invalid UTF-8 in processor name".into()))
    }

    /// Choose whether failing calls abort or return their error code.
    ///
    /// Partial failures of a [`RequestManager`](crate::RequestManager) poll are
    /// only observable with [`ErrorHandler::Return`].
    pub fn set_error_handler(&self, handler: ErrorHandler) -> Result<()> {
        let fatal = i32::from(handler == ErrorHandler::Fatal);
        let ret = unsafe { ffi::ferroreq_comm_set_errhandler(self.handle, fatal) };
        Error::check(ret)
    }

    /// Terminate every process in this communicator with `errorcode`.
    pub fn abort(&self, errorcode: i32) -> ! {
        unsafe { ffi::ferroreq_abort(self.handle, errorcode) };
        // MPI_Abort is not required to terminate the caller
        std::process::abort()
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Barrier synchronization.
    ///
    /// No process returns until every process has entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        let ret = unsafe { ffi::ferroreq_barrier(self.handle) };
        Error::check(ret)
    }

    // ========================================================================
    // Point-to-Point Communication
    // ========================================================================

    /// Blocking send of `data` to rank `dest`.
    pub fn send<T: MpiDatatype>(&self, data: &[T], dest: i32, tag: i32) -> Result<()> {
        let ret = unsafe {
            ffi::ferroreq_send(
                data.as_ptr().cast(),
                data.len() as i64,
                T::TAG as i32,
                dest,
                tag,
                self.handle,
            )
        };
        Error::check(ret)
    }

    /// Blocking receive into `data` from rank `source`.
    ///
    /// Use [`ANY_SOURCE`](crate::ANY_SOURCE) and [`ANY_TAG`](crate::ANY_TAG)
    /// as wildcards.
    pub fn recv<T: MpiDatatype>(&self, data: &mut [T], source: i32, tag: i32) -> Result<Status> {
        let mut raw = RawStatus::default();
        let ret = unsafe {
            ffi::ferroreq_recv(
                data.as_mut_ptr().cast(),
                data.len() as i64,
                T::TAG as i32,
                source,
                tag,
                self.handle,
                &mut raw,
            )
        };
        Error::check(ret)?;
        Ok(Status::new(raw, T::TAG))
    }

    /// Nonblocking send of `data` to rank `dest`.
    ///
    /// `data` stays borrowed until the returned request completes or is dropped.
    pub fn isend<'a, T: MpiDatatype>(&self, data: &'a [T], dest: i32, tag: i32) -> Result<Request<'a>> {
        let mut handle: i64 = 0;
        let ret = unsafe {
            ffi::ferroreq_isend(
                data.as_ptr().cast(),
                data.len() as i64,
                T::TAG as i32,
                dest,
                tag,
                self.handle,
                &mut handle,
            )
        };
        Error::check(ret)?;
        Ok(Request::new(handle, T::TAG))
    }

    /// Nonblocking receive into `data` from rank `source`.
    ///
    /// `data` stays borrowed until the returned request completes or is dropped.
    pub fn irecv<'a, T: MpiDatatype>(
        &self,
        data: &'a mut [T],
        source: i32,
        tag: i32,
    ) -> Result<Request<'a>> {
        let mut handle: i64 = 0;
        let ret = unsafe {
            ffi::ferroreq_irecv(
                data.as_mut_ptr().cast(),
                data.len() as i64,
                T::TAG as i32,
                source,
                tag,
                self.handle,
                &mut handle,
            )
        };
        Error::check(ret)?;
        Ok(Request::new(handle, T::TAG))
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.handle {
            COMM_WORLD => "MPI_COMM_WORLD",
            COMM_SELF => "MPI_COMM_SELF",
            _ => "MPI_Comm",
        };
        f.debug_tuple("Communicator").field(&name).finish()
    }
}
