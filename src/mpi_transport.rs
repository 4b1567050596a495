//! [`Transport`] implementation backed by MPI.
//!
//! Request tokens are stored as 64-bit integers whatever the MPI library's
//! handle representation is; [`HandleKind`] records which representation the
//! library uses. It is resolved once per process.

use std::marker::PhantomData;
use std::sync::OnceLock;

use tracing::debug;

use crate::comm::{Communicator, ErrorHandler};
use crate::datatype::MpiDatatype;
use crate::error::{error_string, lookup_error_string, Error, Result, SUCCESS};
use crate::ffi;
use crate::request::request_null;
use crate::status::RawStatus;
use crate::transport::{SomeOutcome, Transport};
use crate::Mpi;

/// How the MPI library represents its handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Integer handles (MPICH and derivatives).
    Integer,
    /// Pointer handles (Open MPI).
    Pointer,
}

impl HandleKind {
    /// The representation used by the linked MPI library.
    pub fn detect() -> Self {
        static KIND: OnceLock<HandleKind> = OnceLock::new();
        *KIND.get_or_init(|| match unsafe { ffi::ferroreq_handle_kind() } {
            0 => HandleKind::Integer,
            _ => HandleKind::Pointer,
        })
    }
}

/// An MPI request token as stored in a [`RequestManager`](crate::RequestManager)
/// slot. Defaults to `MPI_REQUEST_NULL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawRequest(i64);

impl RawRequest {
    /// The raw 64-bit handle.
    pub fn raw_handle(self) -> i64 {
        self.0
    }
}

impl Default for RawRequest {
    fn default() -> Self {
        RawRequest(request_null())
    }
}

type SomeFn = unsafe extern "C" fn(i64, *mut i64, *mut i32, *mut i32, *mut RawStatus) -> i32;

/// Nonblocking point-to-point messaging over one communicator.
///
/// The transport borrows the [`Mpi`] environment, so it (and any
/// [`RequestManager`](crate::RequestManager) holding it) is dropped before
/// MPI is finalized.
///
/// # Example
///
/// ```no_run
/// use ferroreq::{Mpi, MpiTransport, RequestManager, ANY_SOURCE, ANY_TAG};
///
/// let mpi = Mpi::init().unwrap();
/// let transport = MpiTransport::new(&mpi, mpi.world()).unwrap();
///
/// let mut manager = RequestManager::new(transport, 4).unwrap();
/// for i in 0..4 {
///     manager.recv(vec![0u8; 16], ANY_SOURCE, ANY_TAG, i).unwrap();
/// }
/// while !manager.is_empty() {
///     for done in manager.poll().unwrap() {
///         println!("inbox {} filled by rank {}", done.handle, done.status.source);
///         // `done.buffer` can be read here, then submitted again
///     }
/// }
/// ```
///
/// A transport cannot outlive the environment it was created from:
///
/// ```compile_fail
/// use ferroreq::{Mpi, MpiTransport};
///
/// let mpi = Mpi::init().unwrap();
/// let transport = MpiTransport::new(&mpi, mpi.world()).unwrap();
/// drop(mpi);
/// drop(transport);
/// ```
pub struct MpiTransport<'mpi> {
    comm: Communicator,
    err_in_status: i32,
    index_scratch: Vec<i32>,
    _env: PhantomData<&'mpi Mpi>,
}

impl<'mpi> MpiTransport<'mpi> {
    /// Create a transport on `comm`.
    ///
    /// Switches `comm` to [`ErrorHandler::Return`] so that per-request errors
    /// reach the caller instead of aborting the job.
    pub fn new(_mpi: &'mpi Mpi, comm: Communicator) -> Result<Self> {
        comm.set_error_handler(ErrorHandler::Return)?;
        let err_in_status = unsafe { ffi::ferroreq_err_in_status() };
        debug!(
            comm = ?comm,
            handle_kind = ?HandleKind::detect(),
            "MPI transport ready"
        );
        Ok(MpiTransport {
            comm,
            err_in_status,
            index_scratch: Vec::new(),
            _env: PhantomData,
        })
    }

    /// The communicator operations are posted on.
    pub fn communicator(&self) -> &Communicator {
        &self.comm
    }

    /// Handle representation of the linked MPI library.
    pub fn handle_kind(&self) -> HandleKind {
        HandleKind::detect()
    }

    fn some(
        &mut self,
        call: SomeFn,
        requests: &mut [RawRequest],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome> {
        let n = requests.len();
        if indices.len() < n || statuses.len() < n {
            return Err(Error::Internal("completion buffers shorter than request list".into()));
        }
        self.index_scratch.clear();
        self.index_scratch.resize(n, 0);

        let mut outcount: i32 = 0;
        let ret = unsafe {
            call(
                n as i64,
                requests.as_mut_ptr().cast::<i64>(),
                &mut outcount,
                self.index_scratch.as_mut_ptr(),
                statuses.as_mut_ptr(),
            )
        };

        let outcount = outcount.max(0) as usize;
        for (slot, &index) in indices.iter_mut().zip(&self.index_scratch[..outcount]) {
            *slot = index as usize;
        }

        if ret == SUCCESS {
            Ok(SomeOutcome::Completed(outcount))
        } else if ret == self.err_in_status {
            Ok(SomeOutcome::ErrInStatus(outcount))
        } else {
            Err(Error::from_code(ret, error_string(ret)))
        }
    }
}

impl Transport for MpiTransport<'_> {
    type Request = RawRequest;

    unsafe fn start_send<T: MpiDatatype>(
        &mut self,
        buf: &[T],
        dest: i32,
        tag: i32,
        request: &mut RawRequest,
    ) -> Result<()> {
        let ret = ffi::ferroreq_isend(
            buf.as_ptr().cast(),
            buf.len() as i64,
            T::TAG as i32,
            dest,
            tag,
            self.comm.raw_handle(),
            &mut request.0,
        );
        Error::check(ret)
    }

    unsafe fn start_recv<T: MpiDatatype>(
        &mut self,
        buf: &mut [T],
        source: i32,
        tag: i32,
        request: &mut RawRequest,
    ) -> Result<()> {
        let ret = ffi::ferroreq_irecv(
            buf.as_mut_ptr().cast(),
            buf.len() as i64,
            T::TAG as i32,
            source,
            tag,
            self.comm.raw_handle(),
            &mut request.0,
        );
        Error::check(ret)
    }

    fn test_some(
        &mut self,
        requests: &mut [RawRequest],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome> {
        self.some(ffi::ferroreq_testsome, requests, indices, statuses)
    }

    fn wait_some(
        &mut self,
        requests: &mut [RawRequest],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome> {
        self.some(ffi::ferroreq_waitsome, requests, indices, statuses)
    }

    fn wait_all(&mut self, requests: &mut [RawRequest]) -> Result<()> {
        let ret = unsafe {
            ffi::ferroreq_waitall(
                requests.len() as i64,
                requests.as_mut_ptr().cast::<i64>(),
                std::ptr::null_mut(),
            )
        };
        Error::check(ret)
    }

    fn error_string(&self, code: i32) -> Option<String> {
        lookup_error_string(code)
    }
}
