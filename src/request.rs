//! Request handles for individual nonblocking MPI operations.
//!
//! A [`Request`] borrows the buffer of its operation, so the buffer cannot be
//! touched until the request has completed. The bulk helpers
//! ([`Request::wait_any`], [`Request::test_some`], ...) operate on a slice of
//! requests; completed entries become null and can stay in the slice.

use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::datatype::DatatypeTag;
use crate::error::{Error, Result};
use crate::ffi;
use crate::status::{RawStatus, Status};

/// Value of `MPI_REQUEST_NULL` as seen through the C shim.
pub(crate) fn request_null() -> i64 {
    static NULL: OnceLock<i64> = OnceLock::new();
    *NULL.get_or_init(|| unsafe { ffi::ferroreq_request_null() })
}

/// A handle to a single nonblocking MPI operation.
///
/// Dropping a request that has not completed waits for it.
///
/// # Example
///
/// ```no_run
/// use ferroreq::{Mpi, ANY_SOURCE};
///
/// let mpi = Mpi::init().unwrap();
/// let world = mpi.world();
///
/// let mut inbox = vec![0u8; 64];
/// let request = world.irecv(&mut inbox, ANY_SOURCE, 0).unwrap();
///
/// // Do other work while communication proceeds...
///
/// let status = request.wait().unwrap();
/// println!("got {} bytes from rank {}", status.count().unwrap(), status.source);
/// ```
pub struct Request<'a> {
    handle: i64,
    datatype: DatatypeTag,
    _buffer: PhantomData<&'a mut ()>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(handle: i64, datatype: DatatypeTag) -> Self {
        Request {
            handle,
            datatype,
            _buffer: PhantomData,
        }
    }

    /// Get the raw request handle (for advanced use).
    pub fn raw_handle(&self) -> i64 {
        self.handle
    }

    /// Whether the operation has completed (the handle is `MPI_REQUEST_NULL`).
    pub fn is_completed(&self) -> bool {
        self.handle == request_null()
    }

    /// Block until the operation completes.
    pub fn wait(mut self) -> Result<Status> {
        let mut raw = RawStatus::default();
        let ret = unsafe { ffi::ferroreq_wait(&mut self.handle, &mut raw) };
        // Never wait twice on the same handle, even after an error
        self.handle = request_null();
        Error::check(ret)?;
        Ok(Status::new(raw, self.datatype))
    }

    /// Check for completion without blocking.
    ///
    /// Returns `Some(status)` once the operation has completed; after that the
    /// request is null and further calls return `None`.
    pub fn test(&mut self) -> Result<Option<Status>> {
        if self.is_completed() {
            return Ok(None);
        }
        let mut flag: i32 = 0;
        let mut raw = RawStatus::default();
        let ret = unsafe { ffi::ferroreq_test(&mut self.handle, &mut flag, &mut raw) };
        Error::check(ret)?;
        Ok((flag != 0).then(|| Status::new(raw, self.datatype)))
    }

    /// Mark the operation for cancellation.
    ///
    /// The request must still be completed with [`wait`](Self::wait) or
    /// [`test`](Self::test) (dropping it also waits).
    pub fn cancel(&mut self) -> Result<()> {
        if self.is_completed() {
            return Ok(());
        }
        let ret = unsafe { ffi::ferroreq_cancel(&mut self.handle) };
        Error::check(ret)
    }

    // ========================================================================
    // Bulk completion
    // ========================================================================

    /// Block until one of `requests` completes.
    ///
    /// Returns `None` if every request was already complete.
    pub fn wait_any(requests: &mut [Request<'a>]) -> Result<Option<(usize, Status)>> {
        let mut handles = Self::handles(requests);
        let mut index: i32 = -1;
        let mut raw = RawStatus::default();
        let ret = unsafe {
            ffi::ferroreq_waitany(handles.len() as i64, handles.as_mut_ptr(), &mut index, &mut raw)
        };
        Self::store(requests, &handles);
        Error::check(ret)?;
        Ok(Self::indexed(requests, index, raw))
    }

    /// Check whether any of `requests` has completed, without blocking.
    pub fn test_any(requests: &mut [Request<'a>]) -> Result<Option<(usize, Status)>> {
        let mut handles = Self::handles(requests);
        let mut index: i32 = -1;
        let mut flag: i32 = 0;
        let mut raw = RawStatus::default();
        let ret = unsafe {
            ffi::ferroreq_testany(
                handles.len() as i64,
                handles.as_mut_ptr(),
                &mut index,
                &mut flag,
                &mut raw,
            )
        };
        Self::store(requests, &handles);
        Error::check(ret)?;
        if flag == 0 {
            return Ok(None);
        }
        Ok(Self::indexed(requests, index, raw))
    }

    /// Block until every request completes.
    ///
    /// Returns one status per request, index-aligned with `requests`.
    pub fn wait_all(requests: &mut [Request<'a>]) -> Result<Vec<Status>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut handles = Self::handles(requests);
        let mut raw = vec![RawStatus::default(); requests.len()];
        let ret = unsafe {
            ffi::ferroreq_waitall(handles.len() as i64, handles.as_mut_ptr(), raw.as_mut_ptr())
        };
        Self::store(requests, &handles);
        Error::check(ret)?;
        Ok(Self::aligned(requests, &raw))
    }

    /// Check whether every request has completed, without blocking.
    ///
    /// Returns `None` while any request is still pending.
    pub fn test_all(requests: &mut [Request<'a>]) -> Result<Option<Vec<Status>>> {
        let mut handles = Self::handles(requests);
        let mut raw = vec![RawStatus::default(); requests.len()];
        let mut flag: i32 = 0;
        let ret = unsafe {
            ffi::ferroreq_testall(
                handles.len() as i64,
                handles.as_mut_ptr(),
                &mut flag,
                raw.as_mut_ptr(),
            )
        };
        Self::store(requests, &handles);
        Error::check(ret)?;
        Ok((flag != 0).then(|| Self::aligned(requests, &raw)))
    }

    /// Block until at least one request completes; return every completed
    /// `(index, status)` pair.
    pub fn wait_some(requests: &mut [Request<'a>]) -> Result<Vec<(usize, Status)>> {
        Self::some(requests, ffi::ferroreq_waitsome)
    }

    /// Return every completed `(index, status)` pair without blocking.
    pub fn test_some(requests: &mut [Request<'a>]) -> Result<Vec<(usize, Status)>> {
        Self::some(requests, ffi::ferroreq_testsome)
    }

    fn some(
        requests: &mut [Request<'a>],
        call: unsafe extern "C" fn(i64, *mut i64, *mut i32, *mut i32, *mut RawStatus) -> i32,
    ) -> Result<Vec<(usize, Status)>> {
        let mut handles = Self::handles(requests);
        let mut indices = vec![0i32; requests.len()];
        let mut raw = vec![RawStatus::default(); requests.len()];
        let mut outcount: i32 = 0;
        let ret = unsafe {
            call(
                handles.len() as i64,
                handles.as_mut_ptr(),
                &mut outcount,
                indices.as_mut_ptr(),
                raw.as_mut_ptr(),
            )
        };
        Self::store(requests, &handles);
        Error::check(ret)?;

        let outcount = outcount.max(0) as usize;
        Ok(indices[..outcount]
            .iter()
            .zip(&raw[..outcount])
            .map(|(&i, &st)| (i as usize, Status::new(st, requests[i as usize].datatype)))
            .collect())
    }

    fn handles(requests: &[Request<'a>]) -> Vec<i64> {
        requests.iter().map(|r| r.handle).collect()
    }

    fn store(requests: &mut [Request<'a>], handles: &[i64]) {
        for (request, &handle) in requests.iter_mut().zip(handles) {
            request.handle = handle;
        }
    }

    fn indexed(requests: &[Request<'a>], index: i32, raw: RawStatus) -> Option<(usize, Status)> {
        let index = usize::try_from(index).ok()?;
        let datatype = requests.get(index)?.datatype;
        Some((index, Status::new(raw, datatype)))
    }

    fn aligned(requests: &[Request<'a>], raw: &[RawStatus]) -> Vec<Status> {
        requests
            .iter()
            .zip(raw)
            .map(|(r, &st)| Status::new(st, r.datatype))
            .collect()
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if !self.is_completed() {
            // The buffer borrow ends here, so the operation must finish first
            unsafe { ffi::ferroreq_wait(&mut self.handle, std::ptr::null_mut()) };
        }
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("handle", &self.handle)
            .field("datatype", &self.datatype)
            .finish()
    }
}
