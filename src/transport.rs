//! The boundary between the request manager and the message-passing layer.
//!
//! A [`Transport`] starts nonblocking operations and reports which of a set
//! of request tokens have completed. The manager never looks inside a token;
//! it only stores tokens in its slot array and hands the occupied prefix back
//! to the transport.
//!
//! [`MpiTransport`](crate::MpiTransport) (feature `mpi`) is the MPI
//! implementation. Tests use scripted in-memory transports.

use crate::datatype::MpiDatatype;
use crate::error::Result;
use crate::status::RawStatus;

/// Outcome of a successful bulk completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SomeOutcome {
    /// `n` operations completed and every one of them succeeded.
    Completed(usize),
    /// `n` operations completed and at least one of them carries a
    /// non-success error code in its status (`MPI_ERR_IN_STATUS`).
    ErrInStatus(usize),
}

impl SomeOutcome {
    /// Number of operations that completed.
    pub fn count(self) -> usize {
        match self {
            SomeOutcome::Completed(n) | SomeOutcome::ErrInStatus(n) => n,
        }
    }
}

/// A message-passing layer able to start and complete nonblocking operations.
///
/// For `test_some` and `wait_some`, `indices` and `statuses` are at least as
/// long as `requests`. When the call reports `n` completions, `indices[..n]`
/// holds the positions in `requests` that completed and `statuses[k]`
/// describes the operation at `indices[k]`. Completed tokens may be
/// overwritten by the transport (MPI resets them to `MPI_REQUEST_NULL`).
pub trait Transport {
    /// Native request token.
    type Request: Copy + Default;

    /// Start a nonblocking send of `buf` to rank `dest`.
    ///
    /// # Safety
    ///
    /// `buf` must stay valid and unmodified until the operation identified by
    /// the token written to `request` has completed.
    unsafe fn start_send<T: MpiDatatype>(
        &mut self,
        buf: &[T],
        dest: i32,
        tag: i32,
        request: &mut Self::Request,
    ) -> Result<()>;

    /// Start a nonblocking receive into `buf` from rank `source`.
    ///
    /// # Safety
    ///
    /// `buf` must stay valid and must not be read or written by anyone else
    /// until the operation identified by the token written to `request` has
    /// completed.
    unsafe fn start_recv<T: MpiDatatype>(
        &mut self,
        buf: &mut [T],
        source: i32,
        tag: i32,
        request: &mut Self::Request,
    ) -> Result<()>;

    /// Report the operations in `requests` that have completed, without
    /// blocking.
    fn test_some(
        &mut self,
        requests: &mut [Self::Request],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome>;

    /// Block until at least one operation in `requests` has completed, then
    /// report every completed operation.
    fn wait_some(
        &mut self,
        requests: &mut [Self::Request],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome>;

    /// Block until every operation in `requests` has completed.
    fn wait_all(&mut self, requests: &mut [Self::Request]) -> Result<()>;

    /// Human-readable text for an error code, `None` if the lookup fails.
    fn error_string(&self, code: i32) -> Option<String>;
}
