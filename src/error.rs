//! Error types for ferroreq

use thiserror::Error;

/// Result type for ferroreq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Return code reported by MPI (and by every [`Transport`](crate::Transport))
/// for an operation that finished without error.
pub const SUCCESS: i32 = 0;

/// Error types for request submission and MPI calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// MPI has already been initialized
    #[error("MPI has already been initialized")]
    AlreadyInitialized,

    /// MPI has not been initialized
    #[error("MPI has not been initialized")]
    NotInitialized,

    /// A request manager cannot be created without slots
    #[error("Request manager capacity must be at least 1")]
    ZeroCapacity,

    /// Submit was called while every slot was occupied
    #[error("Request manager has reached capacity ({capacity} requests in flight)")]
    CapacityExceeded {
        /// Number of slots in the manager
        capacity: usize,
    },

    /// Buffer holds more elements than MPI can address in one call
    #[error("Invalid count: {0}")]
    InvalidCount(i64),

    /// The received byte count is not a whole number of elements
    #[error("Count of {bytes} bytes is not a whole number of {datatype} elements")]
    UndefinedCount {
        /// Byte count reported by MPI, negative when MPI reported it as undefined
        bytes: i64,
        /// Name of the element type
        datatype: &'static str,
    },

    /// MPI returned a non-success code
    #[error("MPI error {code}: {message}")]
    Mpi {
        /// The raw MPI error code
        code: i32,
        /// Text from `MPI_Error_string`, or a fallback
        message: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::Mpi`] for a non-success code and its description.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        Error::Mpi {
            code,
            message: message.into(),
        }
    }

    /// The raw MPI error code, if this error came from MPI.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Mpi { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check an MPI return code, returning `Ok(())` for [`SUCCESS`].
    ///
    /// The message is resolved through `describe` only when the code signals
    /// an error.
    pub fn check_with<F>(code: i32, describe: F) -> Result<()>
    where
        F: FnOnce(i32) -> String,
    {
        if code == SUCCESS {
            Ok(())
        } else {
            Err(Error::from_code(code, describe(code)))
        }
    }
}

/// Fallback text for a code the error-string lookup could not resolve.
pub fn unknown_error(code: i32) -> String {
    format!("Unknown MPI error: {code}")
}

/// Resolve the description of `code`, falling back to [`unknown_error`].
///
/// Used on error-reporting paths, so it never fails.
pub fn describe_error(lookup: Option<String>, code: i32) -> String {
    lookup.unwrap_or_else(|| unknown_error(code))
}

/// Text for an MPI error code via `MPI_Error_string`, `None` if MPI does not
/// recognise the code.
#[cfg(feature = "mpi")]
pub(crate) fn lookup_error_string(code: i32) -> Option<String> {
    use crate::ffi;

    let max = unsafe { ffi::ferroreq_max_error_string() }.max(1);
    let mut buf = vec![0u8; max as usize];
    let mut len: i32 = 0;
    let ret = unsafe { ffi::ferroreq_error_string(code, buf.as_mut_ptr().cast(), &mut len) };
    if ret != SUCCESS {
        return None;
    }
    buf.truncate(len.clamp(0, max) as usize);
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Text for an MPI error code, falling back to `"Unknown MPI error: N"`.
#[cfg(feature = "mpi")]
pub fn error_string(code: i32) -> String {
    describe_error(lookup_error_string(code), code)
}

#[cfg(feature = "mpi")]
impl Error {
    /// Check a return code from the C shim, describing failures with
    /// [`error_string`].
    pub(crate) fn check(code: i32) -> Result<()> {
        Self::check_with(code, error_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_success_is_ok() {
        assert_eq!(Error::check_with(SUCCESS, |_| unreachable!()), Ok(()));
    }

    #[test]
    fn check_failure_carries_description() {
        let err = Error::check_with(17, |c| format!("code {c} exploded")).unwrap_err();
        assert_eq!(err.code(), Some(17));
        assert_eq!(err.to_string(), "MPI error 17: code 17 exploded");
    }

    #[test]
    fn describe_falls_back_to_unknown() {
        assert_eq!(describe_error(None, 42), "Unknown MPI error: 42");
        assert_eq!(
            describe_error(Some("Invalid rank".into()), 6),
            "Invalid rank"
        );
    }

    #[test]
    fn capacity_message_names_capacity() {
        let err = Error::CapacityExceeded { capacity: 3 };
        assert!(err.to_string().contains("3 requests"));
        assert_eq!(err.code(), None);
    }
}
