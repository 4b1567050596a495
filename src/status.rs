//! Completion status of a message.
//!
//! A [`RawStatus`] is what a [`Transport`](crate::Transport) writes back for
//! each completed operation. A [`Status`] is the caller-facing record: the
//! raw fields plus the datatype of the operation, so the element count can be
//! derived on demand.

use std::fmt;

use crate::datatype::DatatypeTag;
use crate::error::{Error, Result, SUCCESS};

/// Status fields as reported by the message-passing layer.
///
/// `bytes` is the size of the transferred message in bytes, or a negative
/// value when the layer could not determine it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawStatus {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Per-operation error code.
    pub error: i32,
    /// Transferred size in bytes.
    pub bytes: i64,
}

/// Information about a completed send or receive.
///
/// # Example
///
/// ```
/// use ferroreq::{DatatypeTag, RawStatus, Status};
///
/// let raw = RawStatus { source: 1, tag: 7, error: 0, bytes: 24 };
/// let status = Status::new(raw, DatatypeTag::F64);
/// assert_eq!(status.count().unwrap(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Per-operation error code, [`SUCCESS`] when the operation succeeded.
    pub error: i32,
    bytes: i64,
    datatype: DatatypeTag,
}

impl Status {
    /// Wrap a raw status for an operation on elements of `datatype`.
    pub fn new(raw: RawStatus, datatype: DatatypeTag) -> Self {
        Status {
            source: raw.source,
            tag: raw.tag,
            error: raw.error,
            bytes: raw.bytes,
            datatype,
        }
    }

    /// Datatype the operation was submitted with.
    pub fn datatype(&self) -> DatatypeTag {
        self.datatype
    }

    /// Number of elements transferred.
    ///
    /// # Errors
    ///
    /// [`Error::UndefinedCount`] if the byte count is unknown or is not a
    /// whole number of elements.
    pub fn count(&self) -> Result<i64> {
        self.datatype
            .elements(self.bytes)
            .ok_or(Error::UndefinedCount {
                bytes: self.bytes,
                datatype: self.datatype.name(),
            })
    }

    /// Whether the operation completed without error.
    pub fn is_success(&self) -> bool {
        self.error == SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status(source={}, tag={}, error={}, ",
            self.source, self.tag, self.error
        )?;
        match self.count() {
            Ok(count) => write!(f, "count={count})"),
            Err(_) => write!(f, "count=undefined)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bytes: i64) -> RawStatus {
        RawStatus {
            source: 2,
            tag: 11,
            error: SUCCESS,
            bytes,
        }
    }

    #[test]
    fn count_uses_datatype_width() {
        assert_eq!(Status::new(raw(16), DatatypeTag::I32).count(), Ok(4));
        assert_eq!(Status::new(raw(16), DatatypeTag::U8).count(), Ok(16));
    }

    #[test]
    fn count_of_partial_element_is_an_error() {
        let status = Status::new(raw(10), DatatypeTag::F64);
        assert_eq!(
            status.count(),
            Err(Error::UndefinedCount {
                bytes: 10,
                datatype: "f64"
            })
        );
    }

    #[test]
    fn display_matches_fields() {
        let status = Status::new(raw(6), DatatypeTag::U8);
        assert_eq!(
            status.to_string(),
            "Status(source=2, tag=11, error=0, count=6)"
        );
        let status = Status::new(raw(-1), DatatypeTag::U8);
        assert!(status.to_string().ends_with("count=undefined)"));
    }

    #[test]
    fn success_flag_follows_error_code() {
        assert!(Status::new(raw(0), DatatypeTag::U8).is_success());
        let failed = RawStatus { error: 5, ..raw(0) };
        assert!(!Status::new(failed, DatatypeTag::U8).is_success());
    }
}
