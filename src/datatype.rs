//! Element types that can travel through a request.
//!
//! [`MpiDatatype`] is a sealed trait mapping Rust primitives to the datatype
//! tags understood by the C shim. The tag also records the element width,
//! which is what turns a received byte count into an element count.
//!
//! | Rust Type | MPI Equivalent    | Tag | Bytes |
//! |-----------|-------------------|-----|-------|
//! | `f32`     | `MPI_FLOAT`       | 0   | 4     |
//! | `f64`     | `MPI_DOUBLE`      | 1   | 8     |
//! | `i32`     | `MPI_INT32_T`     | 2   | 4     |
//! | `i64`     | `MPI_INT64_T`     | 3   | 8     |
//! | `u8`      | `MPI_BYTE`        | 4   | 1     |
//! | `u32`     | `MPI_UINT32_T`    | 5   | 4     |
//! | `u64`     | `MPI_UINT64_T`    | 6   | 8     |

mod sealed {
    pub trait Sealed {}
}

/// Tag values matching the `FERROREQ_*` datatype defines in `csrc/ferroreq.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// Raw bytes
    U8 = 4,
    /// 32-bit unsigned integer
    U32 = 5,
    /// 64-bit unsigned integer
    U64 = 6,
}

impl DatatypeTag {
    /// Width of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DatatypeTag::U8 => 1,
            DatatypeTag::F32 | DatatypeTag::I32 | DatatypeTag::U32 => 4,
            DatatypeTag::F64 | DatatypeTag::I64 | DatatypeTag::U64 => 8,
        }
    }

    /// Rust name of the element type.
    pub const fn name(self) -> &'static str {
        match self {
            DatatypeTag::F32 => "f32",
            DatatypeTag::F64 => "f64",
            DatatypeTag::I32 => "i32",
            DatatypeTag::I64 => "i64",
            DatatypeTag::U8 => "u8",
            DatatypeTag::U32 => "u32",
            DatatypeTag::U64 => "u64",
        }
    }

    /// Convert a byte count into a count of elements of this type.
    ///
    /// Returns `None` for negative counts (MPI's `MPI_UNDEFINED`) and for
    /// counts that do not divide evenly.
    pub const fn elements(self, bytes: i64) -> Option<i64> {
        let width = self.size() as i64;
        if bytes < 0 || bytes % width != 0 {
            None
        } else {
            Some(bytes / width)
        }
    }
}

/// Trait for element types accepted by send and receive submissions.
///
/// This is a **sealed trait**. Supported types: [`f32`], [`f64`], [`i32`],
/// [`i64`], [`u8`], [`u32`], [`u64`].
pub trait MpiDatatype: sealed::Sealed + Copy + Send + 'static {
    /// The datatype tag used for FFI dispatch to the C layer.
    const TAG: DatatypeTag;
}

macro_rules! impl_mpi_datatype {
    ($ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}
        impl MpiDatatype for $ty {
            const TAG: DatatypeTag = $tag;
        }
    };
}

impl_mpi_datatype!(f32, DatatypeTag::F32);
impl_mpi_datatype!(f64, DatatypeTag::F64);
impl_mpi_datatype!(i32, DatatypeTag::I32);
impl_mpi_datatype!(i64, DatatypeTag::I64);
impl_mpi_datatype!(u8, DatatypeTag::U8);
impl_mpi_datatype!(u32, DatatypeTag::U32);
impl_mpi_datatype!(u64, DatatypeTag::U64);
