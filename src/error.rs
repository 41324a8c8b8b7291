//! The crate's single error type.
//!
//! Mirrors the shape of the teacher's `storage::{Read,Write}Error<T>`: a
//! `#[non_exhaustive]` enum wrapping a foreign device error, with a
//! `std::error::Error` impl added back in only when `std` is available.
//! The variants themselves are the numeric sentinels of spec.md §7,
//! ultimately descended from `common/errno.h` in the original C sources.

use core::fmt::{self, Debug};

/// Error kinds, one per spec.md §7 sentinel (`EOK` has no variant — success
/// is `Ok(())`/`Ok(value)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error<D: Debug = core::convert::Infallible> {
    /// Null argument, malformed flag string, malformed on-disk structure
    /// detected at parse time.
    InvalidArgument,
    /// Path component missing.
    NotFound,
    /// Duplicate mount, file/directory already present at target.
    AlreadyExists,
    /// Mountpoint not found, unrecognized filesystem.
    NoSuchDevice,
    /// Allocation failed.
    OutOfMemory,
    /// No free cluster/block/inode, no free directory slot.
    NoSpace,
    /// Block-device read/write failed; carries the device's own error.
    Io(D),
    /// exFAT detected, ext feature not implemented, unimplemented accessor.
    NotSupported,
    /// Internal invariant violation (defensive).
    Fault,
}

impl<D: Debug> Error<D> {
    /// Maps a variant to the host `errno` value named in spec.md §7.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::InvalidArgument => 22,
            Error::NotFound => 2,
            Error::AlreadyExists => 17,
            Error::NoSuchDevice => 19,
            Error::OutOfMemory => 12,
            Error::NoSpace => 28,
            Error::Io(_) => 5,
            Error::NotSupported => 134,
            Error::Fault => 14,
        }
    }
}

impl<D: Debug> From<D> for Error<D> {
    fn from(device_error: D) -> Self {
        Error::Io(device_error)
    }
}

impl<D: Debug> fmt::Display for Error<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

using_std! {
    impl<D: Debug> std::error::Error for Error<D> { }
}

pub type Result<T, D = core::convert::Infallible> = core::result::Result<T, Error<D>>;
