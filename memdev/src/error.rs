//! Error type shared by all devices
//!
//! Every variant maps to the errno a character device would return, so
//! callers that speak POSIX can translate results without a lookup table.

use std::io;
use std::os::raw::c_int;

/// Kernel-internal "restart the system call" code
pub const ERESTARTSYS: c_int = 512;

/// Error returned by device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DevError {
    /// A blocking wait was cancelled; the caller should retry the whole call
    #[error("interrupted while waiting, restart the call")]
    Interrupted,

    /// Allocation failed or the memory budget is exhausted
    #[error("out of memory")]
    NoMemory,

    /// A caller-supplied buffer could not be accessed
    #[error("bad address")]
    Fault,

    #[error("invalid argument")]
    InvalidArgument,

    /// Privileged operation without the required capability
    #[error("operation not permitted")]
    PermissionDenied,

    /// Unknown control request
    #[error("inappropriate control request for device")]
    NotSupported,

    /// Non-blocking handle would have to wait
    #[error("resource temporarily unavailable")]
    WouldBlock,

    /// Handle was not opened for the requested direction
    #[error("bad file descriptor")]
    BadDescriptor,

    #[error("no such device")]
    NoDevice,
}

impl DevError {
    /// Positive errno value for this error
    #[must_use]
    pub fn errno(self) -> c_int {
        match self {
            Self::PermissionDenied => 1,  // EPERM
            Self::BadDescriptor => 9,     // EBADF
            Self::WouldBlock => 11,       // EAGAIN
            Self::NoMemory => 12,         // ENOMEM
            Self::Fault => 14,            // EFAULT
            Self::NoDevice => 19,         // ENODEV
            Self::InvalidArgument => 22,  // EINVAL
            Self::NotSupported => 25,     // ENOTTY
            Self::Interrupted => ERESTARTSYS,
        }
    }

    /// Inverse of [`DevError::errno`]
    #[must_use]
    pub fn from_errno(errno: c_int) -> Option<Self> {
        let err = match errno {
            1 => Self::PermissionDenied,
            9 => Self::BadDescriptor,
            11 => Self::WouldBlock,
            12 => Self::NoMemory,
            14 => Self::Fault,
            19 => Self::NoDevice,
            22 => Self::InvalidArgument,
            25 => Self::NotSupported,
            ERESTARTSYS => Self::Interrupted,
            _ => return None,
        };
        Some(err)
    }
}

impl embedded_io::Error for DevError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Interrupted => embedded_io::ErrorKind::Interrupted,
            Self::NoMemory => embedded_io::ErrorKind::OutOfMemory,
            Self::InvalidArgument | Self::BadDescriptor => embedded_io::ErrorKind::InvalidInput,
            Self::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            Self::NotSupported => embedded_io::ErrorKind::Unsupported,
            Self::NoDevice => embedded_io::ErrorKind::NotFound,
            Self::Fault | Self::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl From<DevError> for io::Error {
    fn from(e: DevError) -> Self {
        let kind = match e {
            DevError::Interrupted => io::ErrorKind::Interrupted,
            DevError::NoMemory => io::ErrorKind::OutOfMemory,
            DevError::InvalidArgument | DevError::BadDescriptor => io::ErrorKind::InvalidInput,
            DevError::PermissionDenied => io::ErrorKind::PermissionDenied,
            DevError::NotSupported => io::ErrorKind::Unsupported,
            DevError::WouldBlock => io::ErrorKind::WouldBlock,
            DevError::NoDevice => io::ErrorKind::NotFound,
            DevError::Fault => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

impl From<std::collections::TryReserveError> for DevError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::NoMemory
    }
}
