//! Control request codes
//!
//! Codes use the Linux `_IOC` layout:
//!
//! ```text
//!  31 30 29           16 15        8 7         0
//! ┌─────┬───────────────┬───────────┬───────────┐
//! │ dir │     size      │   type    │  number   │
//! └─────┴───────────────┴───────────┴───────────┘
//! ```

use std::mem::size_of;
use std::os::raw::c_int;

use crate::error::DevError;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

pub const IOC_NONE: u32 = 0;
/// Caller passes data in
pub const IOC_WRITE: u32 = 1;
/// Device passes data out
pub const IOC_READ: u32 = 2;

#[must_use]
pub const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let size = size as u32;
    (dir << IOC_DIRSHIFT) | ((ty as u32) << IOC_TYPESHIFT) | ((nr as u32) << IOC_NRSHIFT) | (size << IOC_SIZESHIFT)
}

#[must_use]
pub const fn io(ty: u8, nr: u8) -> u32 {
    ioc(IOC_NONE, ty, nr, 0)
}

#[must_use]
pub const fn ior(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_READ, ty, nr, size)
}

#[must_use]
pub const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}

#[must_use]
pub const fn ioc_dir(cmd: u32) -> u32 {
    cmd >> IOC_DIRSHIFT
}

#[must_use]
pub const fn ioc_type(cmd: u32) -> u32 {
    (cmd >> IOC_TYPESHIFT) & ((1 << IOC_TYPEBITS) - 1)
}

#[must_use]
pub const fn ioc_nr(cmd: u32) -> u32 {
    (cmd >> IOC_NRSHIFT) & ((1 << IOC_NRBITS) - 1)
}

#[must_use]
pub const fn ioc_size(cmd: u32) -> u32 {
    (cmd >> IOC_SIZESHIFT) & ((1 << IOC_SIZEBITS) - 1)
}

pub const SCULL_IOC_MAGIC: u8 = b'x';
pub const SCULL_IOC_RESET: u32 = io(SCULL_IOC_MAGIC, 0);
pub const SCULL_IOC_GET_QUANTUM: u32 = ior(SCULL_IOC_MAGIC, 1, size_of::<c_int>());
pub const SCULL_IOC_SET_QUANTUM: u32 = iow(SCULL_IOC_MAGIC, 2, size_of::<c_int>());
pub const SCULL_IOC_GET_QSET: u32 = ior(SCULL_IOC_MAGIC, 3, size_of::<c_int>());
pub const SCULL_IOC_SET_QSET: u32 = iow(SCULL_IOC_MAGIC, 4, size_of::<c_int>());
pub const SCULL_IOC_MAX_NR: u32 = 4;

/// Decoded control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Trim and restore default geometry
    Reset,
    GetQuantum,
    /// Privileged
    SetQuantum,
    GetQset,
    /// Privileged
    SetQset,
}

impl Control {
    /// Decode a request code
    ///
    /// # Errors
    /// `NotSupported` for codes of another type, out-of-range numbers, or
    /// a direction/size that does not match the request
    pub fn decode(cmd: u32) -> Result<Self, DevError> {
        if ioc_type(cmd) != u32::from(SCULL_IOC_MAGIC) || ioc_nr(cmd) > SCULL_IOC_MAX_NR {
            return Err(DevError::NotSupported);
        }
        match cmd {
            SCULL_IOC_RESET => Ok(Self::Reset),
            SCULL_IOC_GET_QUANTUM => Ok(Self::GetQuantum),
            SCULL_IOC_SET_QUANTUM => Ok(Self::SetQuantum),
            SCULL_IOC_GET_QSET => Ok(Self::GetQset),
            SCULL_IOC_SET_QSET => Ok(Self::SetQset),
            _ => Err(DevError::NotSupported),
        }
    }

    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Reset => SCULL_IOC_RESET,
            Self::GetQuantum => SCULL_IOC_GET_QUANTUM,
            Self::SetQuantum => SCULL_IOC_SET_QUANTUM,
            Self::GetQset => SCULL_IOC_GET_QSET,
            Self::SetQset => SCULL_IOC_SET_QSET,
        }
    }

    /// Whether the request carries an integer argument
    #[must_use]
    pub const fn takes_arg(self) -> bool {
        ioc_dir(self.code()) & (IOC_READ | IOC_WRITE) != 0
    }

    /// Whether the request needs elevated privilege
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::SetQuantum | Self::SetQset)
    }
}
