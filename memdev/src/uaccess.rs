//! Caller buffer access
//!
//! Data crosses into and out of a device only through these traits. Plain
//! slices never fail; other implementations (memory-mapped regions, test
//! doubles) may report a fault, which aborts the current operation with
//! [`DevError::Fault`](crate::DevError::Fault).

use std::os::raw::c_int;

use crate::error::DevError;

/// Marker error for a failed buffer access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

impl From<Fault> for DevError {
    fn from(_: Fault) -> Self {
        DevError::Fault
    }
}

/// Source buffer for writes
pub trait UserSlice {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`
    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), Fault>;
}

/// Destination buffer for reads
pub trait UserSliceMut {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy all of `src` into the buffer starting at `offset`
    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), Fault>;
}

/// Integer argument slot of a control request
pub trait UserInt {
    fn get_user(&self) -> Result<c_int, Fault>;
    fn put_user(&mut self, value: c_int) -> Result<(), Fault>;
}

impl UserSlice for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), Fault> {
        let end = offset.checked_add(dst.len()).ok_or(Fault)?;
        let src = self.get(offset..end).ok_or(Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserSliceMut for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), Fault> {
        let end = offset.checked_add(src.len()).ok_or(Fault)?;
        let dst = self.get_mut(offset..end).ok_or(Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl<const N: usize> UserSlice for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), Fault> {
        self.as_slice().copy_from_user(offset, dst)
    }
}

impl<const N: usize> UserSliceMut for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), Fault> {
        self.as_mut_slice().copy_to_user(offset, src)
    }
}

impl UserSlice for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), Fault> {
        self.as_slice().copy_from_user(offset, dst)
    }
}

impl UserSliceMut for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), Fault> {
        self.as_mut_slice().copy_to_user(offset, src)
    }
}

impl UserInt for c_int {
    fn get_user(&self) -> Result<c_int, Fault> {
        Ok(*self)
    }

    fn put_user(&mut self, value: c_int) -> Result<(), Fault> {
        *self = value;
        Ok(())
    }
}
