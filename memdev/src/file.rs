//! Open handles on a storage instance
//!
//! A [`ScullFile`] carries the per-open state: position, access mode,
//! credentials and the interrupt used to cancel a blocked lock wait.

use std::io::SeekFrom;
use std::os::raw::c_int;
use std::sync::Arc;

use crate::device::ScullDev;
use crate::error::DevError;
use crate::geometry::Geometry;
use crate::interrupt::Interrupt;
use crate::ioctl::Control;
use crate::uaccess::{UserInt, UserSlice, UserSliceMut};

/// Access mode of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Truncates the instance on open
    Write,
    ReadWrite,
}

impl OpenMode {
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Open flags: access mode plus non-blocking behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub mode: OpenMode,
    pub nonblock: bool,
}

impl OpenFlags {
    #[must_use]
    pub const fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            nonblock: false,
        }
    }

    #[must_use]
    pub const fn read_only() -> Self {
        Self::new(OpenMode::Read)
    }

    #[must_use]
    pub const fn write_only() -> Self {
        Self::new(OpenMode::Write)
    }

    #[must_use]
    pub const fn read_write() -> Self {
        Self::new(OpenMode::ReadWrite)
    }

    #[must_use]
    pub const fn nonblocking(self) -> Self {
        Self {
            nonblock: true,
            ..self
        }
    }
}

/// Capabilities of the opener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Allowed to change device geometry
    pub sys_admin: bool,
}

impl Credentials {
    #[must_use]
    pub const fn user() -> Self {
        Self { sys_admin: false }
    }

    #[must_use]
    pub const fn admin() -> Self {
        Self { sys_admin: true }
    }
}

/// Open handle on a [`ScullDev`]
pub struct ScullFile {
    dev: Arc<ScullDev>,
    pos: u64,
    flags: OpenFlags,
    creds: Credentials,
    interrupt: Interrupt,
}

impl ScullFile {
    /// Open `dev`; a write-only open trims the instance first
    ///
    /// # Errors
    /// `Interrupted` if the trim had to wait for the lock and `interrupt`
    /// was raised
    pub async fn open(
        dev: Arc<ScullDev>,
        flags: OpenFlags,
        creds: Credentials,
        interrupt: Interrupt,
    ) -> Result<Self, DevError> {
        if flags.mode == OpenMode::Write {
            dev.lock(&interrupt).await?.trim();
        }
        log::debug!("{}: open {:?}", dev.name(), flags);
        Ok(Self {
            dev,
            pos: 0,
            flags,
            creds,
            interrupt,
        })
    }

    #[must_use]
    pub fn device(&self) -> &Arc<ScullDev> {
        &self.dev
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Signal that cancels this handle's lock waits; clone it to raise
    /// from another task
    #[must_use]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Read at the current position, at most up to the end of one quantum
    ///
    /// Returns 0 at end of data and on holes; a hole is skipped by seeking.
    ///
    /// # Errors
    /// `BadDescriptor` on a write-only handle, `Interrupted`, `Fault`
    pub async fn read<B: UserSliceMut + ?Sized>(&mut self, buf: &mut B) -> Result<usize, DevError> {
        if !self.flags.mode.can_read() {
            return Err(DevError::BadDescriptor);
        }
        let storage = self.dev.lock(&self.interrupt).await?;
        let n = storage.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Write at the current position, at most up to the end of one quantum
    ///
    /// # Errors
    /// `BadDescriptor` on a read-only handle, `Interrupted`, `NoMemory`,
    /// `Fault`
    pub async fn write<B: UserSlice + ?Sized>(&mut self, data: &B) -> Result<usize, DevError> {
        if !self.flags.mode.can_write() {
            return Err(DevError::BadDescriptor);
        }
        let mut storage = self.dev.lock(&self.interrupt).await?;
        let n = storage.write_at(self.pos, data)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Move the position; storage is not touched
    ///
    /// # Errors
    /// `InvalidArgument` if the result is negative or overflows,
    /// `Interrupted` while reading the size for `SeekFrom::End`
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, DevError> {
        let base: i64 = match pos {
            SeekFrom::Start(_) => 0,
            SeekFrom::Current(_) => to_offset(self.pos)?,
            SeekFrom::End(_) => to_offset(self.dev.lock(&self.interrupt).await?.size())?,
        };
        let new_pos = match pos {
            SeekFrom::Start(off) => to_offset(off)?,
            SeekFrom::Current(off) | SeekFrom::End(off) => {
                base.checked_add(off).ok_or(DevError::InvalidArgument)?
            }
        };
        self.pos = u64::try_from(new_pos).map_err(|_| DevError::InvalidArgument)?;
        Ok(self.pos)
    }

    /// Dispatch a raw control request
    ///
    /// Returns 0 on success; "get" requests store their result in `arg`.
    ///
    /// # Errors
    /// `NotSupported` for unknown codes, `Fault` when the request needs an
    /// argument and `arg` is missing or inaccessible, `PermissionDenied`,
    /// `InvalidArgument`, `Interrupted`
    pub async fn ioctl(
        &mut self,
        cmd: u32,
        arg: Option<&mut (dyn UserInt + Send)>,
    ) -> Result<c_int, DevError> {
        let request = Control::decode(cmd)?;
        if request.takes_arg() && arg.is_none() {
            return Err(DevError::Fault);
        }
        if request.is_privileged() {
            self.require_admin()?;
        }

        match request {
            Control::Reset => self.reset().await?,
            Control::GetQuantum => {
                let geometry = self.geometry().await?;
                put_arg(arg, geometry.quantum_int())?;
            }
            Control::GetQset => {
                let geometry = self.geometry().await?;
                put_arg(arg, geometry.qset_int())?;
            }
            Control::SetQuantum => {
                let value = get_arg(arg.as_deref())?;
                self.set_quantum(value).await?;
            }
            Control::SetQset => {
                let value = get_arg(arg.as_deref())?;
                self.set_qset(value).await?;
            }
        }
        Ok(0)
    }

    /// Trim the instance and restore default geometry
    ///
    /// # Errors
    /// `Interrupted`
    pub async fn reset(&mut self) -> Result<(), DevError> {
        self.dev.lock(&self.interrupt).await?.trim();
        Ok(())
    }

    /// Current geometry; no privilege needed
    ///
    /// # Errors
    /// `Interrupted`
    pub async fn geometry(&self) -> Result<Geometry, DevError> {
        Ok(self.dev.lock(&self.interrupt).await?.geometry())
    }

    /// Logical size of the instance
    ///
    /// # Errors
    /// `Interrupted`
    pub async fn size(&self) -> Result<u64, DevError> {
        Ok(self.dev.lock(&self.interrupt).await?.size())
    }

    /// Set the quantum size; existing data is not remapped
    ///
    /// # Errors
    /// `PermissionDenied` without `sys_admin`, `InvalidArgument` for
    /// non-positive values, `Interrupted`
    pub async fn set_quantum(&mut self, quantum: c_int) -> Result<(), DevError> {
        self.require_admin()?;
        let mut storage = self.dev.lock(&self.interrupt).await?;
        let geometry = storage.geometry().with_quantum(quantum)?;
        storage.set_geometry(geometry);
        Ok(())
    }

    /// Set the index-block fanout; existing data is not remapped
    ///
    /// # Errors
    /// Same as [`ScullFile::set_quantum`]
    pub async fn set_qset(&mut self, qset: c_int) -> Result<(), DevError> {
        self.require_admin()?;
        let mut storage = self.dev.lock(&self.interrupt).await?;
        let geometry = storage.geometry().with_qset(qset)?;
        storage.set_geometry(geometry);
        Ok(())
    }

    /// Release the handle; the instance keeps its data
    pub fn close(self) {
        log::debug!("{}: close at pos {}", self.dev.name(), self.pos);
    }

    fn require_admin(&self) -> Result<(), DevError> {
        if self.creds.sys_admin {
            Ok(())
        } else {
            log::debug!("{}: geometry change refused, not sys_admin", self.dev.name());
            Err(DevError::PermissionDenied)
        }
    }
}

impl std::fmt::Debug for ScullFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ScullFile(dev={}, pos={}, flags={:?}, admin={})",
            self.dev.index(),
            self.pos,
            self.flags,
            self.creds.sys_admin
        )
    }
}

fn to_offset(value: u64) -> Result<i64, DevError> {
    i64::try_from(value).map_err(|_| DevError::InvalidArgument)
}

fn get_arg(arg: Option<&(dyn UserInt + Send)>) -> Result<c_int, DevError> {
    Ok(arg.ok_or(DevError::Fault)?.get_user()?)
}

fn put_arg(arg: Option<&mut (dyn UserInt + Send)>, value: c_int) -> Result<(), DevError> {
    arg.ok_or(DevError::Fault)?.put_user(value)?;
    Ok(())
}

// embedded_io traits, so a handle plugs into generic async I/O code

impl embedded_io_async::ErrorType for ScullFile {
    type Error = DevError;
}

impl embedded_io_async::Read for ScullFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        ScullFile::read(self, buf).await
    }
}

impl embedded_io_async::Write for ScullFile {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        ScullFile::write(self, buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io_async::Seek for ScullFile {
    async fn seek(&mut self, pos: embedded_io_async::SeekFrom) -> Result<u64, Self::Error> {
        let pos = match pos {
            embedded_io_async::SeekFrom::Start(off) => SeekFrom::Start(off),
            embedded_io_async::SeekFrom::End(off) => SeekFrom::End(off),
            embedded_io_async::SeekFrom::Current(off) => SeekFrom::Current(off),
        };
        ScullFile::seek(self, pos).await
    }
}
