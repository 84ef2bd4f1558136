//! Pipe device
//!
//! A bounded circular byte buffer shared by any number of readers and
//! writers. Readers sleep while the buffer is empty, writers sleep while it
//! is full; each side wakes the other after moving data. Non-blocking
//! handles get [`DevError::WouldBlock`] instead of sleeping.
//!
//! A single call moves at most the contiguous bytes up to the wrap point,
//! so a caller that wants everything loops, as with any short read or
//! write.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DevError;
use crate::file::OpenFlags;
use crate::interrupt::Interrupt;
use crate::uaccess::{UserSlice, UserSliceMut};
use crate::wait_queue::WaitQueue;

/// Circular buffer state
///
/// `rp == wp` is ambiguous on its own; `len` tells empty from full.
struct Ring {
    buffer: Vec<u8>,
    rp: usize,
    wp: usize,
    len: usize,
}

impl Ring {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0; size],
            rp: 0,
            wp: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Readable bytes before the wrap point
    fn contiguous_data(&self) -> usize {
        if self.len == 0 {
            0
        } else if self.wp > self.rp {
            self.wp - self.rp
        } else {
            self.capacity() - self.rp
        }
    }

    /// Writable bytes before the wrap point
    fn contiguous_free(&self) -> usize {
        if self.free() == 0 {
            0
        } else if self.wp >= self.rp {
            self.capacity() - self.wp
        } else {
            self.rp - self.wp
        }
    }

    fn read<B: UserSliceMut + ?Sized>(&mut self, buf: &mut B) -> Result<usize, DevError> {
        let count = buf.len().min(self.contiguous_data());
        buf.copy_to_user(0, &self.buffer[self.rp..self.rp + count])?;
        self.rp = (self.rp + count) % self.capacity();
        self.len -= count;
        Ok(count)
    }

    fn write<B: UserSlice + ?Sized>(&mut self, data: &B) -> Result<usize, DevError> {
        let count = data.len().min(self.contiguous_free());
        data.copy_from_user(0, &mut self.buffer[self.wp..self.wp + count])?;
        self.wp = (self.wp + count) % self.capacity();
        self.len += count;
        Ok(count)
    }
}

pub struct ScullPipe {
    index: usize,
    ring: Mutex<Ring>,
    /// Readers waiting for data
    inq: WaitQueue,
    /// Writers waiting for space
    outq: WaitQueue,
}

impl ScullPipe {
    /// # Panics
    /// If `buffer_size` is zero
    #[must_use]
    pub fn new(index: usize, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "pipe buffer size must be positive");
        Self {
            index,
            ring: Mutex::new(Ring::new(buffer_size)),
            inq: WaitQueue::new(&format!("scullpipe{index}.in")),
            outq: WaitQueue::new(&format!("scullpipe{index}.out")),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        format!("scullpipe{}", self.index)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Bytes currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn open(self: &Arc<Self>, flags: OpenFlags, interrupt: Interrupt) -> PipeFile {
        log::debug!("{}: open {:?}", self.name(), flags);
        PipeFile {
            pipe: Arc::clone(self),
            flags,
            interrupt,
        }
    }
}

impl std::fmt::Debug for ScullPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        write!(
            f,
            "ScullPipe({}, {}/{} bytes, rp={}, wp={})",
            self.index,
            ring.len,
            ring.capacity(),
            ring.rp,
            ring.wp
        )
    }
}

/// Open handle on a [`ScullPipe`]
#[derive(Debug)]
pub struct PipeFile {
    pipe: Arc<ScullPipe>,
    flags: OpenFlags,
    interrupt: Interrupt,
}

impl PipeFile {
    #[must_use]
    pub fn pipe(&self) -> &Arc<ScullPipe> {
        &self.pipe
    }

    #[must_use]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Read buffered bytes, sleeping while the pipe is empty
    ///
    /// # Errors
    /// `BadDescriptor` on a write-only handle, `WouldBlock` on an empty
    /// pipe in non-blocking mode, `Interrupted`, `Fault`
    pub async fn read<B: UserSliceMut + ?Sized>(&mut self, buf: &mut B) -> Result<usize, DevError> {
        if !self.flags.mode.can_read() {
            return Err(DevError::BadDescriptor);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let pipe = &*self.pipe;
        loop {
            {
                let mut ring = pipe.ring.lock();
                if !ring.is_empty() {
                    let n = ring.read(buf)?;
                    drop(ring);
                    log::trace!("{}: read {n} bytes", pipe.name());
                    pipe.outq.wake_up_all();
                    return Ok(n);
                }
            }
            if self.flags.nonblock {
                return Err(DevError::WouldBlock);
            }
            log::trace!("{}: reader going to sleep", pipe.name());
            pipe.inq
                .wait_event_interruptible(&self.interrupt, "reader", || {
                    !pipe.ring.lock().is_empty()
                })
                .await?;
        }
    }

    /// Write into free space, sleeping while the pipe is full
    ///
    /// # Errors
    /// `BadDescriptor` on a read-only handle, `WouldBlock` on a full pipe
    /// in non-blocking mode, `Interrupted`, `Fault`
    pub async fn write<B: UserSlice + ?Sized>(&mut self, data: &B) -> Result<usize, DevError> {
        if !self.flags.mode.can_write() {
            return Err(DevError::BadDescriptor);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let pipe = &*self.pipe;
        loop {
            {
                let mut ring = pipe.ring.lock();
                if ring.free() > 0 {
                    let n = ring.write(data)?;
                    drop(ring);
                    log::trace!("{}: wrote {n} bytes", pipe.name());
                    pipe.inq.wake_up_all();
                    return Ok(n);
                }
            }
            if self.flags.nonblock {
                return Err(DevError::WouldBlock);
            }
            log::trace!("{}: writer going to sleep", pipe.name());
            pipe.outq
                .wait_event_interruptible(&self.interrupt, "writer", || {
                    pipe.ring.lock().free() > 0
                })
                .await?;
        }
    }

    pub fn close(self) {
        log::debug!("{}: close", self.pipe.name());
    }
}

impl embedded_io_async::ErrorType for PipeFile {
    type Error = DevError;
}

impl embedded_io_async::Read for PipeFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        PipeFile::read(self, buf).await
    }
}

impl embedded_io_async::Write for PipeFile {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        PipeFile::write(self, buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_wraps() {
        let mut ring = Ring::new(4);
        assert_eq!(ring.write(b"abc").unwrap(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(ring.read(&mut buf[..]).unwrap(), 2);
        assert_eq!(&buf, b"ab");

        // one byte up to the end, then the rest from the start
        assert_eq!(ring.contiguous_free(), 1);
        assert_eq!(ring.write(b"de").unwrap(), 1);
        assert_eq!(ring.write(b"e").unwrap(), 1);
        assert_eq!(ring.write(b"f").unwrap(), 1);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.write(b"g").unwrap(), 0);

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out[..]).unwrap(), 2);
        assert_eq!(&out[..2], b"cd");
        assert_eq!(ring.read(&mut out[..]).unwrap(), 2);
        assert_eq!(&out[..2], b"ef");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_fault_leaves_state() {
        struct Broken;
        impl UserSlice for Broken {
            fn len(&self) -> usize {
                3
            }
            fn copy_from_user(
                &self,
                _offset: usize,
                _dst: &mut [u8],
            ) -> Result<(), crate::uaccess::Fault> {
                Err(crate::uaccess::Fault)
            }
        }
        let mut ring = Ring::new(4);
        assert_eq!(ring.write(&Broken), Err(DevError::Fault));
        assert!(ring.is_empty());
        assert_eq!(ring.wp, 0);
    }
}
