//! Sleepy device
//!
//! Readers sleep until somebody writes. Each write releases one reader;
//! the data itself is discarded.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DevError;
use crate::interrupt::Interrupt;
use crate::uaccess::UserSlice;
use crate::wait_queue::WaitQueue;

#[derive(Debug)]
pub struct Sleepy {
    flag: AtomicBool,
    wq: WaitQueue,
}

impl Default for Sleepy {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleepy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            wq: WaitQueue::new("sleepy"),
        }
    }

    /// Sleep until a write arrives, consume it and return 0
    ///
    /// When several readers are woken by one write, the one that clears
    /// the flag returns; the others go back to sleep.
    ///
    /// # Errors
    /// `Interrupted` if `interrupt` is raised while sleeping
    pub async fn read(&self, interrupt: &Interrupt) -> Result<usize, DevError> {
        log::debug!("sleepy: reader going to sleep");
        loop {
            self.wq
                .wait_event_interruptible(interrupt, "sleepy reader", || {
                    self.flag.load(Ordering::SeqCst)
                })
                .await?;
            if self.flag.swap(false, Ordering::SeqCst) {
                break;
            }
        }
        log::debug!("sleepy: reader awoken");
        Ok(0)
    }

    /// Release the sleeping readers; returns the full length of `data`
    pub fn write<B: UserSlice + ?Sized>(&self, data: &B) -> usize {
        log::debug!("sleepy: awakening the readers");
        self.flag.store(true, Ordering::SeqCst);
        self.wq.wake_up_all();
        data.len()
    }

    /// Number of readers currently asleep
    #[must_use]
    pub fn sleepers(&self) -> usize {
        self.wq.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_write_releases_reader_at_once() {
        let sleepy = Sleepy::new();
        assert_eq!(sleepy.write(b"wake"), 4);
        assert_eq!(sleepy.read(&Interrupt::new()).await, Ok(0));
        assert_eq!(sleepy.sleepers(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_reader() {
        let sleepy = Sleepy::new();
        let interrupt = Interrupt::new();
        let raiser = interrupt.clone();
        let (result, ()) = tokio::join!(sleepy.read(&interrupt), async move {
            tokio::task::yield_now().await;
            raiser.raise();
        });
        assert_eq!(result, Err(DevError::Interrupted));
    }
}
