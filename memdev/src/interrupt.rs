//! Cancellation of blocking waits
//!
//! An [`Interrupt`] plays the role of a pending signal for whoever holds an
//! open handle. Raising it makes any wait that the handle is blocked in
//! (instance lock, pipe space, sleepy flag) return
//! [`DevError::Interrupted`] instead of blocking further.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::error::DevError;

#[derive(Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation signal; clones share state
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every task waiting on it
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Clear a raised signal so later waits block normally again
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Resolve once the signal is raised
    pub async fn raised(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // register before checking the flag so a concurrent raise() is not lost
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// Acquire `mutex`, giving up if `interrupt` is raised while blocked
///
/// An uncontended lock is taken even when the signal is already pending.
///
/// # Errors
/// `Interrupted` if the signal arrives before the lock is acquired
pub async fn lock_interruptible<'a, T>(
    mutex: &'a Mutex<T>,
    interrupt: &Interrupt,
) -> Result<MutexGuard<'a, T>, DevError> {
    if let Ok(guard) = mutex.try_lock() {
        return Ok(guard);
    }
    tokio::select! {
        biased;
        guard = mutex.lock() => Ok(guard),
        () = interrupt.raised() => Err(DevError::Interrupted),
    }
}
