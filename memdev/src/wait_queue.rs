//! Wait queue
//!
//! Lets async tasks sleep until another task changes some shared state.
//!
//! The waker changes the state first and then calls
//! [`WaitQueue::wake_up_all`]. The sleeper must not miss a wake-up that
//! happens between its condition check and its registration, so the check
//! is repeated while the queue lock is held:
//!
//! ```ignore
//! if !condition() {
//!     let lock = queue.get_lock();
//!     if !condition() {
//!         queue.wait_async("reader", lock).await;
//!     }
//! }
//! ```
//!
//! [`WaitQueue::wait_event_interruptible`] wraps this loop and adds
//! cancellation through an [`Interrupt`].

use parking_lot::{Mutex, MutexGuard};

use crate::error::DevError;
use crate::interrupt::Interrupt;

struct WaitingClient {
    sender: tokio::sync::oneshot::Sender<()>,
    debug_hint: String,
}

impl std::fmt::Debug for WaitingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingClient")
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

/// Registered sleepers; only reachable through [`WaitQueue::get_lock`]
#[derive(Debug, Default)]
pub struct Waiters {
    clients: Vec<WaitingClient>,
}

#[derive(Debug)]
pub struct WaitQueue {
    name: String,
    waiters: Mutex<Waiters>,
}

impl WaitQueue {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            waiters: Mutex::new(Waiters::default()),
        }
    }

    /// Lock for the atomic condition-check + register step
    pub fn get_lock(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock()
    }

    /// Number of registered sleepers
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.lock().clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register as a sleeper and wait for the next wake-up
    ///
    /// Consumes the lock taken by [`WaitQueue::get_lock`] and releases it
    /// before the returned future is polled.
    pub fn wait_async(
        &self,
        debug_hint: &str,
        mut lock: MutexGuard<'_, Waiters>,
    ) -> impl std::future::Future<Output = ()> + Send {
        let (tx, rx) = tokio::sync::oneshot::channel();
        lock.clients.push(WaitingClient {
            sender: tx,
            debug_hint: debug_hint.to_string(),
        });
        drop(lock);

        // An error means the queue went away with us still registered;
        // waking up is the only sensible reaction.
        async move {
            let _ = rx.await;
        }
    }

    /// Wake every registered sleeper
    pub fn wake_up_all(&self) {
        let clients = std::mem::take(&mut self.waiters.lock().clients);
        if clients.is_empty() {
            return;
        }
        log::trace!("{}: waking {} sleeper(s)", self.name, clients.len());
        for client in clients {
            if client.sender.send(()).is_err() {
                // sleeper was cancelled while registered
                log::trace!("{}: sleeper '{}' already gone", self.name, client.debug_hint);
            }
        }
    }

    /// Sleep until `condition` holds
    ///
    /// Returns at once if it already holds, whatever the interrupt state.
    ///
    /// # Errors
    /// `Interrupted` if `interrupt` is raised while sleeping
    pub async fn wait_event_interruptible<F>(
        &self,
        interrupt: &Interrupt,
        debug_hint: &str,
        mut condition: F,
    ) -> Result<(), DevError>
    where
        F: FnMut() -> bool,
    {
        loop {
            if condition() {
                return Ok(());
            }
            let woken = {
                let lock = self.get_lock();
                if condition() {
                    return Ok(());
                }
                self.wait_async(debug_hint, lock)
            };
            tokio::select! {
                biased;
                () = woken => {}
                () = interrupt.raised() => {
                    log::debug!("{}: '{}' interrupted", self.name, debug_hint);
                    return Err(DevError::Interrupted);
                }
            }
        }
    }
}
