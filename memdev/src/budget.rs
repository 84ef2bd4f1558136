//! Shared memory budget for device storage
//!
//! Every quantum, slot array and index block takes a permit sized to its
//! allocation. Dropping the owner drops the permit and returns the bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::DevError;

pub struct MemoryBudget {
    total_limit: usize,
    current_usage: AtomicUsize,
}

impl MemoryBudget {
    #[must_use]
    pub fn new(total_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            total_limit,
            current_usage: AtomicUsize::new(0),
        })
    }

    /// Budget that never runs out
    #[must_use]
    pub fn unlimited() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    /// Reserve `bytes`, or `None` if the limit would be exceeded
    #[must_use]
    pub fn try_allocate(self: &Arc<Self>, bytes: usize) -> Option<MemoryPermit> {
        let mut current = self.current_usage.load(Ordering::Relaxed);
        loop {
            let next = current.checked_add(bytes)?;
            if next > self.total_limit {
                return None;
            }
            match self.current_usage.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(MemoryPermit {
                        budget: Arc::clone(self),
                        bytes,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Like [`MemoryBudget::try_allocate`], failing with `NoMemory`
    ///
    /// # Errors
    /// `NoMemory` when the limit would be exceeded
    pub fn charge(self: &Arc<Self>, bytes: usize) -> Result<MemoryPermit, DevError> {
        self.try_allocate(bytes).ok_or_else(|| {
            log::debug!(
                "memory budget exhausted: want {bytes}, used {} of {}",
                self.current_usage(),
                self.total_limit
            );
            DevError::NoMemory
        })
    }

    fn release(&self, bytes: usize) {
        self.current_usage.fetch_sub(bytes, Ordering::SeqCst);
    }

    #[must_use]
    pub fn current_usage(&self) -> usize {
        self.current_usage.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_limit(&self) -> usize {
        self.total_limit
    }
}

impl std::fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("total_limit", &self.total_limit)
            .field("current_usage", &self.current_usage())
            .finish()
    }
}

pub struct MemoryPermit {
    budget: Arc<MemoryBudget>,
    bytes: usize,
}

impl MemoryPermit {
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.budget.release(self.bytes);
    }
}
