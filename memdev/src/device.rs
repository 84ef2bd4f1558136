//! One storage instance and its lock

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::budget::MemoryBudget;
use crate::error::DevError;
use crate::geometry::Geometry;
use crate::interrupt::{lock_interruptible, Interrupt};
use crate::storage::Storage;

/// A storage instance
///
/// All state sits behind a single lock. Handles opened on the instance
/// share it through an `Arc`.
pub struct ScullDev {
    index: usize,
    storage: Mutex<Storage>,
}

impl ScullDev {
    #[must_use]
    pub fn new(index: usize, defaults: Geometry, budget: Arc<MemoryBudget>) -> Self {
        Self {
            index,
            storage: Mutex::new(Storage::new(defaults, budget)),
        }
    }

    /// Position of the instance in its registry
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> String {
        format!("scull{}", self.index)
    }

    /// Lock the instance state
    ///
    /// # Errors
    /// `Interrupted` if `interrupt` is raised while waiting
    pub async fn lock(&self, interrupt: &Interrupt) -> Result<MutexGuard<'_, Storage>, DevError> {
        lock_interruptible(&self.storage, interrupt).await
    }

    /// Drop all data, waiting for the lock without interruption
    pub async fn teardown(&self) {
        self.storage.lock().await.trim();
    }
}

impl std::fmt::Debug for ScullDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.storage.try_lock() {
            Ok(storage) => write!(f, "ScullDev({}, {:?})", self.index, *storage),
            Err(_) => write!(f, "ScullDev({}, <locked>)", self.index),
        }
    }
}
