//! Device set
//!
//! The registry owns every device created at load time: `nr_devs` storage
//! instances on minors `minor..minor + nr_devs`, as many pipes, and one
//! sleepy device. Instances are independent; each has its own lock and
//! geometry. Only the memory budget is shared.

use std::sync::Arc;

use tracing::{debug, info};

use crate::budget::MemoryBudget;
use crate::config::{ConfigError, DeviceConfig};
use crate::device::ScullDev;
use crate::error::DevError;
use crate::file::{Credentials, OpenFlags, ScullFile};
use crate::interrupt::Interrupt;
use crate::pipe::{PipeFile, ScullPipe};
use crate::sleepy::Sleepy;

pub struct Registry {
    config: DeviceConfig,
    budget: Arc<MemoryBudget>,
    devices: Vec<Arc<ScullDev>>,
    pipes: Vec<Arc<ScullPipe>>,
    sleepy: Arc<Sleepy>,
}

impl Registry {
    /// Create all devices
    ///
    /// # Errors
    /// If the configuration does not validate
    pub fn new(config: DeviceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.geometry()?;
        let budget = config
            .memory_limit
            .map_or_else(MemoryBudget::unlimited, MemoryBudget::new);

        let devices = (0..config.nr_devs)
            .map(|i| Arc::new(ScullDev::new(i, geometry, Arc::clone(&budget))))
            .collect();
        let pipes = (0..config.nr_devs)
            .map(|i| Arc::new(ScullPipe::new(i, config.pipe_buffer_size)))
            .collect();

        info!(
            major = config.major,
            minor = config.minor,
            nr_devs = config.nr_devs,
            quantum = config.quantum,
            qset = config.qset,
            pipe_buffer = config.pipe_buffer_size,
            memory_limit = ?config.memory_limit,
            "devices registered"
        );
        Ok(Self {
            config,
            budget,
            devices,
            pipes,
            sleepy: Arc::new(Sleepy::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Number of storage instances
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn device(&self, index: usize) -> Option<&Arc<ScullDev>> {
        self.devices.get(index)
    }

    #[must_use]
    pub fn pipe(&self, index: usize) -> Option<&Arc<ScullPipe>> {
        self.pipes.get(index)
    }

    #[must_use]
    pub fn sleepy(&self) -> &Arc<Sleepy> {
        &self.sleepy
    }

    /// Bytes currently charged to the shared memory budget
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.budget.current_usage()
    }

    /// Open the storage instance on `minor` with a fresh interrupt
    ///
    /// # Errors
    /// See [`Registry::open_with_interrupt`]
    pub async fn open(
        &self,
        minor: u32,
        flags: OpenFlags,
        creds: Credentials,
    ) -> Result<ScullFile, DevError> {
        self.open_with_interrupt(minor, flags, creds, Interrupt::new())
            .await
    }

    /// Open the storage instance on `minor`
    ///
    /// # Errors
    /// `NoDevice` for a minor outside the registry, otherwise as
    /// [`ScullFile::open`]
    pub async fn open_with_interrupt(
        &self,
        minor: u32,
        flags: OpenFlags,
        creds: Credentials,
        interrupt: Interrupt,
    ) -> Result<ScullFile, DevError> {
        let dev = self.lookup(&self.devices, minor)?;
        ScullFile::open(Arc::clone(dev), flags, creds, interrupt).await
    }

    /// Open pipe number `index`
    ///
    /// # Errors
    /// `NoDevice` if there is no such pipe
    pub fn open_pipe(
        &self,
        index: usize,
        flags: OpenFlags,
        interrupt: Interrupt,
    ) -> Result<PipeFile, DevError> {
        let pipe = self.pipes.get(index).ok_or(DevError::NoDevice)?;
        Ok(pipe.open(flags, interrupt))
    }

    /// Trim every storage instance and drop the devices
    ///
    /// Waits for outstanding operations to release their locks.
    pub async fn shutdown(self) {
        futures::future::join_all(self.devices.iter().map(|dev| dev.teardown())).await;
        debug!(
            memory_usage = self.budget.current_usage(),
            "devices unregistered"
        );
    }

    fn lookup<'a, T>(&self, table: &'a [Arc<T>], minor: u32) -> Result<&'a Arc<T>, DevError> {
        minor
            .checked_sub(self.config.minor)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| table.get(i))
            .ok_or_else(|| {
                debug!(minor, "open: no such device");
                DevError::NoDevice
            })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minor_range() {
        let registry = Registry::new(DeviceConfig::default().minor(8).nr_devs(2)).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry
            .open(8, OpenFlags::read_only(), Credentials::user())
            .await
            .is_ok());
        let file = registry
            .open(9, OpenFlags::read_only(), Credentials::user())
            .await
            .unwrap();
        assert_eq!(file.device().index(), 1);
        for minor in [0, 7, 10] {
            assert_eq!(
                registry
                    .open(minor, OpenFlags::read_only(), Credentials::user())
                    .await
                    .map(|_| ()),
                Err(DevError::NoDevice)
            );
        }
        assert!(registry
            .open_pipe(2, OpenFlags::read_only(), Interrupt::new())
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Registry::new(DeviceConfig::default().quantum(0)).is_err());
    }
}
