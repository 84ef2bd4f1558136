//! Load-time configuration of the device set
//!
//! Defaults match the classic module parameters. Every field can be
//! overridden from the environment:
//!
//! | variable              | field              |
//! |-----------------------|--------------------|
//! | `MEMDEV_NR_DEVS`      | `nr_devs`          |
//! | `MEMDEV_QUANTUM`      | `quantum`          |
//! | `MEMDEV_QSET`         | `qset`             |
//! | `MEMDEV_MAJOR`        | `major`            |
//! | `MEMDEV_MINOR`        | `minor`            |
//! | `MEMDEV_PIPE_BUFFER`  | `pipe_buffer_size` |
//! | `MEMDEV_MEMORY_LIMIT` | `memory_limit`     |
//!
//! `MEMDEV_MEMORY_LIMIT=unlimited` removes the memory limit.

use std::collections::HashMap;
use std::os::raw::c_int;
use std::str::FromStr;

use crate::geometry::{Geometry, SCULL_QSET, SCULL_QUANTUM};

/// Dynamic major number
pub const SCULL_MAJOR: u32 = 0;
pub const SCULL_NR_DEVS: usize = 4;
pub const PIPE_BUFFER_SIZE: usize = 16;
/// Storage memory shared by all instances unless configured otherwise
pub const DEFAULT_MEMORY_LIMIT: usize = 64 << 20;

pub const ENV_NR_DEVS: &str = "MEMDEV_NR_DEVS";
pub const ENV_QUANTUM: &str = "MEMDEV_QUANTUM";
pub const ENV_QSET: &str = "MEMDEV_QSET";
pub const ENV_MAJOR: &str = "MEMDEV_MAJOR";
pub const ENV_MINOR: &str = "MEMDEV_MINOR";
pub const ENV_PIPE_BUFFER: &str = "MEMDEV_PIPE_BUFFER";
pub const ENV_MEMORY_LIMIT: &str = "MEMDEV_MEMORY_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Parse { var: &'static str, value: String },

    #[error("{var}: value {value} out of range")]
    OutOfRange { var: &'static str, value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub major: u32,
    /// First minor number; instances use `minor..minor + nr_devs`
    pub minor: u32,
    pub nr_devs: usize,
    /// Initial and post-reset quantum size of every storage instance
    pub quantum: c_int,
    /// Initial and post-reset fanout of every storage instance
    pub qset: c_int,
    pub pipe_buffer_size: usize,
    /// Upper bound for storage memory shared by all instances; `None`
    /// means only the allocator limits it
    pub memory_limit: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            major: SCULL_MAJOR,
            minor: 0,
            nr_devs: SCULL_NR_DEVS,
            quantum: SCULL_QUANTUM,
            qset: SCULL_QSET,
            pipe_buffer_size: PIPE_BUFFER_SIZE,
            memory_limit: Some(DEFAULT_MEMORY_LIMIT),
        }
    }
}

impl DeviceConfig {
    #[must_use]
    pub fn nr_devs(self, nr_devs: usize) -> Self {
        Self { nr_devs, ..self }
    }

    #[must_use]
    pub fn quantum(self, quantum: c_int) -> Self {
        Self { quantum, ..self }
    }

    #[must_use]
    pub fn qset(self, qset: c_int) -> Self {
        Self { qset, ..self }
    }

    #[must_use]
    pub fn major(self, major: u32) -> Self {
        Self { major, ..self }
    }

    #[must_use]
    pub fn minor(self, minor: u32) -> Self {
        Self { minor, ..self }
    }

    #[must_use]
    pub fn pipe_buffer_size(self, pipe_buffer_size: usize) -> Self {
        Self {
            pipe_buffer_size,
            ..self
        }
    }

    #[must_use]
    pub fn memory_limit(self, limit: usize) -> Self {
        Self {
            memory_limit: Some(limit),
            ..self
        }
    }

    #[must_use]
    pub fn unlimited_memory(self) -> Self {
        Self {
            memory_limit: None,
            ..self
        }
    }

    /// Default geometry for the storage instances
    ///
    /// # Errors
    /// `OutOfRange` naming the offending variable
    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::new(self.quantum, self.qset).map_err(|_| {
            if self.quantum > 0 {
                ConfigError::OutOfRange {
                    var: ENV_QSET,
                    value: i64::from(self.qset),
                }
            } else {
                ConfigError::OutOfRange {
                    var: ENV_QUANTUM,
                    value: i64::from(self.quantum),
                }
            }
        })
    }

    /// Defaults overridden by the process environment
    ///
    /// # Errors
    /// See [`DeviceConfig::from_map`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("MEMDEV_"))
            .collect();
        Self::from_map(&vars)
    }

    /// Defaults overridden by the `MEMDEV_*` entries of `vars`
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    /// `Parse` for non-numeric values, `OutOfRange` for a zero pipe
    /// buffer or non-positive geometry
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = parse(vars, ENV_NR_DEVS)? {
            config.nr_devs = v;
        }
        if let Some(v) = parse(vars, ENV_QUANTUM)? {
            config.quantum = v;
        }
        if let Some(v) = parse(vars, ENV_QSET)? {
            config.qset = v;
        }
        if let Some(v) = parse(vars, ENV_MAJOR)? {
            config.major = v;
        }
        if let Some(v) = parse(vars, ENV_MINOR)? {
            config.minor = v;
        }
        if let Some(v) = parse(vars, ENV_PIPE_BUFFER)? {
            config.pipe_buffer_size = v;
        }
        match vars.get(ENV_MEMORY_LIMIT).map(|v| v.trim()) {
            Some("unlimited") => config.memory_limit = None,
            Some(_) => config.memory_limit = parse(vars, ENV_MEMORY_LIMIT)?,
            None => {}
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `OutOfRange` for a zero pipe buffer or non-positive geometry
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;
        if self.pipe_buffer_size == 0 {
            return Err(ConfigError::OutOfRange {
                var: ENV_PIPE_BUFFER,
                value: 0,
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(
    vars: &HashMap<String, String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = vars.get(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Parse {
            var,
            value: value.clone(),
        })
}
