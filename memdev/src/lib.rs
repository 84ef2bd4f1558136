//! In-memory character devices
//!
//! `memdev` keeps byte-addressable storage instances in RAM, organised as a
//! chain of index blocks that point to fixed-size quanta:
//!
//! ```text
//!  QsetChain
//!  ┌────────────┐   ┌────────────┐
//!  │ IndexBlock ├──►│ IndexBlock ├──► ...
//!  └─────┬──────┘   └────────────┘
//!        │ qset slots
//!        ▼
//!  [Quantum][Quantum][  hole ][Quantum] ...
//! ```
//!
//! Storage is opened through a [`Registry`] and accessed with the
//! read/write/seek/ioctl operations of a [`ScullFile`]. The registry also
//! carries a blocking [`pipe`] device and a [`sleepy`] device.

pub mod budget;
pub mod config;
pub mod device;
pub mod error;
pub mod file;
pub mod geometry;
pub mod interrupt;
pub mod ioctl;
pub mod pipe;
pub mod qset;
pub mod registry;
pub mod sleepy;
pub mod storage;
pub mod uaccess;
pub mod wait_queue;

pub use budget::{MemoryBudget, MemoryPermit};
pub use config::{ConfigError, DeviceConfig};
pub use device::ScullDev;
pub use error::DevError;
pub use file::{Credentials, OpenFlags, OpenMode, ScullFile};
pub use geometry::Geometry;
pub use interrupt::Interrupt;
pub use ioctl::Control;
pub use pipe::{PipeFile, ScullPipe};
pub use registry::Registry;
pub use sleepy::Sleepy;
pub use uaccess::{Fault, UserInt, UserSlice, UserSliceMut};
