//! Storage engine state of one instance
//!
//! `Storage` is the data behind an instance lock: the indirection chain,
//! the current geometry and the logical size. It does no locking of its
//! own; [`ScullDev`](crate::device::ScullDev) serializes access to it.

use std::sync::Arc;

use crate::budget::MemoryBudget;
use crate::error::DevError;
use crate::geometry::Geometry;
use crate::qset::QsetChain;
use crate::uaccess::{UserSlice, UserSliceMut};

pub struct Storage {
    chain: QsetChain,
    geometry: Geometry,
    defaults: Geometry,
    size: u64,
    budget: Arc<MemoryBudget>,
}

impl Storage {
    #[must_use]
    pub fn new(defaults: Geometry, budget: Arc<MemoryBudget>) -> Self {
        Self {
            chain: QsetChain::new(),
            geometry: defaults,
            defaults,
            size: 0,
            budget,
        }
    }

    /// High-water mark of bytes ever written since the last trim
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub fn default_geometry(&self) -> Geometry {
        self.defaults
    }

    /// Number of index blocks in the chain
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Change the geometry in place
    ///
    /// Existing data is not migrated: later accesses use the new mapping,
    /// so previously written bytes may appear at different offsets.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        if !self.chain.is_empty() && geometry != self.geometry {
            log::warn!(
                "geometry changed from {:?} to {:?} with {} bytes stored; existing data is not remapped",
                self.geometry,
                geometry,
                self.size
            );
        } else {
            log::debug!("geometry set to {geometry:?}");
        }
        self.geometry = geometry;
    }

    /// Read at `pos` into `buf`, stopping at the end of the current quantum
    ///
    /// Returns 0 at or past the logical size and for holes. The chain is
    /// never grown by a read.
    ///
    /// # Errors
    /// `Fault` if `buf` cannot be written
    pub fn read_at<B: UserSliceMut + ?Sized>(
        &self,
        pos: u64,
        buf: &mut B,
    ) -> Result<usize, DevError> {
        if pos >= self.size {
            return Ok(0);
        }
        let remaining = self.size - pos;
        let g = self.geometry;
        let addr = g.address_of(pos);

        let Some(quantum) = self
            .chain
            .peek(addr.block)
            .and_then(|block| block.quantum(addr.slot))
        else {
            log::trace!("read pos={pos}: hole at {addr:?}");
            return Ok(0);
        };

        // quantum may be shorter than the geometry if it was allocated
        // before the quantum size grew
        let in_quantum = g
            .quantum()
            .min(quantum.len())
            .saturating_sub(addr.byte);
        let count = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(buf.len())
            .min(in_quantum);
        if count == 0 {
            return Ok(0);
        }

        buf.copy_to_user(0, &quantum.bytes()[addr.byte..addr.byte + count])?;
        log::trace!("read pos={pos} count={count} at {addr:?}");
        Ok(count)
    }

    /// Write `data` at `pos`, stopping at the end of the current quantum
    ///
    /// Allocates the index blocks, slot array and quantum the position needs.
    ///
    /// # Errors
    /// `NoMemory` if an allocation fails; blocks allocated before the failure
    /// stay linked and no bytes are written. `Fault` if `data` cannot be
    /// read; the logical size is left unchanged.
    pub fn write_at<B: UserSlice + ?Sized>(
        &mut self,
        pos: u64,
        data: &B,
    ) -> Result<usize, DevError> {
        let g = self.geometry;
        let addr = g.address_of(pos);

        let block = self.chain.follow(addr.block, &self.budget)?;
        let quantum = block.quantum_or_alloc(addr.slot, g.qset(), g.quantum(), &self.budget)?;

        let count = data.len().min(g.quantum() - addr.byte);
        data.copy_from_user(0, &mut quantum.bytes_mut()[addr.byte..addr.byte + count])?;

        let end = pos + count as u64;
        if self.size < end {
            self.size = end;
        }
        log::trace!("write pos={pos} count={count} at {addr:?}, size={}", self.size);
        Ok(count)
    }

    /// Free all data and restore the default geometry
    pub fn trim(&mut self) {
        log::debug!(
            "trim: dropping {} blocks, {} bytes",
            self.chain.len(),
            self.size
        );
        self.chain = QsetChain::new();
        self.size = 0;
        self.geometry = self.defaults;
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("geometry", &self.geometry)
            .field("size", &self.size)
            .field("blocks", &self.chain.len())
            .finish_non_exhaustive()
    }
}
