//! Indirection chain: index blocks holding quanta
//!
//! ```text
//!  head
//!   │
//!   ▼
//! ┌────────────┐ next ┌────────────┐ next
//! │ IndexBlock │─────▶│ IndexBlock │─────▶ ...
//! │ slots[0..s]│      │ slots      │
//! └────────────┘      └────────────┘
//!   │  │
//!   ▼  ▼
//!  Quantum (q bytes) or empty
//! ```
//!
//! Blocks live in an arena and link to each other by [`BlockId`]. A block's
//! slot array and the quanta in it are allocated on the first write that
//! lands there. Every allocation is fallible and charged to a
//! [`MemoryBudget`]; a failed allocation leaves everything created so far in
//! place.

use std::mem::size_of;
use std::sync::Arc;

use crate::budget::{MemoryBudget, MemoryPermit};
use crate::error::DevError;

/// Arena index of an index block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

/// Budget cost of one index block node
#[must_use]
pub fn block_cost() -> usize {
    size_of::<IndexBlock>()
}

/// Budget cost of a slot array with `qset` entries
#[must_use]
pub fn slots_cost(qset: usize) -> usize {
    qset.saturating_mul(size_of::<Option<Quantum>>())
}

/// Fixed-size byte buffer, the unit of allocation
pub struct Quantum {
    data: Vec<u8>,
    _permit: MemoryPermit,
}

impl Quantum {
    /// Allocate a zero-filled quantum of `size` bytes
    ///
    /// # Errors
    /// `NoMemory` if the budget or the allocator refuses
    pub fn new(size: usize, budget: &Arc<MemoryBudget>) -> Result<Self, DevError> {
        let permit = budget.charge(size)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)?;
        data.resize(size, 0);
        Ok(Self {
            data,
            _permit: permit,
        })
    }

    /// Reallocate to `size` bytes, keeping the existing prefix
    fn grown(&self, size: usize, budget: &Arc<MemoryBudget>) -> Result<Self, DevError> {
        let mut bigger = Self::new(size, budget)?;
        bigger.data[..self.data.len()].copy_from_slice(&self.data);
        Ok(bigger)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

struct Slots {
    quanta: Vec<Option<Quantum>>,
    _permit: MemoryPermit,
}

impl Slots {
    fn new(qset: usize, budget: &Arc<MemoryBudget>) -> Result<Self, DevError> {
        let permit = budget.charge(slots_cost(qset))?;
        let mut quanta = Vec::new();
        quanta.try_reserve_exact(qset)?;
        quanta.resize_with(qset, || None);
        Ok(Self {
            quanta,
            _permit: permit,
        })
    }

    fn grown(&mut self, qset: usize, budget: &Arc<MemoryBudget>) -> Result<Self, DevError> {
        let mut bigger = Self::new(qset, budget)?;
        for (dst, src) in bigger.quanta.iter_mut().zip(self.quanta.iter_mut()) {
            *dst = src.take();
        }
        Ok(bigger)
    }
}

/// One link of the chain: an optional slot array plus the next link
pub struct IndexBlock {
    slots: Option<Slots>,
    next: Option<BlockId>,
    _permit: MemoryPermit,
}

impl IndexBlock {
    fn new(budget: &Arc<MemoryBudget>) -> Result<Self, DevError> {
        Ok(Self {
            slots: None,
            next: None,
            _permit: budget.charge(block_cost())?,
        })
    }

    /// Whether the slot array has been allocated
    #[must_use]
    pub fn has_slots(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of entries in the slot array (0 when absent)
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.as_ref().map_or(0, |s| s.quanta.len())
    }

    /// Quantum in `slot`, if the slot array exists and the slot is filled
    #[must_use]
    pub fn quantum(&self, slot: usize) -> Option<&Quantum> {
        self.slots.as_ref()?.quanta.get(slot)?.as_ref()
    }

    /// Quantum in `slot`, allocating the slot array and the quantum as needed
    ///
    /// Arrays and quanta created under a smaller geometry are grown to
    /// `qset` entries and `quantum` bytes; their contents are kept.
    ///
    /// # Errors
    /// `NoMemory` on allocation failure; earlier allocations stay in place
    pub fn quantum_or_alloc(
        &mut self,
        slot: usize,
        qset: usize,
        quantum: usize,
        budget: &Arc<MemoryBudget>,
    ) -> Result<&mut Quantum, DevError> {
        let needed = qset.max(slot + 1);
        let slots = match self.slots.take() {
            Some(slots) if slots.quanta.len() >= needed => slots,
            Some(mut slots) => match slots.grown(needed, budget) {
                Ok(bigger) => bigger,
                Err(e) => {
                    self.slots = Some(slots);
                    return Err(e);
                }
            },
            None => Slots::new(needed, budget)?,
        };
        let slots = self.slots.insert(slots);

        let entry = &mut slots.quanta[slot];
        let q = match entry.take() {
            Some(q) if q.len() >= quantum => q,
            Some(q) => match q.grown(quantum, budget) {
                Ok(bigger) => bigger,
                Err(e) => {
                    *entry = Some(q);
                    return Err(e);
                }
            },
            None => Quantum::new(quantum, budget)?,
        };
        Ok(entry.insert(q))
    }
}

/// Arena-backed singly linked list of index blocks
#[derive(Default)]
pub struct QsetChain {
    blocks: Vec<IndexBlock>,
    head: Option<BlockId>,
}

impl QsetChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of index blocks currently linked
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn alloc(&mut self, budget: &Arc<MemoryBudget>) -> Result<BlockId, DevError> {
        let block = IndexBlock::new(budget)?;
        self.blocks.try_reserve(1)?;
        self.blocks.push(block);
        Ok(BlockId(self.blocks.len() - 1))
    }

    /// Block at position `n`, extending the chain to reach it
    ///
    /// # Errors
    /// `NoMemory` if a link cannot be allocated. Links created before the
    /// failure remain part of the chain.
    pub fn follow(
        &mut self,
        n: u64,
        budget: &Arc<MemoryBudget>,
    ) -> Result<&mut IndexBlock, DevError> {
        let mut cur = match self.head {
            Some(id) => id,
            None => {
                let id = self.alloc(budget)?;
                self.head = Some(id);
                id
            }
        };

        for _ in 0..n {
            cur = match self.blocks[cur.0].next {
                Some(next) => next,
                None => {
                    let next = self.alloc(budget)?;
                    self.blocks[cur.0].next = Some(next);
                    next
                }
            };
        }

        Ok(&mut self.blocks[cur.0])
    }

    /// Block at position `n` without growing the chain
    #[must_use]
    pub fn peek(&self, n: u64) -> Option<&IndexBlock> {
        let mut cur = self.head?;
        for _ in 0..n {
            cur = self.blocks[cur.0].next?;
        }
        Some(&self.blocks[cur.0])
    }
}

impl Drop for QsetChain {
    fn drop(&mut self) {
        if !self.blocks.is_empty() {
            log::trace!("freeing qset chain of {} blocks", self.blocks.len());
        }
    }
}
