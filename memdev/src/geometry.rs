//! Addressing geometry
//!
//! A logical offset is split into three coordinates: which index block in
//! the chain, which slot inside that block, and which byte inside the
//! quantum held by the slot.

use std::os::raw::c_int;

use crate::error::DevError;

/// Default quantum size in bytes
pub const SCULL_QUANTUM: c_int = 4000;
/// Default number of quanta per index block
pub const SCULL_QSET: c_int = 1000;

/// Quantum size and index-block fanout of one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    quantum: u32,
    qset: u32,
}

/// Position of a logical offset inside the indirection chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    /// Index block number in the chain
    pub block: u64,
    /// Slot inside the index block
    pub slot: usize,
    /// Byte inside the quantum
    pub byte: usize,
}

impl Geometry {
    /// Both values must be positive
    ///
    /// # Errors
    /// `InvalidArgument` if either value is zero or negative
    pub fn new(quantum: c_int, qset: c_int) -> Result<Self, DevError> {
        Ok(Self {
            quantum: positive(quantum)?,
            qset: positive(qset)?,
        })
    }

    #[must_use]
    pub fn quantum(self) -> usize {
        self.quantum as usize
    }

    #[must_use]
    pub fn qset(self) -> usize {
        self.qset as usize
    }

    /// Quantum size as the control channel reports it
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn quantum_int(self) -> c_int {
        // constructed from a positive c_int
        self.quantum as c_int
    }

    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn qset_int(self) -> c_int {
        self.qset as c_int
    }

    /// Replace the quantum size, keeping the fanout
    ///
    /// # Errors
    /// `InvalidArgument` for non-positive values
    pub fn with_quantum(self, quantum: c_int) -> Result<Self, DevError> {
        Ok(Self {
            quantum: positive(quantum)?,
            ..self
        })
    }

    /// Replace the fanout, keeping the quantum size
    ///
    /// # Errors
    /// `InvalidArgument` for non-positive values
    pub fn with_qset(self, qset: c_int) -> Result<Self, DevError> {
        Ok(Self {
            qset: positive(qset)?,
            ..self
        })
    }

    /// Bytes covered by one index block
    ///
    /// Both factors fit in 31 bits, so the product fits in `u64`.
    #[must_use]
    pub fn item_size(self) -> u64 {
        u64::from(self.quantum) * u64::from(self.qset)
    }

    #[must_use]
    pub fn address_of(self, pos: u64) -> Address {
        let item_size = self.item_size();
        let quantum = u64::from(self.quantum);
        let rest = pos % item_size;
        // rest < item_size, so both quotients are below u32::MAX
        #[allow(clippy::cast_possible_truncation)]
        let (slot, byte) = ((rest / quantum) as usize, (rest % quantum) as usize);
        Address {
            block: pos / item_size,
            slot,
            byte,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            quantum: SCULL_QUANTUM.unsigned_abs(),
            qset: SCULL_QSET.unsigned_abs(),
        }
    }
}

impl Address {
    /// Logical offset this address stands for under `geometry`
    #[must_use]
    pub fn offset(&self, geometry: Geometry) -> u64 {
        self.block * geometry.item_size()
            + self.slot as u64 * u64::from(geometry.quantum)
            + self.byte as u64
    }
}

fn positive(value: c_int) -> Result<u32, DevError> {
    if value > 0 {
        Ok(value.unsigned_abs())
    } else {
        Err(DevError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_small_geometry() {
        let g = Geometry::new(4, 2).unwrap();
        assert_eq!(g.item_size(), 8);
        assert_eq!(
            g.address_of(0),
            Address {
                block: 0,
                slot: 0,
                byte: 0
            }
        );
        assert_eq!(
            g.address_of(6),
            Address {
                block: 0,
                slot: 1,
                byte: 2
            }
        );
        assert_eq!(
            g.address_of(9),
            Address {
                block: 1,
                slot: 0,
                byte: 1
            }
        );
    }

    #[test]
    fn test_address_recomposes_offset() {
        let geometries = [
            Geometry::default(),
            Geometry::new(1, 1).unwrap(),
            Geometry::new(3, 7).unwrap(),
            Geometry::new(c_int::MAX, c_int::MAX).unwrap(),
        ];
        let positions = [0, 1, 7, 8, 3999, 4000, 4_000_000, 1 << 40, i64::MAX as u64];
        for g in geometries {
            for pos in positions {
                let addr = g.address_of(pos);
                assert_eq!(addr, g.address_of(pos));
                assert!(addr.slot < g.qset());
                assert!(addr.byte < g.quantum());
                assert_eq!(addr.offset(g), pos, "geometry {g:?} pos {pos}");
            }
        }
    }

    #[test]
    fn test_rejects_non_positive() {
        assert_eq!(Geometry::new(0, 10), Err(DevError::InvalidArgument));
        assert_eq!(Geometry::new(10, -1), Err(DevError::InvalidArgument));
        let g = Geometry::default();
        assert_eq!(g.with_quantum(-5), Err(DevError::InvalidArgument));
        assert_eq!(g.with_qset(12).unwrap().qset(), 12);
    }
}
