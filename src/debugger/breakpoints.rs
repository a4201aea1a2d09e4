//! Software breakpoint manager: monotonic ids, an address-ordered map, and
//! the ARM64 `BRK #0` trap encoding (spec §4.5 "Breakpoint manager").

use std::collections::BTreeMap;

use super::error::DebugError;

/// ARM64 `BRK #0`, little-endian bytes of the 32-bit instruction word
/// `0xd4200000` (spec's "software-breakpoint encoding").
pub const BRK_0: [u8; 4] = 0xd420_0000u32.to_le_bytes();

/// Something that can read/write 4-byte-aligned words of target memory.
/// Implemented over the debugger's task port in production, and over a
/// plain map in tests, so the breakpoint invariants (P5, L1) can be
/// exercised without a live process.
pub trait BreakpointMemory {
    fn read4(&self, address: u64) -> Result<[u8; 4], DebugError>;
    fn write4(&self, address: u64, bytes: [u8; 4]) -> Result<(), DebugError>;
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Breakpoint {
    pub id: u64,
    pub address: u64,
    pub original: [u8; 4],
    pub enabled: bool,
    pub hit_count: u64,
}

#[derive(Debug, Default)]
pub struct BreakpointManager {
    next_id: u64,
    by_address: BTreeMap<u64, Breakpoint>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a breakpoint at `address`, or returns the id of one already
    /// there (spec's "identical repeated sets are idempotent", L1).
    pub fn set(&mut self, mem: &impl BreakpointMemory, address: u64) -> Result<u64, DebugError> {
        if let Some(existing) = self.by_address.get(&address) {
            return Ok(existing.id);
        }

        let original = mem.read4(address)?;
        mem.write4(address, BRK_0)?;

        self.next_id += 1;
        let id = self.next_id;
        self.by_address.insert(
            address,
            Breakpoint {
                id,
                address,
                original,
                enabled: true,
                hit_count: 0,
            },
        );
        Ok(id)
    }

    pub fn remove(&mut self, mem: &impl BreakpointMemory, id: u64) -> Result<(), DebugError> {
        let Some(address) = self.address_of(id) else {
            return Ok(());
        };
        self.remove_at(mem, address)
    }

    pub fn remove_at(&mut self, mem: &impl BreakpointMemory, address: u64) -> Result<(), DebugError> {
        if let Some(bp) = self.by_address.remove(&address) {
            mem.write4(address, bp.original)?;
        }
        Ok(())
    }

    pub fn enable(&mut self, mem: &impl BreakpointMemory, id: u64) -> Result<(), DebugError> {
        let Some(address) = self.address_of(id) else {
            return Ok(());
        };
        mem.write4(address, BRK_0)?;
        if let Some(bp) = self.by_address.get_mut(&address) {
            bp.enabled = true;
        }
        Ok(())
    }

    pub fn disable(&mut self, mem: &impl BreakpointMemory, id: u64) -> Result<(), DebugError> {
        let Some(address) = self.address_of(id) else {
            return Ok(());
        };
        if let Some(bp) = self.by_address.get(&address) {
            mem.write4(address, bp.original)?;
        }
        if let Some(bp) = self.by_address.get_mut(&address) {
            bp.enabled = false;
        }
        Ok(())
    }

    /// Increments the hit counter for the enabled breakpoint at `address`,
    /// if any. Called by the caller on exception delivery (spec's `hit()`).
    pub fn hit(&mut self, address: u64) -> Option<u64> {
        let bp = self.by_address.get_mut(&address)?;
        if !bp.enabled {
            return None;
        }
        bp.hit_count += 1;
        Some(bp.hit_count)
    }

    pub fn at(&self, address: u64) -> Option<&Breakpoint> {
        self.by_address.get(&address)
    }

    fn address_of(&self, id: u64) -> Option<u64> {
        self.by_address
            .values()
            .find(|bp| bp.id == id)
            .map(|bp| bp.address)
    }

    /// Breakpoints in ascending id order (spec §5 "Ordering guarantees").
    pub fn iter_by_id(&self) -> impl Iterator<Item = &Breakpoint> {
        let mut all: Vec<&Breakpoint> = self.by_address.values().collect();
        all.sort_by_key(|bp| bp.id);
        all.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMemory(RefCell<HashMap<u64, [u8; 4]>>);

    impl FakeMemory {
        fn seeded(pairs: &[(u64, [u8; 4])]) -> Self {
            Self(RefCell::new(pairs.iter().copied().collect()))
        }
    }

    impl BreakpointMemory for FakeMemory {
        fn read4(&self, address: u64) -> Result<[u8; 4], DebugError> {
            Ok(*self.0.borrow().get(&address).unwrap_or(&[0; 4]))
        }
        fn write4(&self, address: u64, bytes: [u8; 4]) -> Result<(), DebugError> {
            self.0.borrow_mut().insert(address, bytes);
            Ok(())
        }
    }

    // P5 / L1: set-hit-remove cycle and idempotent double-set.
    #[test]
    fn set_hit_remove_cycle() {
        let mem = FakeMemory::seeded(&[(0x1000, [0xde, 0xad, 0xbe, 0xef])]);
        let mut mgr = BreakpointManager::new();

        let id = mgr.set(&mem, 0x1000).unwrap();
        assert_eq!(mem.read4(0x1000).unwrap(), BRK_0);

        let id_again = mgr.set(&mem, 0x1000).unwrap();
        assert_eq!(id, id_again);
        assert_eq!(mgr.at(0x1000).unwrap().original, [0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(mgr.hit(0x1000), Some(1));
        assert_eq!(mgr.at(0x1000).unwrap().hit_count, 1);

        mgr.remove(&mem, id).unwrap();
        assert_eq!(mem.read4(0x1000).unwrap(), [0xde, 0xad, 0xbe, 0xef]);
        assert!(mgr.at(0x1000).is_none());
    }

    #[test]
    fn disabled_breakpoint_does_not_record_hits() {
        let mem = FakeMemory::seeded(&[(0x2000, [1, 2, 3, 4])]);
        let mut mgr = BreakpointManager::new();
        let id = mgr.set(&mem, 0x2000).unwrap();
        mgr.disable(&mem, id).unwrap();
        assert_eq!(mem.read4(0x2000).unwrap(), [1, 2, 3, 4]);
        assert_eq!(mgr.hit(0x2000), None);
    }

    #[test]
    fn ids_are_assigned_in_monotonic_order() {
        let mem = FakeMemory::default();
        let mut mgr = BreakpointManager::new();
        let a = mgr.set(&mem, 0x10).unwrap();
        let b = mgr.set(&mem, 0x20).unwrap();
        let c = mgr.set(&mem, 0x05).unwrap();
        let ids: Vec<u64> = mgr.iter_by_id().map(|bp| bp.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }
}
