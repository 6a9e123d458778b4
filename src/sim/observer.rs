//! Tracking which memory locations have changed.
//!
//! The simulator's [`ChangeObserver`] records every address written
//! since the last drain, whether by executed code or by loading an
//! object file. Frontends drain it with [`ChangeObserver::take_mem_changes`]
//! to refresh only the memory rows that went stale.
//!
//! You would typically access the observer via the [`Simulator::observer`]
//! field.
//!
//! [`Simulator::observer`]: crate::sim::Simulator::observer

use std::collections::BTreeSet;

/// Records the set of memory addresses written since the last drain.
#[derive(Debug, Default)]
pub struct ChangeObserver {
    mem: BTreeSet<u16>
}
impl ChangeObserver {
    /// Creates a new observer with no changes recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a memory location as changed.
    pub fn set_mem_changed(&mut self, addr: u16) {
        self.mem.insert(addr);
    }

    /// Whether the given location has changed since the last drain.
    pub fn mem_changed(&self, addr: u16) -> bool {
        self.mem.contains(&addr)
    }

    /// Takes all changes recorded since the last drain, clearing them.
    ///
    /// The iterator is sorted in address order.
    pub fn take_mem_changes(&mut self) -> impl Iterator<Item = u16> {
        std::mem::take(&mut self.mem).into_iter()
    }

    /// Clears all recorded changes without reporting them.
    pub fn clear(&mut self) {
        self.mem.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ChangeObserver;

    #[test]
    fn test_take_is_sorted_and_clears() {
        let mut obs = ChangeObserver::new();
        obs.set_mem_changed(0x4000);
        obs.set_mem_changed(0x3000);
        obs.set_mem_changed(0x4000);

        assert!(obs.mem_changed(0x3000));
        let changes: Vec<_> = obs.take_mem_changes().collect();
        assert_eq!(changes, vec![0x3000, 0x4000]);

        // drained
        assert!(!obs.mem_changed(0x3000));
        assert_eq!(obs.take_mem_changes().count(), 0);
    }
}
