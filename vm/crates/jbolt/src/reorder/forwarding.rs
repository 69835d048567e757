//! Forwarding Table - entry address mapping after relocation
//!
//! Every pass that moves code publishes a table mapping each old entry
//! address to the new one. Holders of stale addresses resolve them through
//! the table. A table lives until the next pass replaces it.
//!
//! Usage:
//! 1. Create the table when the pass reaches its safepoint
//! 2. Add an entry for every moved method
//! 3. Mark complete and publish before the safepoint is released
//! 4. Resolve stale addresses until the next pass

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

pub struct ForwardingTable {
    /// Pass that produced this table
    generation: u64,

    /// old address -> new address
    entries: RwLock<IndexMap<usize, usize>>,

    /// No more additions
    complete: AtomicBool,

    entry_count: AtomicUsize,
}

impl ForwardingTable {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            entries: RwLock::new(IndexMap::new()),
            complete: AtomicBool::new(false),
            entry_count: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a move; ignored once the table is complete
    pub fn add_entry(&self, old_address: usize, new_address: usize) {
        if self.is_complete() {
            log::warn!(
                target: crate::logging::LOG_TARGET,
                "forwarding table {} is complete, dropping {:#x} -> {:#x}",
                self.generation,
                old_address,
                new_address
            );
            return;
        }
        if old_address == new_address {
            return;
        }

        let mut entries = self.entries.write();
        if entries.insert(old_address, new_address).is_none() {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Direct lookup of one address
    pub fn lookup(&self, old_address: usize) -> Option<usize> {
        self.entries.read().get(&old_address).copied()
    }

    /// Follow the chain to the final address
    ///
    /// A method parked during a pass moves twice; both hops are recorded.
    /// Addresses that did not move are returned unchanged.
    pub fn forward(&self, address: usize) -> usize {
        let entries = self.entries.read();
        let mut current = address;
        for _ in 0..=entries.len() {
            match entries.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        current
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in insertion order
    pub fn entries(&self) -> Vec<(usize, usize)> {
        self.entries.read().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarding_table() {
        let table = ForwardingTable::new(1);
        table.add_entry(0x1000, 0x2000);
        assert_eq!(table.lookup(0x1000), Some(0x2000));
        assert_eq!(table.lookup(0x3000), None);
        assert_eq!(table.forward(0x3000), 0x3000);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_forward_follows_chain() {
        let table = ForwardingTable::new(2);
        table.add_entry(0x1000, 0x5000);
        table.add_entry(0x5000, 0x9000);
        assert_eq!(table.forward(0x1000), 0x9000);
        assert_eq!(table.forward(0x5000), 0x9000);
    }

    #[test]
    fn test_complete_rejects_additions() {
        let table = ForwardingTable::new(3);
        table.add_entry(0x10, 0x20);
        table.mark_complete();
        table.add_entry(0x30, 0x40);
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries(), vec![(0x10, 0x20)]);
        assert_eq!(table.generation(), 3);
    }

    #[test]
    fn test_identity_move_ignored() {
        let table = ForwardingTable::new(1);
        table.add_entry(0x10, 0x10);
        assert!(table.is_empty());
    }
}
