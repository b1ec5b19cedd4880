//! Record id sequence
//!
//! Hands out record ids for one store: freed ids are reused lowest first,
//! otherwise the high-id watermark is bumped. The watermark is an atomic
//! counter so readers (iterators, scans) never take the free-list lock.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Id allocation contract consumed by record stores and dynamic allocators
pub trait IdGenerator: Send + Sync {
    /// Next unused id
    fn next_id(&self) -> Result<u64>;

    /// Make `id` available for reuse
    fn free_id(&self, id: u64);

    /// Record that `id` holds a live record, raising the high id if needed
    fn mark_used(&self, id: u64);

    /// Exclusive upper bound of ever-allocated ids
    fn high_id(&self) -> u64;

    /// Overwrite the high id (recovery)
    fn set_high_id(&self, high_id: u64);

    /// Highest id that may be in use, `None` when nothing was allocated
    fn highest_possible_id_in_use(&self) -> Option<u64>;

    /// Highest id the store format can address
    fn max_id(&self) -> u64;

    /// Ids below this are never handed out
    fn reserved_low_ids(&self) -> u64;
}

/// In-process id sequence with a free list
#[derive(Debug)]
pub struct IdSequence {
    store: &'static str,
    high_id: AtomicU64,
    free_ids: Mutex<BTreeSet<u64>>,
    reserved_low_ids: u64,
    max_id: u64,
}

impl IdSequence {
    /// Create an empty sequence
    pub fn new(store: &'static str, reserved_low_ids: u64, max_id: u64) -> Self {
        Self {
            store,
            high_id: AtomicU64::new(reserved_low_ids),
            free_ids: Mutex::new(BTreeSet::new()),
            reserved_low_ids,
            max_id,
        }
    }

    /// Rebuild a sequence from a scan of the store file
    pub fn rebuilt(
        store: &'static str,
        reserved_low_ids: u64,
        max_id: u64,
        high_id: u64,
        free_ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        let high_id = high_id.max(reserved_low_ids);
        let free: BTreeSet<u64> = free_ids
            .into_iter()
            .filter(|&id| id >= reserved_low_ids && id < high_id)
            .collect();
        Self {
            store,
            high_id: AtomicU64::new(high_id),
            free_ids: Mutex::new(free),
            reserved_low_ids,
            max_id,
        }
    }

    /// Number of ids waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free_ids.lock().len()
    }
}

impl IdGenerator for IdSequence {
    fn next_id(&self) -> Result<u64> {
        if let Some(id) = self.free_ids.lock().pop_first() {
            return Ok(id);
        }

        let max_id = self.max_id;
        self.high_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |high| {
                (high <= max_id).then_some(high + 1)
            })
            .map_err(|_| Error::IdExhausted {
                store: self.store,
                max_id,
            })
    }

    fn free_id(&self, id: u64) {
        if id < self.reserved_low_ids || id >= self.high_id() {
            return;
        }
        self.free_ids.lock().insert(id);
    }

    fn mark_used(&self, id: u64) {
        self.high_id.fetch_max(id + 1, Ordering::AcqRel);
        self.free_ids.lock().remove(&id);
    }

    fn high_id(&self) -> u64 {
        self.high_id.load(Ordering::Acquire)
    }

    fn set_high_id(&self, high_id: u64) {
        let high_id = high_id.max(self.reserved_low_ids);
        self.high_id.store(high_id, Ordering::Release);
        self.free_ids.lock().retain(|&id| id < high_id);
    }

    fn highest_possible_id_in_use(&self) -> Option<u64> {
        let high = self.high_id();
        (high > self.reserved_low_ids).then(|| high - 1)
    }

    fn max_id(&self) -> u64 {
        self.max_id
    }

    fn reserved_low_ids(&self) -> u64 {
        self.reserved_low_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_after_reserved_ids() {
        let ids = IdSequence::new("DynamicStore", 1, 100);
        assert_eq!(ids.high_id(), 1);
        assert_eq!(ids.highest_possible_id_in_use(), None);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 2);
        assert_eq!(ids.high_id(), 3);
        assert_eq!(ids.highest_possible_id_in_use(), Some(2));
    }

    #[test]
    fn test_freed_ids_reused_lowest_first() {
        let ids = IdSequence::new("NodeStore", 0, 100);
        for _ in 0..5 {
            ids.next_id().unwrap();
        }
        ids.free_id(3);
        ids.free_id(1);
        ids.free_id(3);
        assert_eq!(ids.free_count(), 2);

        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 3);
        assert_eq!(ids.next_id().unwrap(), 5);
    }

    #[test]
    fn test_reserved_and_unallocated_ids_never_freed() {
        let ids = IdSequence::new("DynamicStore", 1, 100);
        ids.next_id().unwrap();
        ids.free_id(0);
        ids.free_id(50);
        assert_eq!(ids.free_count(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let ids = IdSequence::new("LabelTokenStore", 0, 1);
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);
        let err = ids.next_id().unwrap_err();
        assert!(matches!(err, Error::IdExhausted { max_id: 1, .. }));
    }

    #[test]
    fn test_mark_used_raises_high_id_and_claims_free_id() {
        let ids = IdSequence::new("NodeStore", 0, 100);
        ids.mark_used(9);
        assert_eq!(ids.high_id(), 10);
        ids.free_id(4);
        ids.mark_used(4);
        assert_eq!(ids.free_count(), 0);
        ids.mark_used(2);
        assert_eq!(ids.high_id(), 10);
    }

    #[test]
    fn test_rebuilt_filters_free_ids() {
        let ids = IdSequence::rebuilt("DynamicStore", 1, 100, 6, [0, 2, 4, 8]);
        assert_eq!(ids.high_id(), 6);
        assert_eq!(ids.free_count(), 2);
        assert_eq!(ids.next_id().unwrap(), 2);
    }

    #[test]
    fn test_set_high_id_drops_free_ids_above() {
        let ids = IdSequence::rebuilt("NodeStore", 0, 100, 10, [2, 8]);
        ids.set_high_id(5);
        assert_eq!(ids.high_id(), 5);
        assert_eq!(ids.free_count(), 1);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = Arc::new(IdSequence::new("NodeStore", 0, u64::MAX - 1));
        let mut handles = vec![];

        for _ in 0..8 {
            let ids = ids.clone();
            handles.push(thread::spawn(move || {
                (0..500).map(|_| ids.next_id().unwrap()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(ids.high_id(), 4000);
    }
}
