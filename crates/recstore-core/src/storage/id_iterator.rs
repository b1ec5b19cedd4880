//! Iteration over the id space of a store
//!
//! A [`StoreIdIterator`] walks ids, not records: callers check
//! `is_in_use` or load the record themselves. Forward iteration picks up
//! ids allocated while it runs, so it is not a snapshot.

use crate::storage::record_store::RecordStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Forward { next: u64, high: u64 },
    Backward { next: Option<u64>, floor: u64 },
}

/// Lazy, finite walk over the ids of a store
pub struct StoreIdIterator<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    cursor: Cursor,
}

impl<'a, S: RecordStore + ?Sized> StoreIdIterator<'a, S> {
    /// Ascending from the first unreserved id to the high id, which is
    /// re-read each time the cursor catches up with it
    pub fn forward(store: &'a S) -> Self {
        Self {
            store,
            cursor: Cursor::Forward {
                next: store.number_of_reserved_low_ids(),
                high: store.high_id(),
            },
        }
    }

    /// Descending from the highest possible id in use; never yields id 0
    /// or a reserved id
    pub fn backward(store: &'a S) -> Self {
        Self {
            store,
            cursor: Cursor::Backward {
                next: store.highest_possible_id_in_use(),
                floor: store.number_of_reserved_low_ids().max(1),
            },
        }
    }

    /// Whether another id remains
    pub fn has_next(&mut self) -> bool {
        match &mut self.cursor {
            Cursor::Forward { next, high } => {
                if *next < *high {
                    return true;
                }
                *high = self.store.high_id();
                *next < *high
            }
            Cursor::Backward { next, floor } => next.is_some_and(|id| id >= *floor),
        }
    }

    /// Yield the next id
    ///
    /// Fails with [`Error::IterationExhausted`] when nothing remains.
    pub fn next_id(&mut self) -> Result<u64> {
        if !self.has_next() {
            return Err(Error::IterationExhausted);
        }
        match &mut self.cursor {
            Cursor::Forward { next, .. } => {
                let id = *next;
                *next += 1;
                Ok(id)
            }
            Cursor::Backward { next, .. } => {
                let id = next.ok_or(Error::IterationExhausted)?;
                *next = id.checked_sub(1);
                Ok(id)
            }
        }
    }
}

impl<S: RecordStore + ?Sized> Iterator for StoreIdIterator<'_, S> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.next_id().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::dynamic::DynamicStore;
    use crate::storage::format::{DynamicFormat, DynamicKind, NodeFormat};
    use crate::storage::record::NodeRecord;
    use crate::storage::record_store::CommonStore;
    use tempfile::TempDir;

    fn create_dynamic_store() -> (DynamicStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let format = DynamicFormat::new(DynamicKind::Array, "ArrayPropertyStore", 32).unwrap();
        let store =
            DynamicStore::open_dynamic(dir.path().join("arrays.store"), format, &StoreConfig::small())
                .unwrap();
        (store, dir)
    }

    #[test]
    fn test_forward_skips_reserved() {
        let (store, _dir) = create_dynamic_store();
        store.set_high_id(5);
        let ids: Vec<u64> = StoreIdIterator::forward(&store).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_forward_sees_growth() {
        let (store, _dir) = create_dynamic_store();
        store.set_high_id(5);

        let mut iter = StoreIdIterator::forward(&store);
        let mut seen = vec![];
        for _ in 0..3 {
            seen.push(iter.next_id().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);

        store.set_high_id(7);
        seen.extend(iter);
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_exhausted_next_fails() {
        let (store, _dir) = create_dynamic_store();
        let mut iter = StoreIdIterator::forward(&store);
        assert!(!iter.has_next());
        assert!(matches!(iter.next_id(), Err(Error::IterationExhausted)));
    }

    #[test]
    fn test_backward() {
        let (store, _dir) = create_dynamic_store();
        store.set_high_id(5);
        let ids: Vec<u64> = StoreIdIterator::backward(&store).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_backward_stops_before_zero() {
        let dir = TempDir::new().unwrap();
        let store =
            CommonStore::open(dir.path().join("nodes.store"), NodeFormat, &StoreConfig::small())
                .unwrap();
        assert_eq!(StoreIdIterator::backward(&store).count(), 0);

        for id in 0..3 {
            store.update_record(&NodeRecord::created(id)).unwrap();
        }
        let ids: Vec<u64> = StoreIdIterator::backward(&store).collect();
        assert_eq!(ids, vec![2, 1]);
        let ids: Vec<u64> = StoreIdIterator::forward(&store).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
