//! Highest committed transaction id
//!
//! [`HighestTransactionId`] keeps the highest [`TransactionId`] offered so
//! far. The marker is immutable and replaced as a whole through an
//! [`ArcSwap`] compare-and-swap loop, so readers never see a torn triple
//! and writers never block each other.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transaction id of an empty database
pub const BASE_TX_ID: u64 = 1;
/// Checksum paired with [`BASE_TX_ID`]
pub const BASE_TX_CHECKSUM: u32 = 0;
/// Commit timestamp paired with [`BASE_TX_ID`]
pub const BASE_TX_COMMIT_TIMESTAMP: u64 = 0;

/// Transaction id with its checksum and commit timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    /// Transaction id
    pub transaction_id: u64,
    /// Checksum of the transaction's log entry
    pub checksum: u32,
    /// Commit time in milliseconds since the epoch
    pub commit_timestamp: u64,
}

impl TransactionId {
    /// Bundle the three values
    pub fn new(transaction_id: u64, checksum: u32, commit_timestamp: u64) -> Self {
        Self {
            transaction_id,
            checksum,
            commit_timestamp,
        }
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new(BASE_TX_ID, BASE_TX_CHECKSUM, BASE_TX_COMMIT_TIMESTAMP)
    }
}

/// Lock-free tracker of the highest transaction id
#[derive(Debug)]
pub struct HighestTransactionId {
    highest: ArcSwap<TransactionId>,
}

impl Default for HighestTransactionId {
    fn default() -> Self {
        Self::new(TransactionId::default())
    }
}

impl HighestTransactionId {
    /// Start tracking from `initial`
    pub fn new(initial: TransactionId) -> Self {
        Self {
            highest: ArcSwap::from_pointee(initial),
        }
    }

    /// Offer a transaction id; `true` if it became the highest
    ///
    /// Ids below the current highest are rejected without a write. A lost
    /// race is retried only while the winner is still below `transaction_id`.
    pub fn offer(&self, transaction_id: u64, checksum: u32, commit_timestamp: u64) -> bool {
        let mut current = self.highest.load_full();
        if transaction_id < current.transaction_id {
            return false;
        }

        let update = Arc::new(TransactionId::new(transaction_id, checksum, commit_timestamp));
        loop {
            let previous = self.highest.compare_and_swap(&current, Arc::clone(&update));
            if Arc::ptr_eq(&*previous, &current) {
                return true;
            }

            current = self.highest.load_full();
            if current.transaction_id >= transaction_id {
                return false;
            }
        }
    }

    /// Overwrite unconditionally; initialization only
    pub fn set(&self, transaction_id: u64, checksum: u32, commit_timestamp: u64) {
        self.highest.store(Arc::new(TransactionId::new(
            transaction_id,
            checksum,
            commit_timestamp,
        )));
    }

    /// Current highest transaction id
    pub fn get(&self) -> TransactionId {
        **self.highest.load()
    }
}
