//! Error types for the record storage layer

use thiserror::Error;

/// Result type alias using the record store Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for record stores
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from store files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors for configuration and metadata
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage-related errors (bad header, unknown store file, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Page cache errors
    #[error("Page cache error: {0}")]
    PageCache(String),

    /// The requested record exists but is not in use
    #[error("Record {id} in {store} is not in use")]
    NotInUse {
        /// Store type descriptor
        store: &'static str,
        /// Record id
        id: u64,
    },

    /// Record bytes violate the store's format
    #[error("Corrupt record {id} in {store}: {reason}")]
    CorruptRecord {
        /// Store type descriptor
        store: &'static str,
        /// Record id
        id: u64,
        /// What was wrong with the bytes
        reason: String,
    },

    /// A record cannot be represented by the store's format
    #[error("Invalid record {id} for {store}: {reason}")]
    InvalidRecord {
        /// Store type descriptor
        store: &'static str,
        /// Record id
        id: u64,
        /// Why the record does not fit
        reason: String,
    },

    /// Label id already present on the node
    #[error("Label {0} is already present")]
    DuplicateLabel(u64),

    /// Label id not present on the node
    #[error("Label {0} not found")]
    LabelNotFound(u64),

    /// Property key given twice for one owner
    #[error("Property key {0} is given more than once")]
    DuplicateProperty(u32),

    /// Property key not present in the owner's chain
    #[error("Property key {0} not found")]
    PropertyNotFound(u32),

    /// The id sequence cannot hand out another id
    #[error("Id space exhausted for {store}: max id is {max_id}")]
    IdExhausted {
        /// Store type descriptor
        store: &'static str,
        /// Highest id the format can address
        max_id: u64,
    },

    /// `next` called on an exhausted store id iterator
    #[error("Store id iterator exhausted")]
    IterationExhausted,

    /// Store file written by another store version
    #[error("Version mismatch for {store}: expected {expected}, found {found}")]
    VersionMismatch {
        /// Store type descriptor
        store: &'static str,
        /// Version this build writes
        expected: String,
        /// Version found in the file
        found: String,
    },

    /// Token name already registered
    #[error("{kind} token '{name}' already exists")]
    TokenExists {
        /// Token kind
        kind: &'static str,
        /// Token name
        name: String,
    },

    /// Invalid store configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation on a closed store
    #[error("Store {0} is closed")]
    StoreClosed(&'static str),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a page cache error
    pub fn page_cache(msg: impl Into<String>) -> Self {
        Self::PageCache(msg.into())
    }

    /// Create a corrupt record error
    pub fn corrupt(store: &'static str, id: u64, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            store,
            id,
            reason: reason.into(),
        }
    }

    /// Create an invalid record error
    pub fn invalid_record(store: &'static str, id: u64, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            store,
            id,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the error only says the record was freed
    pub fn is_not_in_use(&self) -> bool {
        matches!(self, Self::NotInUse { .. })
    }

    /// True when the error reports corrupt store content
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_in_use_is_distinct_from_corrupt() {
        let freed = Error::NotInUse {
            store: "NodeStore",
            id: 7,
        };
        let broken = Error::corrupt("NodeStore", 7, "unknown flag bits");

        assert!(freed.is_not_in_use());
        assert!(!freed.is_corrupt());
        assert!(broken.is_corrupt());
        assert!(!broken.is_not_in_use());
    }

    #[test]
    fn test_messages() {
        let err = Error::IdExhausted {
            store: "LabelTokenStore",
            max_id: 10,
        };
        assert_eq!(
            err.to_string(),
            "Id space exhausted for LabelTokenStore: max id is 10"
        );
        assert_eq!(
            Error::DuplicateLabel(4).to_string(),
            "Label 4 is already present"
        );
    }
}
