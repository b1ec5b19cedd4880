//! Store configuration
//!
//! Page geometry, cache sizing and dynamic block sizes for every store of a
//! database directory, plus the version-mismatch policy used when a store
//! file is opened.

use crate::storage::format::DYNAMIC_HEADER_SIZE;
use crate::storage::header::VersionMismatchHandler;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default page size in bytes (8KB)
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Configuration shared by all stores of one database directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size of the page cache
    pub page_size: usize,
    /// Maximum number of cached pages per store file
    pub page_cache_pages: usize,
    /// Block size (header included) of the string property store
    pub string_block_size: usize,
    /// Block size (header included) of the array property store
    pub array_block_size: usize,
    /// Block size (header included) of the node label array store
    pub label_block_size: usize,
    /// Block size (header included) of the token name stores
    pub token_name_block_size: usize,
    /// Enables migration-only behaviour such as accepting old store versions
    pub migration_mode: bool,
    /// What to do when a store file carries another version
    pub version_mismatch: VersionMismatchHandler,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_cache_pages: 1024,
            string_block_size: 128,
            array_block_size: 128,
            label_block_size: 64,
            token_name_block_size: 32,
            migration_mode: false,
            version_mismatch: VersionMismatchHandler::ForceCurrentVersion,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Small pages and a tiny cache, handy for exercising eviction in tests
    pub fn small() -> Self {
        Self {
            page_size: 512,
            page_cache_pages: 8,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the configuration once, at store-open time
    pub fn validate(&self) -> Result<()> {
        if self.page_cache_pages == 0 {
            return Err(Error::invalid_config("page_cache_pages must be > 0"));
        }

        let blocks = [
            ("string_block_size", self.string_block_size),
            ("array_block_size", self.array_block_size),
            ("label_block_size", self.label_block_size),
            ("token_name_block_size", self.token_name_block_size),
        ];
        for (name, size) in blocks {
            if size <= DYNAMIC_HEADER_SIZE {
                return Err(Error::invalid_config(format!(
                    "{} must exceed the dynamic record header ({} bytes), got {}",
                    name, DYNAMIC_HEADER_SIZE, size
                )));
            }
            if size > self.page_size {
                return Err(Error::invalid_config(format!(
                    "{} ({}) does not fit in a page of {} bytes",
                    name, size, self.page_size
                )));
            }
        }

        let largest_fixed = crate::storage::format::PROPERTY_RECORD_SIZE;
        if self.page_size < largest_fixed {
            return Err(Error::invalid_config(format!(
                "page_size {} is smaller than a property record ({} bytes)",
                self.page_size, largest_fixed
            )));
        }

        self.check_version_policy()
    }

    /// Reject `allow_old_version` outside migration mode
    ///
    /// Every store open runs this, whether or not the full configuration
    /// was validated.
    pub fn check_version_policy(&self) -> Result<()> {
        if self.version_mismatch == VersionMismatchHandler::AllowOldVersion && !self.migration_mode
        {
            return Err(Error::invalid_config(
                "allow_old_version is only available with migration_mode enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        StoreConfig::default().validate().unwrap();
        StoreConfig::small().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StoreConfig::from_json_str(r#"{ "page_size": 4096 }"#).unwrap();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.string_block_size, 128);
        assert_eq!(
            config.version_mismatch,
            VersionMismatchHandler::ForceCurrentVersion
        );
    }

    #[test]
    fn test_block_size_must_exceed_header() {
        let config = StoreConfig {
            label_block_size: DYNAMIC_HEADER_SIZE,
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_allow_old_version_requires_migration_mode() {
        let json = r#"{ "version_mismatch": "allow_old_version" }"#;
        assert!(StoreConfig::from_json_str(json).is_err());

        let json = r#"{ "version_mismatch": "allow_old_version", "migration_mode": true }"#;
        let config = StoreConfig::from_json_str(json).unwrap();
        assert!(config.migration_mode);
    }

    #[test]
    fn test_zero_cache_rejected() {
        let config = StoreConfig {
            page_cache_pages: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{ "page_cache_pages": 16 }"#).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.page_cache_pages, 16);
    }
}
