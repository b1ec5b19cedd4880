//! Store file header
//!
//! Every store file starts with a fixed 64-byte header:
//!
//! ```text
//! [type descriptor: 32, NUL padded][version: 16, NUL padded]
//! [record size: u32 LE][crc32 of the preceding 52 bytes: u32 LE][zero: 8]
//! ```
//!
//! Records follow the header. A file with an all-zero header is new.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes reserved for the header at the start of every store file
pub const STORE_HEADER_SIZE: usize = 64;

/// Version string written by this build
pub const CURRENT_STORE_VERSION: &str = "RS-1.0";

const DESCRIPTOR_LEN: usize = 32;
const VERSION_LEN: usize = 16;
const RECORD_SIZE_AT: usize = DESCRIPTOR_LEN + VERSION_LEN;
const CRC_AT: usize = RECORD_SIZE_AT + 4;

/// Policy applied when a store file carries another version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionMismatchHandler {
    /// Refuse to open stores of any other version
    #[default]
    ForceCurrentVersion,
    /// Accept older stores; migration mode only
    AllowOldVersion,
}

impl VersionMismatchHandler {
    /// Decide whether a store of version `found` may be opened
    pub fn handle(&self, store: &'static str, expected: &str, found: &str) -> Result<()> {
        match self {
            VersionMismatchHandler::ForceCurrentVersion => Err(Error::VersionMismatch {
                store,
                expected: expected.to_string(),
                found: found.to_string(),
            }),
            VersionMismatchHandler::AllowOldVersion => {
                tracing::warn!(
                    store,
                    expected,
                    found,
                    "accepting store of another version for migration"
                );
                Ok(())
            }
        }
    }
}

/// Decoded store header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    /// Store type descriptor
    pub type_descriptor: String,
    /// Store version
    pub version: String,
    /// Record (block) size the file was created with
    pub record_size: u32,
}

fn put_padded(dst: &mut [u8], value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > dst.len() {
        return Err(Error::storage(format!(
            "'{}' does not fit in {} header bytes",
            value,
            dst.len()
        )));
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn get_padded(src: &[u8]) -> Result<String> {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8(src[..end].to_vec())
        .map_err(|_| Error::storage("store header holds invalid UTF-8"))
}

impl StoreHeader {
    /// Header for a store created by this build
    pub fn current(type_descriptor: &str, record_size: usize) -> Self {
        Self {
            type_descriptor: type_descriptor.to_string(),
            version: CURRENT_STORE_VERSION.to_string(),
            record_size: record_size as u32,
        }
    }

    /// Encode into the fixed header layout
    pub fn encode(&self) -> Result<[u8; STORE_HEADER_SIZE]> {
        let mut bytes = [0u8; STORE_HEADER_SIZE];
        put_padded(&mut bytes[..DESCRIPTOR_LEN], &self.type_descriptor)?;
        put_padded(&mut bytes[DESCRIPTOR_LEN..RECORD_SIZE_AT], &self.version)?;
        bytes[RECORD_SIZE_AT..CRC_AT].copy_from_slice(&self.record_size.to_le_bytes());
        let crc = crc32fast::hash(&bytes[..CRC_AT]);
        bytes[CRC_AT..CRC_AT + 4].copy_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    /// Decode a header; `None` for a fresh (all-zero) file
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < STORE_HEADER_SIZE {
            return Err(Error::storage("store header truncated"));
        }
        let bytes = &bytes[..STORE_HEADER_SIZE];
        if bytes.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[CRC_AT..CRC_AT + 4]);
        if u32::from_le_bytes(crc) != crc32fast::hash(&bytes[..CRC_AT]) {
            return Err(Error::storage("store header checksum mismatch"));
        }

        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[RECORD_SIZE_AT..CRC_AT]);

        Ok(Some(Self {
            type_descriptor: get_padded(&bytes[..DESCRIPTOR_LEN])?,
            version: get_padded(&bytes[DESCRIPTOR_LEN..RECORD_SIZE_AT])?,
            record_size: u32::from_le_bytes(size),
        }))
    }

    /// Read the header of an existing file without opening it as a store
    pub fn peek<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let mut bytes = Vec::with_capacity(STORE_HEADER_SIZE);
        File::open(path)?
            .take(STORE_HEADER_SIZE as u64)
            .read_to_end(&mut bytes)?;
        bytes.resize(STORE_HEADER_SIZE, 0);
        Self::decode(&bytes)
    }

    /// Check a header found on disk against the store being opened
    pub fn verify(
        &self,
        type_descriptor: &'static str,
        record_size: usize,
        handler: VersionMismatchHandler,
    ) -> Result<()> {
        if self.type_descriptor != type_descriptor {
            return Err(Error::storage(format!(
                "expected a {} file, found {}",
                type_descriptor, self.type_descriptor
            )));
        }
        if self.record_size as usize != record_size {
            return Err(Error::storage(format!(
                "{} was created with record size {}, opened with {}",
                type_descriptor, self.record_size, record_size
            )));
        }
        if self.version != CURRENT_STORE_VERSION {
            handler.handle(type_descriptor, CURRENT_STORE_VERSION, &self.version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let header = StoreHeader::current("NodeStore", 32);
        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[..9], b"NodeStore");
        assert_eq!(StoreHeader::decode(&bytes).unwrap(), Some(header));
    }

    #[test]
    fn test_zero_header_is_fresh() {
        assert_eq!(StoreHeader::decode(&[0u8; STORE_HEADER_SIZE]).unwrap(), None);
    }

    #[test]
    fn test_checksum_detects_damage() {
        let mut bytes = StoreHeader::current("NodeStore", 32).encode().unwrap();
        bytes[3] ^= 0xFF;
        assert!(StoreHeader::decode(&bytes).is_err());
    }

    #[test]
    fn test_descriptor_too_long() {
        let header = StoreHeader::current(&"x".repeat(40), 32);
        assert!(header.encode().is_err());
    }

    #[test]
    fn test_verify_descriptor_and_size() {
        let header = StoreHeader::current("NodeStore", 32);
        let force = VersionMismatchHandler::ForceCurrentVersion;
        header.verify("NodeStore", 32, force).unwrap();
        assert!(header.verify("RelationshipStore", 32, force).is_err());
        assert!(header.verify("NodeStore", 64, force).is_err());
    }

    #[test]
    fn test_version_policies() {
        let mut header = StoreHeader::current("NodeStore", 32);
        header.version = "RS-0.9".to_string();

        let err = header
            .verify("NodeStore", 32, VersionMismatchHandler::ForceCurrentVersion)
            .unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { ref found, .. } if found == "RS-0.9"));

        header
            .verify("NodeStore", 32, VersionMismatchHandler::AllowOldVersion)
            .unwrap();
    }

    #[test]
    fn test_peek_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(StoreHeader::peek(dir.path().join("none.store")).unwrap(), None);
    }

    #[test]
    fn test_handler_serde_names() {
        let json = serde_json::to_string(&VersionMismatchHandler::AllowOldVersion).unwrap();
        assert_eq!(json, "\"allow_old_version\"");
    }
}
