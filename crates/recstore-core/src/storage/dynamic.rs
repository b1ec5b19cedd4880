//! Dynamic record chains
//!
//! Values that do not fit a fixed record (strings, arrays, overflowing
//! label sets) are split into segments of `block size - header` bytes and
//! stored as a chain of [`DynamicRecord`]s linked by `next_block`. The
//! allocator strategies decide which record each segment lands in:
//!
//! - [`StandardDynamicRecordAllocator`] always takes a fresh id.
//! - [`ReusableRecordsAllocator`] consumes the records of an existing chain
//!   first and falls back to another allocator when the chain must grow.
//!
//! Allocators never touch the page cache. Callers fill the returned
//! records and write them through the store.

use crate::config::StoreConfig;
use crate::storage::format::{DynamicFormat, RecordFormat};
use crate::storage::header::StoreHeader;
use crate::storage::id_generator::IdGenerator;
use crate::storage::record::{DynamicRecord, NULL_REFERENCE, Record};
use crate::storage::record_store::{CommonStore, RecordStore};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Store of dynamic records
pub type DynamicStore = CommonStore<DynamicFormat>;

/// Source of records for the segments of a chain
pub trait DynamicRecordAllocator {
    /// Payload bytes one record can hold
    fn record_data_size(&self) -> usize;

    /// Next record to fill, already flagged in use
    fn next_record(&mut self) -> Result<DynamicRecord>;
}

/// Allocator that always takes a fresh id from the id sequence
pub struct StandardDynamicRecordAllocator {
    ids: Arc<dyn IdGenerator>,
    data_size: usize,
}

impl StandardDynamicRecordAllocator {
    /// Allocate from `ids`, `data_size` payload bytes per record
    pub fn new(ids: Arc<dyn IdGenerator>, data_size: usize) -> Self {
        Self { ids, data_size }
    }
}

impl DynamicRecordAllocator for StandardDynamicRecordAllocator {
    fn record_data_size(&self) -> usize {
        self.data_size
    }

    fn next_record(&mut self) -> Result<DynamicRecord> {
        let mut record = DynamicRecord::new(self.ids.next_id()?);
        record.set_in_use(true);
        record.set_created();
        Ok(record)
    }
}

/// Allocator that reuses the records of an existing chain before asking
/// its fallback for more
pub struct ReusableRecordsAllocator<A> {
    records: std::vec::IntoIter<DynamicRecord>,
    fallback: A,
}

impl<A: DynamicRecordAllocator> ReusableRecordsAllocator<A> {
    /// Reuse `records` in order, then allocate from `fallback`
    pub fn new(records: impl IntoIterator<Item = DynamicRecord>, fallback: A) -> Self {
        Self {
            records: records.into_iter().collect::<Vec<_>>().into_iter(),
            fallback,
        }
    }

    /// Whether unconsumed records remain
    pub fn has_remaining(&self) -> bool {
        self.records.len() > 0
    }

    /// Records the chain no longer needs, flagged not in use
    pub fn into_unused(self) -> Vec<DynamicRecord> {
        self.records
            .map(|mut record| {
                record.set_in_use(false);
                record.data.clear();
                record.next_block = NULL_REFERENCE;
                record
            })
            .collect()
    }
}

impl<A: DynamicRecordAllocator> DynamicRecordAllocator for ReusableRecordsAllocator<A> {
    fn record_data_size(&self) -> usize {
        self.fallback.record_data_size()
    }

    fn next_record(&mut self) -> Result<DynamicRecord> {
        match self.records.next() {
            Some(mut record) => {
                if !record.in_use() {
                    record.set_created();
                }
                record.set_in_use(true);
                Ok(record)
            }
            None => self.fallback.next_record(),
        }
    }
}

/// Split `payload` over records handed out by `allocator`
///
/// Always yields at least one record; only the first carries the start
/// flag and the last ends the chain.
pub fn allocate_record_chain<A: DynamicRecordAllocator>(
    payload: &[u8],
    allocator: &mut A,
) -> Result<Vec<DynamicRecord>> {
    let data_size = allocator.record_data_size();
    if data_size == 0 {
        return Err(Error::internal("dynamic records without payload capacity"));
    }

    let segments = payload.len().div_ceil(data_size).max(1);
    let mut records: Vec<DynamicRecord> = Vec::with_capacity(segments);

    for segment in 0..segments {
        let start = segment * data_size;
        let end = (start + data_size).min(payload.len());

        let mut record = allocator.next_record()?;
        record.start_record = segment == 0;
        record.next_block = NULL_REFERENCE;
        record.data = payload[start..end].to_vec();

        if let Some(previous) = records.last_mut() {
            previous.next_block = record.id;
        }
        records.push(record);
    }

    Ok(records)
}

/// Encode `u64` values as little-endian bytes
pub fn encode_long_array(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `u64` values; `None` if the length is ragged
pub fn decode_long_array(bytes: &[u8]) -> Option<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect(),
    )
}

impl CommonStore<DynamicFormat> {
    /// Open a dynamic store
    ///
    /// The block size of an existing file wins over the one in `format`:
    /// it is fixed when the store is created.
    pub fn open_dynamic<P: AsRef<Path>>(
        path: P,
        format: DynamicFormat,
        config: &StoreConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let format = match StoreHeader::peek(path)? {
            Some(header)
                if header.type_descriptor == format.type_descriptor()
                    && header.record_size as usize != format.block_size() =>
            {
                tracing::info!(
                    store = format.type_descriptor(),
                    configured = format.block_size(),
                    block_size = header.record_size,
                    "using block size of existing store"
                );
                format.with_block_size(header.record_size as usize)?
            }
            _ => format,
        };
        Self::open(path, format, config)
    }

    /// Total bytes per record, header included
    pub fn block_size(&self) -> usize {
        self.format().block_size()
    }

    /// Payload bytes per record
    pub fn data_size(&self) -> usize {
        self.format().data_size()
    }

    /// Allocator handing out fresh ids of this store
    pub fn allocator(&self) -> StandardDynamicRecordAllocator {
        StandardDynamicRecordAllocator::new(self.id_generator(), self.data_size())
    }

    /// Write records of a chain, tail first so a visible head never points
    /// at an unwritten segment
    pub fn write_records(&self, records: &[DynamicRecord]) -> Result<()> {
        for record in records.iter().rev() {
            self.update_record(record)?;
        }
        Ok(())
    }

    /// Store `payload` in a new chain and return its head id
    pub fn write_chain(&self, payload: &[u8]) -> Result<u64> {
        let records = allocate_record_chain(payload, &mut self.allocator())?;
        self.write_records(&records)?;
        Ok(records[0].id)
    }

    /// Replace the payload of the chain at `head`, reusing its records
    ///
    /// Returns the head id, which stays the same. Records the new payload
    /// does not need are freed.
    pub fn rewrite_chain(&self, head: u64, payload: &[u8]) -> Result<u64> {
        let existing = self.get_records(head)?;
        let mut allocator = ReusableRecordsAllocator::new(existing, self.allocator());
        let records = allocate_record_chain(payload, &mut allocator)?;
        let unused = allocator.into_unused();

        self.write_records(&records)?;
        for record in &unused {
            self.update_record(record)?;
        }
        Ok(records[0].id)
    }

    /// Concatenated payload of the chain at `head`
    pub fn read_chain(&self, head: u64) -> Result<Vec<u8>> {
        let records = self.get_records(head)?;
        if !records[0].start_record {
            return Err(Error::corrupt(
                self.type_descriptor(),
                head,
                "chain head is not a start record",
            ));
        }
        let mut payload = Vec::with_capacity(records.iter().map(|r| r.length()).sum());
        for record in &records {
            payload.extend_from_slice(&record.data);
        }
        Ok(payload)
    }

    /// Mark every record of the chain at `head` not in use
    pub fn free_chain(&self, head: u64) -> Result<()> {
        for mut record in self.get_records(head)? {
            record.set_in_use(false);
            self.update_record(&record)?;
        }
        Ok(())
    }

    /// Store a UTF-8 string
    pub fn write_string(&self, value: &str) -> Result<u64> {
        self.write_chain(value.as_bytes())
    }

    /// Read a string stored by [`write_string`](Self::write_string)
    pub fn read_string(&self, head: u64) -> Result<String> {
        String::from_utf8(self.read_chain(head)?).map_err(|_| {
            Error::corrupt(self.type_descriptor(), head, "string chain is not UTF-8")
        })
    }

    /// Store an array of `u64` values
    pub fn write_long_array(&self, values: &[u64]) -> Result<u64> {
        self.write_chain(&encode_long_array(values))
    }

    /// Read an array stored by [`write_long_array`](Self::write_long_array)
    pub fn read_long_array(&self, head: u64) -> Result<Vec<u64>> {
        let bytes = self.read_chain(head)?;
        decode_long_array(&bytes).ok_or_else(|| {
            Error::corrupt(
                self.type_descriptor(),
                head,
                format!("array chain of {} bytes is not a whole number of longs", bytes.len()),
            )
        })
    }
}
