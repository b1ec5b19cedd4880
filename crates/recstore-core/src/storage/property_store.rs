//! Property store
//!
//! The properties of a node or relationship form a doubly linked chain of
//! property records starting at the owner's `next_prop`. A record holds up
//! to [`PROPERTY_BLOCKS`] blocks. Booleans, integers, floats and strings of
//! up to [`SHORT_STRING_CAPACITY`] bytes live inline in the block payload.
//! Longer strings and arrays are written to the string and array stores and
//! the block keeps the head of their chain.

use crate::config::StoreConfig;
use crate::storage::dynamic::DynamicStore;
use crate::storage::format::{
    DynamicFormat, DynamicKind, PROPERTY_BLOCKS, PropertyFormat, TokenKind,
};
use crate::storage::record::{
    NULL_REFERENCE, PropertyBlock, PropertyRecord, PropertyType, SHORT_STRING_CAPACITY,
};
use crate::storage::record_store::{CommonStore, RecordStore};
use crate::storage::visitor::RecordVisitor;
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Type descriptor of the string property store
pub const STRING_STORE_DESCRIPTOR: &str = "StringPropertyStore";
/// Type descriptor of the array property store
pub const ARRAY_STORE_DESCRIPTOR: &str = "ArrayPropertyStore";

/// Decoded property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Array of 64-bit values
    LongArray(Vec<u64>),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u64>> for PropertyValue {
    fn from(value: Vec<u64>) -> Self {
        Self::LongArray(value)
    }
}

fn encode_short_string(value: &str) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..value.len()].copy_from_slice(value.as_bytes());
    bytes[7] = value.len() as u8;
    u64::from_le_bytes(bytes)
}

fn decode_short_string(payload: u64) -> Option<String> {
    let bytes = payload.to_le_bytes();
    let len = bytes[7] as usize;
    if len > SHORT_STRING_CAPACITY {
        return None;
    }
    String::from_utf8(bytes[..len].to_vec()).ok()
}

/// Property record store with its string and array stores
pub struct PropertyStore {
    records: CommonStore<PropertyFormat>,
    strings: DynamicStore,
    arrays: DynamicStore,
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyStore")
            .field("high_id", &self.records.high_id())
            .field("strings", &self.strings.high_id())
            .field("arrays", &self.arrays.high_id())
            .finish()
    }
}

impl PropertyStore {
    /// Open the property store at `path` with its value stores
    pub fn open<P: AsRef<Path>, S: AsRef<Path>, A: AsRef<Path>>(
        path: P,
        strings_path: S,
        arrays_path: A,
        config: &StoreConfig,
    ) -> Result<Self> {
        let records = CommonStore::open(path, PropertyFormat, config)?;
        let strings = DynamicStore::open_dynamic(
            strings_path,
            DynamicFormat::new(
                DynamicKind::String,
                STRING_STORE_DESCRIPTOR,
                config.string_block_size,
            )?,
            config,
        )?;
        let arrays = DynamicStore::open_dynamic(
            arrays_path,
            DynamicFormat::new(
                DynamicKind::Array,
                ARRAY_STORE_DESCRIPTOR,
                config.array_block_size,
            )?,
            config,
        )?;

        Ok(Self {
            records,
            strings,
            arrays,
        })
    }

    /// Store of long string values
    pub fn string_store(&self) -> &DynamicStore {
        &self.strings
    }

    /// Store of array values
    pub fn array_store(&self) -> &DynamicStore {
        &self.arrays
    }

    fn check_key(&self, key: u32) -> Result<()> {
        let max = TokenKind::PropertyKey.max_id();
        if u64::from(key) > max {
            return Err(Error::storage(format!(
                "property key {} beyond max property key id {}",
                key, max
            )));
        }
        Ok(())
    }

    /// Block holding `value` under `key`
    ///
    /// Values that do not fit the payload are written to their dynamic
    /// store first.
    pub fn encode_value(&self, key: u32, value: &PropertyValue) -> Result<PropertyBlock> {
        self.check_key(key)?;
        let (kind, payload) = match value {
            PropertyValue::Bool(v) => (PropertyType::Bool, u64::from(*v)),
            PropertyValue::Int(v) => (PropertyType::Int, *v as u64),
            PropertyValue::Float(v) => (PropertyType::Float, v.to_bits()),
            PropertyValue::String(v) if v.len() <= SHORT_STRING_CAPACITY => {
                (PropertyType::ShortString, encode_short_string(v))
            }
            PropertyValue::String(v) => (PropertyType::String, self.strings.write_string(v)?),
            PropertyValue::LongArray(v) => {
                (PropertyType::Array, self.arrays.write_long_array(v)?)
            }
        };
        Ok(PropertyBlock { key, kind, payload })
    }

    /// Value of `block`, read from property record `record_id`
    pub fn value(&self, record_id: u64, block: &PropertyBlock) -> Result<PropertyValue> {
        Ok(match block.kind {
            PropertyType::Bool => PropertyValue::Bool(block.payload != 0),
            PropertyType::Int => PropertyValue::Int(block.payload as i64),
            PropertyType::Float => PropertyValue::Float(f64::from_bits(block.payload)),
            PropertyType::ShortString => {
                PropertyValue::String(decode_short_string(block.payload).ok_or_else(|| {
                    Error::corrupt(
                        PropertyFormat::DESCRIPTOR,
                        record_id,
                        format!("malformed short string for key {}", block.key),
                    )
                })?)
            }
            PropertyType::String => PropertyValue::String(self.strings.read_string(block.payload)?),
            PropertyType::Array => {
                PropertyValue::LongArray(self.arrays.read_long_array(block.payload)?)
            }
        })
    }

    fn free_value(&self, block: &PropertyBlock) -> Result<()> {
        match block.kind {
            PropertyType::String => self.strings.free_chain(block.payload),
            PropertyType::Array => self.arrays.free_chain(block.payload),
            _ => Ok(()),
        }
    }

    fn chain(&self, head: u64) -> Result<Vec<PropertyRecord>> {
        if head == NULL_REFERENCE {
            return Ok(Vec::new());
        }
        self.records.get_records(head)
    }

    /// Write `properties` as a new chain and return its head
    ///
    /// An empty list yields [`NULL_REFERENCE`]. Keys must be unique.
    pub fn create_chain(&self, properties: &[(u32, PropertyValue)]) -> Result<u64> {
        let mut keys = HashSet::with_capacity(properties.len());
        for (key, _) in properties {
            self.check_key(*key)?;
            if !keys.insert(*key) {
                return Err(Error::DuplicateProperty(*key));
            }
        }
        if properties.is_empty() {
            return Ok(NULL_REFERENCE);
        }

        let blocks = properties
            .iter()
            .map(|(key, value)| self.encode_value(*key, value))
            .collect::<Result<Vec<_>>>()?;

        let mut records: Vec<PropertyRecord> = Vec::new();
        for chunk in blocks.chunks(PROPERTY_BLOCKS) {
            let mut record = PropertyRecord::new(self.records.next_id()?);
            record.in_use = true;
            record.created = true;
            record.blocks = chunk.to_vec();
            if let Some(previous) = records.last_mut() {
                previous.next_prop = record.id;
                record.prev_prop = previous.id;
            }
            records.push(record);
        }

        // Tail first so the head never points at an unwritten record
        for record in records.iter().rev() {
            self.records.update_record(record)?;
        }
        Ok(records[0].id)
    }

    /// Every property of the chain at `head`, in chain order
    pub fn properties(&self, head: u64) -> Result<Vec<(u32, PropertyValue)>> {
        let mut properties = Vec::new();
        for record in self.chain(head)? {
            for block in &record.blocks {
                properties.push((block.key, self.value(record.id, block)?));
            }
        }
        Ok(properties)
    }

    /// Value of `key` in the chain at `head`
    pub fn property(&self, head: u64, key: u32) -> Result<Option<PropertyValue>> {
        for record in self.chain(head)? {
            if let Some(block) = record.block(key) {
                return self.value(record.id, block).map(Some);
            }
        }
        Ok(None)
    }

    /// Set `key` in the chain at `head` and return the chain's head
    ///
    /// An existing value is replaced in place and its dynamic chain freed.
    /// A new key takes the first free block, or a new record linked in
    /// front of the chain, which then becomes the head.
    pub fn set_property(&self, head: u64, key: u32, value: &PropertyValue) -> Result<u64> {
        let mut chain = self.chain(head)?;
        let block = self.encode_value(key, value)?;

        for record in &mut chain {
            if let Some(position) = record.blocks.iter().position(|b| b.key == key) {
                let old = std::mem::replace(&mut record.blocks[position], block);
                self.records.update_record(record)?;
                self.free_value(&old)?;
                return Ok(head);
            }
        }

        if let Some(record) = chain.iter_mut().find(|r| r.blocks.len() < PROPERTY_BLOCKS) {
            record.blocks.push(block);
            self.records.update_record(record)?;
            return Ok(head);
        }

        let mut record = PropertyRecord::new(self.records.next_id()?);
        record.in_use = true;
        record.created = true;
        record.next_prop = head;
        record.blocks.push(block);
        self.records.update_record(&record)?;

        if let Some(old_head) = chain.first_mut() {
            old_head.prev_prop = record.id;
            self.records.update_record(old_head)?;
        }
        Ok(record.id)
    }

    /// Remove `key` from the chain at `head` and return the chain's head
    ///
    /// A record left without blocks is unlinked and freed; removing the
    /// last property yields [`NULL_REFERENCE`].
    pub fn remove_property(&self, head: u64, key: u32) -> Result<u64> {
        let chain = self.chain(head)?;
        let found = chain.iter().enumerate().find_map(|(index, record)| {
            record
                .blocks
                .iter()
                .position(|b| b.key == key)
                .map(|position| (index, position))
        });
        let Some((index, position)) = found else {
            return Err(Error::PropertyNotFound(key));
        };

        let mut record = chain[index].clone();
        let removed = record.blocks.remove(position);
        if record.blocks.is_empty() {
            if index > 0 {
                let mut previous = chain[index - 1].clone();
                previous.next_prop = record.next_prop;
                self.records.update_record(&previous)?;
            }
            if let Some(next) = chain.get(index + 1) {
                let mut next = next.clone();
                next.prev_prop = record.prev_prop;
                self.records.update_record(&next)?;
            }
            record.in_use = false;
        }
        self.records.update_record(&record)?;
        self.free_value(&removed)?;

        if index == 0 && !record.in_use {
            Ok(record.next_prop)
        } else {
            Ok(head)
        }
    }

    /// Free the chain at `head` and every value chain it references
    pub fn delete_chain(&self, head: u64) -> Result<()> {
        for mut record in self.chain(head)? {
            for block in &record.blocks {
                self.free_value(block)?;
            }
            record.in_use = false;
            self.records.update_record(&record)?;
        }
        Ok(())
    }
}

impl RecordStore for PropertyStore {
    type Record = PropertyRecord;

    fn type_descriptor(&self) -> &'static str {
        self.records.type_descriptor()
    }

    fn new_record(&self, id: u64) -> PropertyRecord {
        self.records.new_record(id)
    }

    fn get_record(&self, id: u64) -> Result<PropertyRecord> {
        self.records.get_record(id)
    }

    fn get_records(&self, id: u64) -> Result<Vec<PropertyRecord>> {
        self.records.get_records(id)
    }

    fn update_record(&self, record: &PropertyRecord) -> Result<()> {
        self.records.update_record(record)
    }

    fn force_get_record(&self, id: u64) -> Result<PropertyRecord> {
        self.records.force_get_record(id)
    }

    fn force_update_record(&self, record: &PropertyRecord) -> Result<()> {
        self.records.force_update_record(record)
    }

    fn is_in_use(&self, id: u64) -> Result<bool> {
        self.records.is_in_use(id)
    }

    fn next_id(&self) -> Result<u64> {
        self.records.next_id()
    }

    fn high_id(&self) -> u64 {
        self.records.high_id()
    }

    fn set_high_id(&self, high_id: u64) {
        self.records.set_high_id(high_id)
    }

    fn highest_possible_id_in_use(&self) -> Option<u64> {
        self.records.highest_possible_id_in_use()
    }

    fn number_of_reserved_low_ids(&self) -> u64 {
        self.records.number_of_reserved_low_ids()
    }

    fn record_size(&self) -> usize {
        self.records.record_size()
    }

    fn records_per_page(&self) -> usize {
        self.records.records_per_page()
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &PropertyRecord,
    ) -> std::result::Result<(), V::Error> {
        self.records.accept(visitor, record)
    }

    fn flush(&self) -> Result<()> {
        self.strings.flush()?;
        self.arrays.flush()?;
        self.records.flush()
    }

    fn close(&self) -> Result<()> {
        self.strings.close()?;
        self.arrays.close()?;
        self.records.close()
    }
}
