//! Record formats - byte layout of every store
//!
//! Fixed-size layouts (little endian on every supported target):
//!
//! - Node (32 bytes): next_rel: 8, next_prop: 8, label_field: 8, flags: 4, padding: 4
//! - Relationship (64 bytes): first_node, second_node, first_prev, first_next,
//!   second_prev, second_next, next_prop: 8 each, type_id: 4, flags: 4
//! - Token (16 bytes): name_id: 8, flags: 4, padding: 4
//! - Property (88 bytes): prev_prop: 8, next_prop: 8, 4 blocks of
//!   (payload: 8, key: 4, type: 4), flags: 4, block count: 4
//! - Dynamic (block size): flags: 1, next_block: 8, length: 4, payload
//!
//! A format decodes and encodes single records and knows which visitor
//! branch its records belong to; paging and allocation live in the store.

use crate::storage::record::{
    DynamicRecord, NULL_REFERENCE, NodeRecord, PropertyBlock, PropertyRecord, PropertyType,
    Record, RelationshipRecord, TokenRecord,
};
use crate::storage::visitor::RecordVisitor;
use crate::{Error, Result};
use bytemuck::{Pod, Zeroable};

/// Node record size in bytes
pub const NODE_RECORD_SIZE: usize = 32;
/// Relationship record size in bytes
pub const RELATIONSHIP_RECORD_SIZE: usize = 64;
/// Token record size in bytes
pub const TOKEN_RECORD_SIZE: usize = 16;
/// Property record size in bytes
pub const PROPERTY_RECORD_SIZE: usize = 88;
/// Property blocks one property record holds
pub const PROPERTY_BLOCKS: usize = 4;
/// Header bytes of a dynamic record: flags, next block, payload length
pub const DYNAMIC_HEADER_SIZE: usize = 13;

/// Label field width of a node record
pub const LABEL_FIELD_BITS: u32 = 40;

const IN_USE: u32 = 0x01;
const NODE_DENSE: u32 = 0x02;
const REL_FIRST_IN_FIRST_CHAIN: u32 = 0x02;
const REL_FIRST_IN_SECOND_CHAIN: u32 = 0x04;
const TOKEN_INTERNAL: u32 = 0x02;
const DYNAMIC_IN_USE: u8 = 0x01;
const DYNAMIC_START: u8 = 0x02;

/// How strictly a record is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLoad {
    /// Fail on not-in-use or corrupt records
    Normal,
    /// Decode whatever is there; consistency tooling and recovery only
    Force,
}

/// Encode/decode strategy for one store's records
pub trait RecordFormat: Send + Sync + 'static {
    /// Decoded record type
    type Record: Record;

    /// Type descriptor written to the store header
    fn type_descriptor(&self) -> &'static str;

    /// Bytes per record
    fn record_size(&self) -> usize;

    /// Low ids the store never hands out
    fn reserved_low_ids(&self) -> u64 {
        0
    }

    /// Highest addressable record id
    fn max_id(&self) -> u64;

    /// Empty record for `id`
    fn new_record(&self, id: u64) -> Self::Record;

    /// Whether the bytes hold an in-use record, without decoding the rest
    fn is_in_use(&self, bytes: &[u8]) -> bool;

    /// Decode the record stored at `id`
    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<Self::Record>;

    /// Encode `record` into exactly `record_size` bytes
    fn write(&self, record: &Self::Record, bytes: &mut [u8]) -> Result<()>;

    /// Following record id for chained formats
    fn next_in_chain(&self, _record: &Self::Record) -> Option<u64> {
        None
    }

    /// Hand the record to this format's visitor branch
    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &Self::Record,
    ) -> std::result::Result<(), V::Error>;
}

fn check_flags(store: &'static str, id: u64, flags: u32, known: u32, mode: RecordLoad) -> Result<()> {
    if mode == RecordLoad::Normal && flags & !known != 0 {
        return Err(Error::corrupt(
            store,
            id,
            format!("unknown flag bits {:#x}", flags & !known),
        ));
    }
    Ok(())
}

/// On-disk node slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct NodeSlot {
    next_rel: u64,
    next_prop: u64,
    label_field: u64,
    flags: u32,
    _padding: u32,
}

/// Node store format
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFormat;

impl NodeFormat {
    /// Type descriptor of node stores
    pub const DESCRIPTOR: &'static str = "NodeStore";
    /// Highest node id (35 bits)
    pub const MAX_ID: u64 = (1 << 35) - 1;
}

impl RecordFormat for NodeFormat {
    type Record = NodeRecord;

    fn type_descriptor(&self) -> &'static str {
        Self::DESCRIPTOR
    }

    fn record_size(&self) -> usize {
        NODE_RECORD_SIZE
    }

    fn max_id(&self) -> u64 {
        Self::MAX_ID
    }

    fn new_record(&self, id: u64) -> NodeRecord {
        NodeRecord::new(id)
    }

    fn is_in_use(&self, bytes: &[u8]) -> bool {
        let slot: NodeSlot = bytemuck::pod_read_unaligned(&bytes[..NODE_RECORD_SIZE]);
        slot.flags & IN_USE != 0
    }

    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<NodeRecord> {
        let slot: NodeSlot = bytemuck::pod_read_unaligned(&bytes[..NODE_RECORD_SIZE]);
        check_flags(Self::DESCRIPTOR, id, slot.flags, IN_USE | NODE_DENSE, mode)?;

        let label_mask = (1u64 << LABEL_FIELD_BITS) - 1;
        if mode == RecordLoad::Normal && slot.label_field & !label_mask != 0 {
            return Err(Error::corrupt(
                Self::DESCRIPTOR,
                id,
                format!("label field {:#x} exceeds 40 bits", slot.label_field),
            ));
        }

        Ok(NodeRecord {
            id,
            in_use: slot.flags & IN_USE != 0,
            created: false,
            dense: slot.flags & NODE_DENSE != 0,
            next_rel: slot.next_rel,
            next_prop: slot.next_prop,
            label_field: slot.label_field & label_mask,
        })
    }

    fn write(&self, record: &NodeRecord, bytes: &mut [u8]) -> Result<()> {
        if record.label_field >> LABEL_FIELD_BITS != 0 {
            return Err(Error::invalid_record(
                Self::DESCRIPTOR,
                record.id,
                format!("label field {:#x} exceeds 40 bits", record.label_field),
            ));
        }

        let mut flags = 0;
        if record.in_use {
            flags |= IN_USE;
        }
        if record.dense {
            flags |= NODE_DENSE;
        }
        let slot = NodeSlot {
            next_rel: record.next_rel,
            next_prop: record.next_prop,
            label_field: record.label_field,
            flags,
            _padding: 0,
        };
        bytes[..NODE_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&slot));
        Ok(())
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &NodeRecord,
    ) -> std::result::Result<(), V::Error> {
        visitor.process_node(record)
    }
}

/// On-disk relationship slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RelationshipSlot {
    first_node: u64,
    second_node: u64,
    first_prev_rel: u64,
    first_next_rel: u64,
    second_prev_rel: u64,
    second_next_rel: u64,
    next_prop: u64,
    type_id: u32,
    flags: u32,
}

/// Relationship store format
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFormat;

impl RelationshipFormat {
    /// Type descriptor of relationship stores
    pub const DESCRIPTOR: &'static str = "RelationshipStore";
    /// Highest relationship id (35 bits)
    pub const MAX_ID: u64 = (1 << 35) - 1;
}

impl RecordFormat for RelationshipFormat {
    type Record = RelationshipRecord;

    fn type_descriptor(&self) -> &'static str {
        Self::DESCRIPTOR
    }

    fn record_size(&self) -> usize {
        RELATIONSHIP_RECORD_SIZE
    }

    fn max_id(&self) -> u64 {
        Self::MAX_ID
    }

    fn new_record(&self, id: u64) -> RelationshipRecord {
        RelationshipRecord::new(id)
    }

    fn is_in_use(&self, bytes: &[u8]) -> bool {
        let slot: RelationshipSlot =
            bytemuck::pod_read_unaligned(&bytes[..RELATIONSHIP_RECORD_SIZE]);
        slot.flags & IN_USE != 0
    }

    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<RelationshipRecord> {
        let slot: RelationshipSlot =
            bytemuck::pod_read_unaligned(&bytes[..RELATIONSHIP_RECORD_SIZE]);
        check_flags(
            Self::DESCRIPTOR,
            id,
            slot.flags,
            IN_USE | REL_FIRST_IN_FIRST_CHAIN | REL_FIRST_IN_SECOND_CHAIN,
            mode,
        )?;

        let in_use = slot.flags & IN_USE != 0;
        if mode == RecordLoad::Normal
            && in_use
            && (slot.first_node == NULL_REFERENCE || slot.second_node == NULL_REFERENCE)
        {
            return Err(Error::corrupt(
                Self::DESCRIPTOR,
                id,
                "in-use relationship without both endpoints",
            ));
        }

        Ok(RelationshipRecord {
            id,
            in_use,
            created: false,
            first_node: slot.first_node,
            second_node: slot.second_node,
            type_id: slot.type_id,
            first_prev_rel: slot.first_prev_rel,
            first_next_rel: slot.first_next_rel,
            second_prev_rel: slot.second_prev_rel,
            second_next_rel: slot.second_next_rel,
            next_prop: slot.next_prop,
            first_in_first_chain: slot.flags & REL_FIRST_IN_FIRST_CHAIN != 0,
            first_in_second_chain: slot.flags & REL_FIRST_IN_SECOND_CHAIN != 0,
        })
    }

    fn write(&self, record: &RelationshipRecord, bytes: &mut [u8]) -> Result<()> {
        if record.in_use
            && (record.first_node == NULL_REFERENCE || record.second_node == NULL_REFERENCE)
        {
            return Err(Error::invalid_record(
                Self::DESCRIPTOR,
                record.id,
                "in-use relationship needs both endpoints",
            ));
        }

        let mut flags = 0;
        if record.in_use {
            flags |= IN_USE;
        }
        if record.first_in_first_chain {
            flags |= REL_FIRST_IN_FIRST_CHAIN;
        }
        if record.first_in_second_chain {
            flags |= REL_FIRST_IN_SECOND_CHAIN;
        }
        let slot = RelationshipSlot {
            first_node: record.first_node,
            second_node: record.second_node,
            first_prev_rel: record.first_prev_rel,
            first_next_rel: record.first_next_rel,
            second_prev_rel: record.second_prev_rel,
            second_next_rel: record.second_next_rel,
            next_prop: record.next_prop,
            type_id: record.type_id,
            flags,
        };
        bytes[..RELATIONSHIP_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&slot));
        Ok(())
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &RelationshipRecord,
    ) -> std::result::Result<(), V::Error> {
        visitor.process_relationship(record)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PropertyBlockSlot {
    payload: u64,
    key: u32,
    kind: u32,
}

/// On-disk property slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PropertySlot {
    prev_prop: u64,
    next_prop: u64,
    blocks: [PropertyBlockSlot; PROPERTY_BLOCKS],
    flags: u32,
    block_count: u32,
}

/// Property store format
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyFormat;

impl PropertyFormat {
    /// Type descriptor of property stores
    pub const DESCRIPTOR: &'static str = "PropertyStore";
    /// Highest property record id (36 bits)
    pub const MAX_ID: u64 = (1 << 36) - 1;
}

impl RecordFormat for PropertyFormat {
    type Record = PropertyRecord;

    fn type_descriptor(&self) -> &'static str {
        Self::DESCRIPTOR
    }

    fn record_size(&self) -> usize {
        PROPERTY_RECORD_SIZE
    }

    fn max_id(&self) -> u64 {
        Self::MAX_ID
    }

    fn new_record(&self, id: u64) -> PropertyRecord {
        PropertyRecord::new(id)
    }

    fn is_in_use(&self, bytes: &[u8]) -> bool {
        let slot: PropertySlot = bytemuck::pod_read_unaligned(&bytes[..PROPERTY_RECORD_SIZE]);
        slot.flags & IN_USE != 0
    }

    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<PropertyRecord> {
        let slot: PropertySlot = bytemuck::pod_read_unaligned(&bytes[..PROPERTY_RECORD_SIZE]);
        check_flags(Self::DESCRIPTOR, id, slot.flags, IN_USE, mode)?;

        let count = slot.block_count as usize;
        if count > PROPERTY_BLOCKS && mode == RecordLoad::Normal {
            return Err(Error::corrupt(
                Self::DESCRIPTOR,
                id,
                format!("{} property blocks in a record of {}", count, PROPERTY_BLOCKS),
            ));
        }

        let mut blocks = Vec::with_capacity(count.min(PROPERTY_BLOCKS));
        for block in &slot.blocks[..count.min(PROPERTY_BLOCKS)] {
            let kind = u8::try_from(block.kind)
                .ok()
                .and_then(PropertyType::from_byte);
            match kind {
                Some(kind) => blocks.push(PropertyBlock {
                    key: block.key,
                    kind,
                    payload: block.payload,
                }),
                None if mode == RecordLoad::Normal => {
                    return Err(Error::corrupt(
                        Self::DESCRIPTOR,
                        id,
                        format!("unknown property type {} for key {}", block.kind, block.key),
                    ));
                }
                None => {}
            }
        }

        Ok(PropertyRecord {
            id,
            in_use: slot.flags & IN_USE != 0,
            created: false,
            prev_prop: slot.prev_prop,
            next_prop: slot.next_prop,
            blocks,
        })
    }

    fn write(&self, record: &PropertyRecord, bytes: &mut [u8]) -> Result<()> {
        if record.blocks.len() > PROPERTY_BLOCKS {
            return Err(Error::invalid_record(
                Self::DESCRIPTOR,
                record.id,
                format!(
                    "{} property blocks exceed the {} a record holds",
                    record.blocks.len(),
                    PROPERTY_BLOCKS
                ),
            ));
        }

        let mut slot = PropertySlot::zeroed();
        slot.prev_prop = record.prev_prop;
        slot.next_prop = record.next_prop;
        slot.block_count = record.blocks.len() as u32;
        if record.in_use {
            slot.flags |= IN_USE;
        }
        for (target, block) in slot.blocks.iter_mut().zip(&record.blocks) {
            *target = PropertyBlockSlot {
                payload: block.payload,
                key: block.key,
                kind: block.kind as u32,
            };
        }
        bytes[..PROPERTY_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&slot));
        Ok(())
    }

    fn next_in_chain(&self, record: &PropertyRecord) -> Option<u64> {
        (record.next_prop != NULL_REFERENCE).then_some(record.next_prop)
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &PropertyRecord,
    ) -> std::result::Result<(), V::Error> {
        visitor.process_property(record)
    }
}

/// Kind of token held by a token store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Node labels
    Label,
    /// Relationship types
    RelationshipType,
    /// Property keys
    PropertyKey,
}

impl TokenKind {
    /// Human readable kind
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Label => "Label",
            TokenKind::RelationshipType => "RelationshipType",
            TokenKind::PropertyKey => "PropertyKey",
        }
    }

    /// Type descriptor of the token store
    pub fn descriptor(&self) -> &'static str {
        match self {
            TokenKind::Label => "LabelTokenStore",
            TokenKind::RelationshipType => "RelationshipTypeTokenStore",
            TokenKind::PropertyKey => "PropertyKeyTokenStore",
        }
    }

    /// Type descriptor of the companion name store
    pub fn name_descriptor(&self) -> &'static str {
        match self {
            TokenKind::Label => "LabelTokenNameStore",
            TokenKind::RelationshipType => "RelationshipTypeTokenNameStore",
            TokenKind::PropertyKey => "PropertyKeyTokenNameStore",
        }
    }

    /// Highest token id
    pub fn max_id(&self) -> u64 {
        match self {
            TokenKind::Label => (1 << 32) - 1,
            TokenKind::RelationshipType => (1 << 16) - 1,
            TokenKind::PropertyKey => (1 << 24) - 1,
        }
    }
}

/// On-disk token slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TokenSlot {
    name_id: u64,
    flags: u32,
    _padding: u32,
}

/// Token store format, one per token kind
#[derive(Debug, Clone, Copy)]
pub struct TokenFormat {
    kind: TokenKind,
}

impl TokenFormat {
    /// Format for tokens of `kind`
    pub fn new(kind: TokenKind) -> Self {
        Self { kind }
    }

    /// Token kind
    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl RecordFormat for TokenFormat {
    type Record = TokenRecord;

    fn type_descriptor(&self) -> &'static str {
        self.kind.descriptor()
    }

    fn record_size(&self) -> usize {
        TOKEN_RECORD_SIZE
    }

    fn max_id(&self) -> u64 {
        self.kind.max_id()
    }

    fn new_record(&self, id: u64) -> TokenRecord {
        TokenRecord::new(id)
    }

    fn is_in_use(&self, bytes: &[u8]) -> bool {
        let slot: TokenSlot = bytemuck::pod_read_unaligned(&bytes[..TOKEN_RECORD_SIZE]);
        slot.flags & IN_USE != 0
    }

    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<TokenRecord> {
        let slot: TokenSlot = bytemuck::pod_read_unaligned(&bytes[..TOKEN_RECORD_SIZE]);
        check_flags(
            self.type_descriptor(),
            id,
            slot.flags,
            IN_USE | TOKEN_INTERNAL,
            mode,
        )?;

        let in_use = slot.flags & IN_USE != 0;
        if mode == RecordLoad::Normal && in_use && slot.name_id == NULL_REFERENCE {
            return Err(Error::corrupt(
                self.type_descriptor(),
                id,
                "in-use token without a name",
            ));
        }

        Ok(TokenRecord {
            id,
            in_use,
            created: false,
            internal: slot.flags & TOKEN_INTERNAL != 0,
            name_id: slot.name_id,
        })
    }

    fn write(&self, record: &TokenRecord, bytes: &mut [u8]) -> Result<()> {
        let mut flags = 0;
        if record.in_use {
            flags |= IN_USE;
        }
        if record.internal {
            flags |= TOKEN_INTERNAL;
        }
        let slot = TokenSlot {
            name_id: record.name_id,
            flags,
            _padding: 0,
        };
        bytes[..TOKEN_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&slot));
        Ok(())
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &TokenRecord,
    ) -> std::result::Result<(), V::Error> {
        match self.kind {
            TokenKind::Label => visitor.process_label_token(record),
            TokenKind::RelationshipType => visitor.process_relationship_type_token(record),
            TokenKind::PropertyKey => visitor.process_property_key_token(record),
        }
    }
}

/// Payload carried by a dynamic store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicKind {
    /// String bytes (string properties, token names)
    String,
    /// Encoded arrays
    Array,
    /// Node label arrays prefixed with the owning node id
    NodeLabels,
}

/// Dynamic (overflow chain) store format
#[derive(Debug, Clone, Copy)]
pub struct DynamicFormat {
    kind: DynamicKind,
    descriptor: &'static str,
    block_size: usize,
}

impl DynamicFormat {
    /// Highest dynamic record id (36 bits, the width of a label chain pointer)
    pub const MAX_ID: u64 = (1 << 36) - 1;

    /// Format with `block_size` bytes per record, header included
    pub fn new(kind: DynamicKind, descriptor: &'static str, block_size: usize) -> Result<Self> {
        if block_size <= DYNAMIC_HEADER_SIZE {
            return Err(Error::invalid_config(format!(
                "block size {} of {} must exceed the {} byte record header",
                block_size, descriptor, DYNAMIC_HEADER_SIZE
            )));
        }
        Ok(Self {
            kind,
            descriptor,
            block_size,
        })
    }

    /// Payload kind
    pub fn kind(&self) -> DynamicKind {
        self.kind
    }

    /// Total bytes per record
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Payload capacity of one record
    pub fn data_size(&self) -> usize {
        self.block_size - DYNAMIC_HEADER_SIZE
    }

    /// Same format with another block size, used when the store file
    /// already fixed it
    pub fn with_block_size(&self, block_size: usize) -> Result<Self> {
        Self::new(self.kind, self.descriptor, block_size)
    }
}

impl RecordFormat for DynamicFormat {
    type Record = DynamicRecord;

    fn type_descriptor(&self) -> &'static str {
        self.descriptor
    }

    fn record_size(&self) -> usize {
        self.block_size
    }

    fn reserved_low_ids(&self) -> u64 {
        1
    }

    fn max_id(&self) -> u64 {
        Self::MAX_ID
    }

    fn new_record(&self, id: u64) -> DynamicRecord {
        DynamicRecord::new(id)
    }

    fn is_in_use(&self, bytes: &[u8]) -> bool {
        bytes[0] & DYNAMIC_IN_USE != 0
    }

    fn read(&self, id: u64, bytes: &[u8], mode: RecordLoad) -> Result<DynamicRecord> {
        let flags = bytes[0];
        if mode == RecordLoad::Normal && flags & !(DYNAMIC_IN_USE | DYNAMIC_START) != 0 {
            return Err(Error::corrupt(
                self.descriptor,
                id,
                format!("unknown flag bits {:#x}", flags),
            ));
        }

        let mut next = [0u8; 8];
        next.copy_from_slice(&bytes[1..9]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[9..13]);
        let length = u32::from_le_bytes(len) as usize;

        let capacity = self.data_size();
        if length > capacity && mode == RecordLoad::Normal {
            return Err(Error::corrupt(
                self.descriptor,
                id,
                format!("payload length {} exceeds block capacity {}", length, capacity),
            ));
        }
        let length = length.min(capacity);

        Ok(DynamicRecord {
            id,
            in_use: flags & DYNAMIC_IN_USE != 0,
            created: false,
            start_record: flags & DYNAMIC_START != 0,
            next_block: u64::from_le_bytes(next),
            data: bytes[DYNAMIC_HEADER_SIZE..DYNAMIC_HEADER_SIZE + length].to_vec(),
        })
    }

    fn write(&self, record: &DynamicRecord, bytes: &mut [u8]) -> Result<()> {
        let capacity = self.data_size();
        if record.data.len() > capacity {
            return Err(Error::invalid_record(
                self.descriptor,
                record.id,
                format!(
                    "payload of {} bytes exceeds block capacity {}",
                    record.data.len(),
                    capacity
                ),
            ));
        }

        let mut flags = 0;
        if record.in_use {
            flags |= DYNAMIC_IN_USE;
        }
        if record.start_record {
            flags |= DYNAMIC_START;
        }

        let block = &mut bytes[..self.block_size];
        block.fill(0);
        block[0] = flags;
        block[1..9].copy_from_slice(&record.next_block.to_le_bytes());
        block[9..13].copy_from_slice(&(record.data.len() as u32).to_le_bytes());
        block[DYNAMIC_HEADER_SIZE..DYNAMIC_HEADER_SIZE + record.data.len()]
            .copy_from_slice(&record.data);
        Ok(())
    }

    fn next_in_chain(&self, record: &DynamicRecord) -> Option<u64> {
        record.has_next().then_some(record.next_block)
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &DynamicRecord,
    ) -> std::result::Result<(), V::Error> {
        match self.kind {
            DynamicKind::String => visitor.process_string(record),
            DynamicKind::Array => visitor.process_array(record),
            DynamicKind::NodeLabels => visitor.process_label_array_with_owner(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_sizes() {
        assert_eq!(std::mem::size_of::<NodeSlot>(), NODE_RECORD_SIZE);
        assert_eq!(std::mem::size_of::<RelationshipSlot>(), RELATIONSHIP_RECORD_SIZE);
        assert_eq!(std::mem::size_of::<TokenSlot>(), TOKEN_RECORD_SIZE);
        assert_eq!(std::mem::size_of::<PropertySlot>(), PROPERTY_RECORD_SIZE);
    }

    #[test]
    fn test_node_layout() {
        let format = NodeFormat;
        let mut record = NodeRecord::created(3);
        record.next_rel = 11;
        record.label_field = 0x12_3456_789A;
        record.dense = true;

        let mut bytes = [0u8; NODE_RECORD_SIZE];
        format.write(&record, &mut bytes).unwrap();
        assert!(format.is_in_use(&bytes));

        let read = format.read(3, &bytes, RecordLoad::Normal).unwrap();
        assert_eq!(read.next_rel, 11);
        assert_eq!(read.next_prop, NULL_REFERENCE);
        assert_eq!(read.label_field, 0x12_3456_789A);
        assert!(read.dense);
        assert!(!read.created);
    }

    #[test]
    fn test_node_label_field_overflow() {
        let mut record = NodeRecord::created(1);
        record.label_field = 1 << 40;
        let mut bytes = [0u8; NODE_RECORD_SIZE];
        assert!(matches!(
            NodeFormat.write(&record, &mut bytes),
            Err(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_unknown_flags_are_corrupt_unless_forced() {
        let mut bytes = [0u8; NODE_RECORD_SIZE];
        NodeFormat.write(&NodeRecord::created(1), &mut bytes).unwrap();
        let mut slot: NodeSlot = bytemuck::pod_read_unaligned(&bytes);
        slot.flags |= 0x80;
        bytes.copy_from_slice(bytemuck::bytes_of(&slot));

        let err = NodeFormat.read(1, &bytes, RecordLoad::Normal).unwrap_err();
        assert!(err.is_corrupt());
        let forced = NodeFormat.read(1, &bytes, RecordLoad::Force).unwrap();
        assert!(forced.in_use);
    }

    #[test]
    fn test_relationship_flags() {
        let mut record = RelationshipRecord::between(9, 1, 2, 7);
        record.first_in_second_chain = true;
        record.first_next_rel = 4;

        let mut bytes = [0u8; RELATIONSHIP_RECORD_SIZE];
        RelationshipFormat.write(&record, &mut bytes).unwrap();
        let read = RelationshipFormat.read(9, &bytes, RecordLoad::Normal).unwrap();
        assert!(!read.first_in_first_chain);
        assert!(read.first_in_second_chain);
        assert_eq!(read.type_id, 7);
        assert_eq!(read.first_next_rel, 4);
    }

    #[test]
    fn test_relationship_requires_endpoints() {
        let mut record = RelationshipRecord::new(1);
        record.in_use = true;
        let mut bytes = [0u8; RELATIONSHIP_RECORD_SIZE];
        assert!(RelationshipFormat.write(&record, &mut bytes).is_err());
    }

    #[test]
    fn test_token_internal_flag() {
        let format = TokenFormat::new(TokenKind::PropertyKey);
        let mut record = TokenRecord::new(2);
        record.in_use = true;
        record.internal = true;
        record.name_id = 5;

        let mut bytes = [0u8; TOKEN_RECORD_SIZE];
        format.write(&record, &mut bytes).unwrap();
        let read = format.read(2, &bytes, RecordLoad::Normal).unwrap();
        assert!(read.internal);
        assert_eq!(read.name_id, 5);
        assert_eq!(format.type_descriptor(), "PropertyKeyTokenStore");
    }

    #[test]
    fn test_property_layout() {
        let mut record = PropertyRecord::new(6);
        record.in_use = true;
        record.next_prop = 7;
        record.blocks = vec![
            PropertyBlock { key: 1, kind: PropertyType::Int, payload: (-5i64) as u64 },
            PropertyBlock { key: 3, kind: PropertyType::String, payload: 12 },
        ];

        let mut bytes = [0xFFu8; PROPERTY_RECORD_SIZE];
        PropertyFormat.write(&record, &mut bytes).unwrap();
        assert!(PropertyFormat.is_in_use(&bytes));

        let read = PropertyFormat.read(6, &bytes, RecordLoad::Normal).unwrap();
        assert_eq!(read.blocks, record.blocks);
        assert_eq!(read.prev_prop, NULL_REFERENCE);
        assert_eq!(PropertyFormat.next_in_chain(&read), Some(7));
        assert_eq!(read.block(3).map(|b| b.payload), Some(12));

        let mut full = record.clone();
        full.blocks = vec![record.blocks[0]; PROPERTY_BLOCKS + 1];
        assert!(matches!(
            PropertyFormat.write(&full, &mut bytes),
            Err(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_unknown_property_type_is_corrupt_unless_forced() {
        let mut record = PropertyRecord::new(2);
        record.in_use = true;
        record.blocks = vec![
            PropertyBlock { key: 1, kind: PropertyType::Bool, payload: 1 },
            PropertyBlock { key: 2, kind: PropertyType::Float, payload: 2.5f64.to_bits() },
        ];
        let mut bytes = [0u8; PROPERTY_RECORD_SIZE];
        PropertyFormat.write(&record, &mut bytes).unwrap();

        let mut slot: PropertySlot = bytemuck::pod_read_unaligned(&bytes);
        slot.blocks[1].kind = 99;
        bytes.copy_from_slice(bytemuck::bytes_of(&slot));

        assert!(PropertyFormat.read(2, &bytes, RecordLoad::Normal).unwrap_err().is_corrupt());
        let forced = PropertyFormat.read(2, &bytes, RecordLoad::Force).unwrap();
        assert_eq!(forced.blocks, vec![record.blocks[0]]);
    }

    #[test]
    fn test_dynamic_layout() {
        let format = DynamicFormat::new(DynamicKind::String, "StringPropertyStore", 32).unwrap();
        assert_eq!(format.data_size(), 19);
        assert_eq!(format.reserved_low_ids(), 1);

        let mut record = DynamicRecord::new(4);
        record.in_use = true;
        record.next_block = 8;
        record.data = b"hello".to_vec();

        let mut bytes = [0xAAu8; 32];
        format.write(&record, &mut bytes).unwrap();
        assert_eq!(bytes[0], DYNAMIC_IN_USE | DYNAMIC_START);
        assert_eq!(&bytes[9..13], &5u32.to_le_bytes());
        assert!(bytes[18..].iter().all(|&b| b == 0));

        let read = format.read(4, &bytes, RecordLoad::Normal).unwrap();
        assert_eq!(read.data, b"hello");
        assert_eq!(format.next_in_chain(&read), Some(8));
    }

    #[test]
    fn test_dynamic_length_overflow() {
        let format = DynamicFormat::new(DynamicKind::Array, "ArrayPropertyStore", 20).unwrap();
        let mut bytes = [0u8; 20];
        bytes[0] = DYNAMIC_IN_USE;
        bytes[9..13].copy_from_slice(&100u32.to_le_bytes());

        assert!(format.read(1, &bytes, RecordLoad::Normal).unwrap_err().is_corrupt());
        let forced = format.read(1, &bytes, RecordLoad::Force).unwrap();
        assert_eq!(forced.length(), 7);

        let mut record = DynamicRecord::new(1);
        record.data = vec![0; 8];
        assert!(format.write(&record, &mut bytes).is_err());
    }

    #[test]
    fn test_block_size_must_exceed_header() {
        assert!(DynamicFormat::new(DynamicKind::String, "x", DYNAMIC_HEADER_SIZE).is_err());
    }
}
