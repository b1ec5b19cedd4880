//! In-memory records
//!
//! A record is the decoded form of one fixed-size slot of a store file.
//! Every record carries its id, an in-use flag and a "created" flag used by
//! recovery to tell freshly allocated records from updated ones.

/// Sentinel for "no record" in pointer fields
pub const NULL_REFERENCE: u64 = u64::MAX;

/// Common behaviour of every record kind
pub trait Record: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Record id, immutable once allocated
    fn id(&self) -> u64;

    /// Whether the record holds live data
    fn in_use(&self) -> bool;

    /// Set the in-use flag
    fn set_in_use(&mut self, in_use: bool);

    /// Whether the record was created by the current transaction
    fn is_created(&self) -> bool;

    /// Flag the record as created by the current transaction
    fn set_created(&mut self);
}

macro_rules! impl_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Record for $ty {
                fn id(&self) -> u64 {
                    self.id
                }

                fn in_use(&self) -> bool {
                    self.in_use
                }

                fn set_in_use(&mut self, in_use: bool) {
                    self.in_use = in_use;
                }

                fn is_created(&self) -> bool {
                    self.created
                }

                fn set_created(&mut self) {
                    self.created = true;
                }
            }
        )+
    };
}

/// Node record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Record id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Created-in-this-transaction flag (not persisted)
    pub created: bool,
    /// Node has a dense relationship layout
    pub dense: bool,
    /// First relationship in the node's chain
    pub next_rel: u64,
    /// First property of the node
    pub next_prop: u64,
    /// 40-bit label field, inline labels or a pointer to a label chain
    pub label_field: u64,
}

impl NodeRecord {
    /// Empty, not-in-use node record
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            dense: false,
            next_rel: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            label_field: 0,
        }
    }

    /// Node record being created now
    pub fn created(id: u64) -> Self {
        Self {
            in_use: true,
            created: true,
            ..Self::new(id)
        }
    }
}

/// Relationship record with per-endpoint chain pointers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Record id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Created-in-this-transaction flag (not persisted)
    pub created: bool,
    /// Start node id
    pub first_node: u64,
    /// End node id
    pub second_node: u64,
    /// Relationship type token id
    pub type_id: u32,
    /// Previous relationship in the start node's chain
    pub first_prev_rel: u64,
    /// Next relationship in the start node's chain
    pub first_next_rel: u64,
    /// Previous relationship in the end node's chain
    pub second_prev_rel: u64,
    /// Next relationship in the end node's chain
    pub second_next_rel: u64,
    /// First property of the relationship
    pub next_prop: u64,
    /// This is the first relationship of the start node's chain
    pub first_in_first_chain: bool,
    /// This is the first relationship of the end node's chain
    pub first_in_second_chain: bool,
}

impl RelationshipRecord {
    /// Empty, not-in-use relationship record
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            first_node: NULL_REFERENCE,
            second_node: NULL_REFERENCE,
            type_id: 0,
            first_prev_rel: NULL_REFERENCE,
            first_next_rel: NULL_REFERENCE,
            second_prev_rel: NULL_REFERENCE,
            second_next_rel: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            first_in_first_chain: false,
            first_in_second_chain: false,
        }
    }

    /// In-use relationship between two nodes
    pub fn between(id: u64, first_node: u64, second_node: u64, type_id: u32) -> Self {
        Self {
            in_use: true,
            created: true,
            first_node,
            second_node,
            type_id,
            ..Self::new(id)
        }
    }

    /// Next relationship in `node`'s chain, `None` if `node` is not an endpoint
    pub fn next_for(&self, node: u64) -> Option<u64> {
        if self.first_node == node {
            Some(self.first_next_rel)
        } else if self.second_node == node {
            Some(self.second_next_rel)
        } else {
            None
        }
    }
}

/// Token record pointing at its name in a dynamic string store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Record id (the token id)
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Created-in-this-transaction flag (not persisted)
    pub created: bool,
    /// Token is internal to the database
    pub internal: bool,
    /// Head of the name chain in the name store
    pub name_id: u64,
}

impl TokenRecord {
    /// Empty, not-in-use token record
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            internal: false,
            name_id: NULL_REFERENCE,
        }
    }
}

/// One segment of a dynamic record chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRecord {
    /// Record id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Created-in-this-transaction flag (not persisted)
    pub created: bool,
    /// First record of its chain
    pub start_record: bool,
    /// Next record of the chain or [`NULL_REFERENCE`]
    pub next_block: u64,
    /// Payload bytes held by this segment
    pub data: Vec<u8>,
}

impl DynamicRecord {
    /// Empty, not-in-use dynamic record
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            start_record: true,
            next_block: NULL_REFERENCE,
            data: Vec::new(),
        }
    }

    /// Payload length of this segment
    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// Whether another segment follows
    pub fn has_next(&self) -> bool {
        self.next_block != NULL_REFERENCE
    }
}

/// How a property block stores its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PropertyType {
    /// `0` or `1` in the payload
    Bool = 1,
    /// Two's complement `i64`
    Int = 2,
    /// IEEE 754 bits of an `f64`
    Float = 3,
    /// Up to [`SHORT_STRING_CAPACITY`] UTF-8 bytes, length in the last byte
    ShortString = 4,
    /// Head of a chain in the string property store
    String = 5,
    /// Head of a chain in the array property store
    Array = 6,
}

/// Bytes a short string keeps inline in its block payload
pub const SHORT_STRING_CAPACITY: usize = 7;

impl PropertyType {
    /// Type for an on-disk type byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Float),
            4 => Some(Self::ShortString),
            5 => Some(Self::String),
            6 => Some(Self::Array),
            _ => None,
        }
    }

    /// Whether the payload points into a dynamic store
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::String | Self::Array)
    }
}

/// One property of a property record: key token, type and 8 byte payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyBlock {
    /// Property key token id
    pub key: u32,
    /// Payload interpretation
    pub kind: PropertyType,
    /// Inline value or dynamic chain head
    pub payload: u64,
}

/// Property record: a few property blocks in a doubly linked chain per entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    /// Record id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Created-in-this-transaction flag (not persisted)
    pub created: bool,
    /// Previous record of the owner's chain
    pub prev_prop: u64,
    /// Next record of the owner's chain
    pub next_prop: u64,
    /// Properties held by this record
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// Empty, not-in-use property record
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            prev_prop: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            blocks: Vec::new(),
        }
    }

    /// Block for `key`, if this record holds it
    pub fn block(&self, key: u32) -> Option<&PropertyBlock> {
        self.blocks.iter().find(|block| block.key == key)
    }
}

impl_record!(
    NodeRecord,
    RelationshipRecord,
    TokenRecord,
    DynamicRecord,
    PropertyRecord,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pointers() {
        let node = NodeRecord::new(1);
        assert_eq!(node.next_rel, NULL_REFERENCE);
        assert_eq!(node.next_prop, NULL_REFERENCE);
        assert!(!node.in_use());

        let rel = RelationshipRecord::new(2);
        assert_eq!(rel.first_next_rel, NULL_REFERENCE);
        assert_eq!(rel.second_prev_rel, NULL_REFERENCE);

        let dynamic = DynamicRecord::new(3);
        assert!(!dynamic.has_next());
        assert_eq!(dynamic.length(), 0);
    }

    #[test]
    fn test_created_flag() {
        let mut token = TokenRecord::new(4);
        assert!(!token.is_created());
        token.set_created();
        token.set_in_use(true);
        assert!(token.is_created());
        assert!(token.in_use());

        let node = NodeRecord::created(5);
        assert!(node.in_use() && node.is_created());
    }

    #[test]
    fn test_property_type_bytes() {
        for kind in [
            PropertyType::Bool,
            PropertyType::Int,
            PropertyType::Float,
            PropertyType::ShortString,
            PropertyType::String,
            PropertyType::Array,
        ] {
            assert_eq!(PropertyType::from_byte(kind as u8), Some(kind));
        }
        assert_eq!(PropertyType::from_byte(0), None);
        assert_eq!(PropertyType::from_byte(7), None);
        assert!(PropertyType::Array.is_dynamic());
        assert!(!PropertyType::ShortString.is_dynamic());
    }

    #[test]
    fn test_next_for_endpoint() {
        let mut rel = RelationshipRecord::between(0, 10, 20, 1);
        rel.first_next_rel = 5;
        rel.second_next_rel = 6;
        assert_eq!(rel.next_for(10), Some(5));
        assert_eq!(rel.next_for(20), Some(6));
        assert_eq!(rel.next_for(30), None);
    }
}
