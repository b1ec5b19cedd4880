//! Record stores
//!
//! Fixed-size records live in page-cached store files addressed by record
//! id. Values too large for a fixed record overflow into chains of dynamic
//! records. Layout:
//!
//! - [`page_location`]: id to page/offset arithmetic
//! - [`format`], [`record`], [`header`]: on-disk layouts
//! - [`record_store`]: the store contract and the generic engine
//! - [`dynamic`], [`labels`], [`token_store`], [`relationship_store`],
//!   [`property_store`]: entity stores
//! - [`tx_id`], [`id_iterator`]: bookkeeping
//! - [`stores`]: every store of a database directory

pub mod delegating;
pub mod dynamic;
pub mod format;
pub mod header;
pub mod id_generator;
pub mod id_iterator;
pub mod labels;
pub mod page_location;
pub mod property_store;
pub mod record;
pub mod record_store;
pub mod relationship_store;
pub mod stores;
pub mod token_store;
pub mod tx_id;
pub mod visitor;

pub use delegating::DelegatingRecordStore;
pub use dynamic::{
    DynamicRecordAllocator, DynamicStore, ReusableRecordsAllocator,
    StandardDynamicRecordAllocator,
};
pub use format::{RecordFormat, RecordLoad};
pub use id_iterator::StoreIdIterator;
pub use labels::NodeLabels;
pub use property_store::{PropertyStore, PropertyValue};
pub use record::{
    DynamicRecord, NodeRecord, PropertyBlock, PropertyRecord, PropertyType, Record,
    RelationshipRecord, TokenRecord,
};
pub use record_store::{CommonStore, RecordStore};
pub use relationship_store::{NodeStore, RelationshipStore};
pub use stores::GraphStores;
pub use token_store::TokenStore;
pub use tx_id::{HighestTransactionId, TransactionId};
pub use visitor::RecordVisitor;
