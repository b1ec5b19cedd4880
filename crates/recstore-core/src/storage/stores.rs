//! All stores of one database directory
//!
//! ```text
//! <dir>/
//!   nodes.store                node records
//!   node_labels.store          dynamic label chains
//!   rels.store                 relationship records
//!   labels.store (+ .names)    label tokens
//!   rel_types.store (+ .names) relationship type tokens
//!   prop_keys.store (+ .names) property key tokens
//!   props.store                property records
//!   strings.store              string property chains
//!   arrays.store               array property chains
//!   meta.json                  last committed transaction
//! ```

use crate::config::StoreConfig;
use crate::storage::dynamic::DynamicStore;
use crate::storage::format::{
    DynamicFormat, DynamicKind, NodeFormat, RelationshipFormat, TokenKind,
};
use crate::storage::labels::NodeLabels;
use crate::storage::property_store::{PropertyStore, PropertyValue};
use crate::storage::record::{NULL_REFERENCE, NodeRecord};
use crate::storage::record_store::RecordStore;
use crate::storage::relationship_store::{NodeStore, RelationshipStore};
use crate::storage::token_store::TokenStore;
use crate::storage::tx_id::{HighestTransactionId, TransactionId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const META_FILE: &str = "meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    last_committed_tx: TransactionId,
}

/// Every record store of a database directory
pub struct GraphStores {
    dir: PathBuf,
    nodes: NodeStore,
    node_labels: DynamicStore,
    relationships: RelationshipStore,
    labels: TokenStore,
    relationship_types: TokenStore,
    property_keys: TokenStore,
    properties: PropertyStore,
    last_committed: HighestTransactionId,
    closed: AtomicBool,
}

impl std::fmt::Debug for GraphStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStores")
            .field("dir", &self.dir)
            .field("last_committed", &self.last_committed.get())
            .finish()
    }
}

impl GraphStores {
    /// Open (creating if needed) every store under `dir`
    pub fn open<P: AsRef<Path>>(dir: P, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let dynamic = |file: &str,
                       kind: DynamicKind,
                       descriptor: &'static str,
                       block_size: usize| {
            DynamicStore::open_dynamic(
                dir.join(file),
                DynamicFormat::new(kind, descriptor, block_size)?,
                config,
            )
        };
        let tokens = |file: &str, kind: TokenKind| {
            TokenStore::open(
                dir.join(format!("{}.store", file)),
                dir.join(format!("{}.names.store", file)),
                kind,
                config,
            )
        };

        let stores = Self {
            nodes: NodeStore::open(dir.join("nodes.store"), NodeFormat, config)?,
            node_labels: dynamic(
                "node_labels.store",
                DynamicKind::NodeLabels,
                "NodeLabelStore",
                config.label_block_size,
            )?,
            relationships: RelationshipStore::open(
                dir.join("rels.store"),
                RelationshipFormat,
                config,
            )?,
            labels: tokens("labels", TokenKind::Label)?,
            relationship_types: tokens("rel_types", TokenKind::RelationshipType)?,
            property_keys: tokens("prop_keys", TokenKind::PropertyKey)?,
            properties: PropertyStore::open(
                dir.join("props.store"),
                dir.join("strings.store"),
                dir.join("arrays.store"),
                config,
            )?,
            last_committed: HighestTransactionId::new(Self::read_meta(&dir)?),
            closed: AtomicBool::new(false),
            dir,
        };

        tracing::info!(
            dir = %stores.dir.display(),
            nodes = stores.nodes.high_id(),
            relationships = stores.relationships.high_id(),
            last_committed_tx = stores.last_committed.get().transaction_id,
            "opened graph stores"
        );
        Ok(stores)
    }

    fn read_meta(dir: &Path) -> Result<TransactionId> {
        let path = dir.join(META_FILE);
        if !path.exists() {
            return Ok(TransactionId::default());
        }
        let meta: StoreMeta = serde_json::from_slice(&std::fs::read(path)?)?;
        Ok(meta.last_committed_tx)
    }

    fn write_meta(&self) -> Result<()> {
        let meta = StoreMeta {
            last_committed_tx: self.last_committed.get(),
        };
        let tmp = self.dir.join(format!("{}.tmp", META_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(&meta)?)?;
        std::fs::rename(tmp, self.dir.join(META_FILE))?;
        Ok(())
    }

    /// Database directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Node store
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// Dynamic store of overflowing node label sets
    pub fn node_labels(&self) -> &DynamicStore {
        &self.node_labels
    }

    /// Relationship store
    pub fn relationships(&self) -> &RelationshipStore {
        &self.relationships
    }

    /// Label token store
    pub fn labels(&self) -> &TokenStore {
        &self.labels
    }

    /// Relationship type token store
    pub fn relationship_types(&self) -> &TokenStore {
        &self.relationship_types
    }

    /// Property key token store
    pub fn property_keys(&self) -> &TokenStore {
        &self.property_keys
    }

    /// Property store
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// String property store
    pub fn strings(&self) -> &DynamicStore {
        self.properties.string_store()
    }

    /// Array property store
    pub fn arrays(&self) -> &DynamicStore {
        self.properties.array_store()
    }

    /// Highest committed transaction id tracker
    pub fn last_committed(&self) -> &HighestTransactionId {
        &self.last_committed
    }

    /// Report a committed transaction; `true` if it is the new highest
    pub fn transaction_committed(
        &self,
        transaction_id: u64,
        checksum: u32,
        commit_timestamp: u64,
    ) -> bool {
        self.last_committed
            .offer(transaction_id, checksum, commit_timestamp)
    }

    /// Create an empty node
    pub fn create_node(&self) -> Result<u64> {
        let id = self.nodes.next_id()?;
        self.nodes.update_record(&NodeRecord::created(id))?;
        Ok(id)
    }

    /// Labels of `node_id`, ascending
    pub fn node_label_ids(&self, node_id: u64) -> Result<Vec<u64>> {
        let node = self.nodes.get_record(node_id)?;
        NodeLabels::parse(&node).get(&self.node_labels)
    }

    /// Add `label` to `node_id`
    pub fn add_node_label(&self, node_id: u64, label: u64) -> Result<()> {
        self.change_labels(node_id, |labels, node, store| labels.add(node, label, store))
    }

    /// Remove `label` from `node_id`
    pub fn remove_node_label(&self, node_id: u64, label: u64) -> Result<()> {
        self.change_labels(node_id, |labels, node, store| labels.remove(node, label, store))
    }

    /// Replace the labels of `node_id`
    pub fn set_node_labels(&self, node_id: u64, label_ids: &[u64]) -> Result<()> {
        self.change_labels(node_id, |labels, node, store| labels.put(node, label_ids, store))
    }

    fn change_labels<F>(&self, node_id: u64, change: F) -> Result<()>
    where
        F: FnOnce(&mut NodeLabels, &mut NodeRecord, &DynamicStore) -> Result<()>,
    {
        let mut node = self.nodes.get_record(node_id)?;
        let mut labels = NodeLabels::parse(&node);
        change(&mut labels, &mut node, &self.node_labels)?;
        self.nodes.update_record(&node)
    }

    /// Properties of `node_id` as `(key, value)`
    pub fn node_properties(&self, node_id: u64) -> Result<Vec<(u32, PropertyValue)>> {
        let node = self.nodes.get_record(node_id)?;
        self.properties.properties(node.next_prop)
    }

    /// Value of property `key` on `node_id`
    pub fn node_property(&self, node_id: u64, key: u32) -> Result<Option<PropertyValue>> {
        let node = self.nodes.get_record(node_id)?;
        self.properties.property(node.next_prop, key)
    }

    /// Set property `key` on `node_id`
    pub fn set_node_property(&self, node_id: u64, key: u32, value: &PropertyValue) -> Result<()> {
        let mut node = self.nodes.get_record(node_id)?;
        let head = self.properties.set_property(node.next_prop, key, value)?;
        if head != node.next_prop {
            node.next_prop = head;
            self.nodes.update_record(&node)?;
        }
        Ok(())
    }

    /// Remove property `key` from `node_id`
    pub fn remove_node_property(&self, node_id: u64, key: u32) -> Result<()> {
        let mut node = self.nodes.get_record(node_id)?;
        let head = self.properties.remove_property(node.next_prop, key)?;
        if head != node.next_prop {
            node.next_prop = head;
            self.nodes.update_record(&node)?;
        }
        Ok(())
    }

    /// Properties of relationship `rel_id` as `(key, value)`
    pub fn relationship_properties(&self, rel_id: u64) -> Result<Vec<(u32, PropertyValue)>> {
        let rel = self.relationships.get_record(rel_id)?;
        self.properties.properties(rel.next_prop)
    }

    /// Set property `key` on relationship `rel_id`
    pub fn set_relationship_property(
        &self,
        rel_id: u64,
        key: u32,
        value: &PropertyValue,
    ) -> Result<()> {
        let mut rel = self.relationships.get_record(rel_id)?;
        let head = self.properties.set_property(rel.next_prop, key, value)?;
        if head != rel.next_prop {
            rel.next_prop = head;
            self.relationships.update_record(&rel)?;
        }
        Ok(())
    }

    /// Delete `node_id`, freeing its label and property chains
    pub fn delete_node(&self, node_id: u64) -> Result<()> {
        let mut node = self.nodes.get_record(node_id)?;
        if node.next_rel != NULL_REFERENCE {
            return Err(Error::storage(format!(
                "node {} still has relationships",
                node_id
            )));
        }
        if let NodeLabels::Dynamic(dynamic) = NodeLabels::parse(&node) {
            self.node_labels.free_chain(dynamic.head())?;
        }
        self.properties.delete_chain(node.next_prop)?;
        node.in_use = false;
        node.label_field = 0;
        node.next_prop = NULL_REFERENCE;
        self.nodes.update_record(&node)
    }

    /// Flush every store and persist the last committed transaction
    pub fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed("GraphStores"));
        }
        self.nodes.flush()?;
        self.node_labels.flush()?;
        self.relationships.flush()?;
        self.labels.flush()?;
        self.relationship_types.flush()?;
        self.property_keys.flush()?;
        self.properties.flush()?;
        self.write_meta()?;
        tracing::debug!(dir = %self.dir.display(), "flushed graph stores");
        Ok(())
    }

    /// Flush and close every store; idempotent
    ///
    /// A failed close leaves the stores open so it can be retried.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush()?;

        self.nodes.close()?;
        self.node_labels.close()?;
        self.relationships.close()?;
        self.labels.close()?;
        self.relationship_types.close()?;
        self.property_keys.close()?;
        self.properties.close()?;
        self.closed.store(true, Ordering::Release);
        tracing::debug!(dir = %self.dir.display(), "closed graph stores");
        Ok(())
    }
}

impl Drop for GraphStores {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to close graph stores on drop"
            );
        }
    }
}
