//! Relationship store
//!
//! Every relationship sits in two doubly linked lists, one per endpoint.
//! A node record points at the head of its list; each relationship carries
//! prev/next pointers for its first and its second node.

use crate::storage::format::{NodeFormat, RelationshipFormat};
use crate::storage::record::{NULL_REFERENCE, RelationshipRecord};
use crate::storage::record_store::{CommonStore, RecordStore};
use crate::{Error, Result};
use std::collections::HashSet;

/// Store of relationship records
pub type RelationshipStore = CommonStore<RelationshipFormat>;

/// Store of node records
pub type NodeStore = CommonStore<NodeFormat>;

impl CommonStore<RelationshipFormat> {
    /// Relationships of `node`, walking its chain from `first_rel`
    pub fn relationship_chain(&self, node: u64, first_rel: u64) -> Result<Vec<RelationshipRecord>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = first_rel;

        while next != NULL_REFERENCE {
            if !seen.insert(next) {
                return Err(Error::corrupt(
                    self.type_descriptor(),
                    next,
                    format!("relationship chain of node {} loops", node),
                ));
            }
            let record = self.get_record(next)?;
            next = record.next_for(node).ok_or_else(|| {
                Error::corrupt(
                    self.type_descriptor(),
                    record.id,
                    format!("relationship in the chain of node {} does not touch it", node),
                )
            })?;
            chain.push(record);
        }

        Ok(chain)
    }

    /// Create a relationship and put it at the head of both endpoint chains
    pub fn create_relationship(
        &self,
        nodes: &NodeStore,
        first_node: u64,
        second_node: u64,
        type_id: u32,
    ) -> Result<u64> {
        let mut first = nodes.get_record(first_node)?;
        let mut second = if second_node == first_node {
            None
        } else {
            Some(nodes.get_record(second_node)?)
        };

        let id = self.next_id()?;
        let mut record = RelationshipRecord::between(id, first_node, second_node, type_id);
        record.first_in_first_chain = true;
        record.first_in_second_chain = true;
        record.first_next_rel = first.next_rel;
        record.second_next_rel = second.as_ref().map_or(first.next_rel, |n| n.next_rel);

        self.unlink_head(first.next_rel, first_node, id)?;
        if let Some(node) = &second {
            self.unlink_head(node.next_rel, second_node, id)?;
        }
        self.update_record(&record)?;

        first.next_rel = id;
        nodes.update_record(&first)?;
        if let Some(node) = second.as_mut() {
            node.next_rel = id;
            nodes.update_record(node)?;
        }
        Ok(id)
    }

    /// Point the old head of `node`'s chain back at the new head `new_head`
    fn unlink_head(&self, old_head: u64, node: u64, new_head: u64) -> Result<()> {
        if old_head == NULL_REFERENCE {
            return Ok(());
        }
        let mut head = self.get_record(old_head)?;
        if head.first_node == node {
            head.first_prev_rel = new_head;
            head.first_in_first_chain = false;
        }
        if head.second_node == node {
            head.second_prev_rel = new_head;
            head.first_in_second_chain = false;
        }
        self.update_record(&head)
    }
}
