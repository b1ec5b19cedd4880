//! Node label field codec
//!
//! A node keeps its labels in the 40-bit label field of its record:
//!
//! ```text
//! bit 39 set:   dynamic; bits 0..36 = head id of a label chain
//! bit 39 clear: inline;  bits 36..39 = label count n (0..=7),
//!               bits 0..36 = n label ids of 36 / n bits each
//! ```
//!
//! Label sets that do not fit inline move to a dynamic chain holding
//! `[node id, label ids ascending...]` as little-endian longs. A node that
//! went dynamic stays dynamic, whatever happens to its label count later.

use crate::storage::dynamic::{DynamicStore, decode_long_array, encode_long_array};
use crate::storage::format::DynamicFormat;
use crate::storage::record::NodeRecord;
use crate::storage::record_store::RecordStore;
use crate::{Error, Result};

/// Label field bit marking a dynamic label chain
pub const DYNAMIC_LABELS_FLAG: u64 = 1 << 39;

const INLINE_ID_BITS: u32 = 36;
const INLINE_ID_MASK: u64 = (1 << INLINE_ID_BITS) - 1;
const INLINE_COUNT_MASK: u64 = 0x7;

/// Most labels a label field holds inline
pub const MAX_INLINE_LABELS: usize = 7;

/// Label field for `labels` (sorted) if they fit inline
pub fn try_inline(labels: &[u64]) -> Option<u64> {
    let count = labels.len();
    if count == 0 {
        return Some(0);
    }
    if count > MAX_INLINE_LABELS {
        return None;
    }

    let bits = INLINE_ID_BITS / count as u32;
    let mut field = (count as u64) << INLINE_ID_BITS;
    for (i, &label) in labels.iter().enumerate() {
        if label >> bits != 0 {
            return None;
        }
        field |= label << (i as u32 * bits);
    }
    Some(field)
}

fn decode_inline(field: u64) -> Vec<u64> {
    let count = ((field >> INLINE_ID_BITS) & INLINE_COUNT_MASK) as u32;
    if count == 0 {
        return Vec::new();
    }
    let bits = INLINE_ID_BITS / count;
    let mask = (1u64 << bits) - 1;
    (0..count)
        .map(|i| (field >> (i * bits)) & mask)
        .collect()
}

/// Insert `label` into the sorted `labels`
///
/// Fails with [`Error::DuplicateLabel`] if it is already there.
pub fn concat_and_sort(labels: &[u64], label: u64) -> Result<Vec<u64>> {
    match labels.binary_search(&label) {
        Ok(_) => Err(Error::DuplicateLabel(label)),
        Err(at) => {
            let mut combined = Vec::with_capacity(labels.len() + 1);
            combined.extend_from_slice(&labels[..at]);
            combined.push(label);
            combined.extend_from_slice(&labels[at..]);
            Ok(combined)
        }
    }
}

/// Remove `label` from the sorted `labels`
///
/// Fails with [`Error::LabelNotFound`] if it is not there.
pub fn filter(labels: &[u64], label: u64) -> Result<Vec<u64>> {
    match labels.binary_search(&label) {
        Ok(at) => {
            let mut remaining = labels.to_vec();
            remaining.remove(at);
            Ok(remaining)
        }
        Err(_) => Err(Error::LabelNotFound(label)),
    }
}

/// Labels stored inline in the label field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineNodeLabels {
    labels: Vec<u64>,
}

/// Labels stored in a dynamic chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicNodeLabels {
    node_id: u64,
    head: u64,
    labels: Option<Vec<u64>>,
}

impl DynamicNodeLabels {
    /// Head record id of the label chain
    pub fn head(&self) -> u64 {
        self.head
    }
}

/// Decoded label field of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeLabels {
    /// Packed into the node record
    Inline(InlineNodeLabels),
    /// Held in a dynamic label chain
    Dynamic(DynamicNodeLabels),
}

impl NodeLabels {
    /// Interpret the label field of `node`
    pub fn parse(node: &NodeRecord) -> Self {
        let field = node.label_field;
        if field & DYNAMIC_LABELS_FLAG != 0 {
            NodeLabels::Dynamic(DynamicNodeLabels {
                node_id: node.id,
                head: field & INLINE_ID_MASK,
                labels: None,
            })
        } else {
            NodeLabels::Inline(InlineNodeLabels {
                labels: decode_inline(field),
            })
        }
    }

    /// Whether the labels live in the node record
    pub fn is_inlined(&self) -> bool {
        matches!(self, NodeLabels::Inline(_))
    }

    /// Labels without reading the store; `None` for an unread dynamic chain
    pub fn get_if_loaded(&self) -> Option<&[u64]> {
        match self {
            NodeLabels::Inline(inline) => Some(&inline.labels),
            NodeLabels::Dynamic(dynamic) => dynamic.labels.as_deref(),
        }
    }

    /// Labels, reading the dynamic chain from `store` on first use
    pub fn get(&mut self, store: &DynamicStore) -> Result<Vec<u64>> {
        match self {
            NodeLabels::Inline(inline) => Ok(inline.labels.clone()),
            NodeLabels::Dynamic(dynamic) => {
                if let Some(labels) = &dynamic.labels {
                    return Ok(labels.clone());
                }
                let labels = read_label_chain(store, dynamic.node_id, dynamic.head)?;
                dynamic.labels = Some(labels.clone());
                Ok(labels)
            }
        }
    }

    /// Add `label` to `node`
    ///
    /// Dynamic records are written to `store`; the caller persists `node`.
    pub fn add(&mut self, node: &mut NodeRecord, label: u64, store: &DynamicStore) -> Result<()> {
        let labels = concat_and_sort(&self.get(store)?, label)?;
        self.store_labels(node, labels, store)
    }

    /// Remove `label` from `node`
    pub fn remove(&mut self, node: &mut NodeRecord, label: u64, store: &DynamicStore) -> Result<()> {
        let labels = filter(&self.get(store)?, label)?;
        self.store_labels(node, labels, store)
    }

    /// Replace the labels of `node` with `labels`
    pub fn put(&mut self, node: &mut NodeRecord, labels: &[u64], store: &DynamicStore) -> Result<()> {
        let mut sorted = labels.to_vec();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::DuplicateLabel(pair[0]));
        }
        self.store_labels(node, sorted, store)
    }

    fn store_labels(
        &mut self,
        node: &mut NodeRecord,
        labels: Vec<u64>,
        store: &DynamicStore,
    ) -> Result<()> {
        match self {
            NodeLabels::Inline(inline) => match try_inline(&labels) {
                Some(field) => {
                    node.label_field = field;
                    inline.labels = labels;
                }
                None => {
                    let head = store.write_chain(&label_payload(node.id, &labels))?;
                    if head > DynamicFormat::MAX_ID {
                        return Err(Error::internal(format!(
                            "label chain head {} does not fit the label field",
                            head
                        )));
                    }
                    node.label_field = DYNAMIC_LABELS_FLAG | head;
                    tracing::debug!(
                        node = node.id,
                        head,
                        labels = labels.len(),
                        "labels moved to dynamic chain"
                    );
                    *self = NodeLabels::Dynamic(DynamicNodeLabels {
                        node_id: node.id,
                        head,
                        labels: Some(labels),
                    });
                }
            },
            NodeLabels::Dynamic(dynamic) => {
                store.rewrite_chain(dynamic.head, &label_payload(node.id, &labels))?;
                dynamic.labels = Some(labels);
            }
        }
        Ok(())
    }
}

fn label_payload(node_id: u64, labels: &[u64]) -> Vec<u8> {
    let mut values = Vec::with_capacity(labels.len() + 1);
    values.push(node_id);
    values.extend_from_slice(labels);
    encode_long_array(&values)
}

fn read_label_chain(store: &DynamicStore, node_id: u64, head: u64) -> Result<Vec<u64>> {
    let bytes = store.read_chain(head)?;
    let values = decode_long_array(&bytes).ok_or_else(|| {
        Error::corrupt(store.type_descriptor(), head, "label chain is not a long array")
    })?;

    match values.split_first() {
        Some((&owner, labels)) if owner == node_id => Ok(labels.to_vec()),
        Some((&owner, _)) => Err(Error::corrupt(
            store.type_descriptor(),
            head,
            format!("label chain belongs to node {}, not {}", owner, node_id),
        )),
        None => Err(Error::corrupt(
            store.type_descriptor(),
            head,
            "label chain without owning node",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::format::{DYNAMIC_HEADER_SIZE, DynamicKind};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn create_label_store() -> (DynamicStore, TempDir) {
        let dir = TempDir::new().unwrap();
        // Three longs per record
        let format =
            DynamicFormat::new(DynamicKind::NodeLabels, "NodeLabelStore", DYNAMIC_HEADER_SIZE + 24)
                .unwrap();
        let store =
            DynamicStore::open_dynamic(dir.path().join("labels.store"), format, &StoreConfig::small())
                .unwrap();
        (store, dir)
    }

    #[test]
    fn test_inline_capacity() {
        assert_eq!(try_inline(&[]), Some(0));
        assert!(try_inline(&[(1 << 36) - 1]).is_some());
        assert!(try_inline(&[1 << 36]).is_none());
        assert!(try_inline(&[1, (1 << 18) - 1]).is_some());
        assert!(try_inline(&[1, 1 << 18]).is_none());
        assert!(try_inline(&[1, 2, 3, 4, 5, 6, 31]).is_some());
        assert!(try_inline(&[1, 2, 3, 4, 5, 6, 32]).is_none());
        assert!(try_inline(&[1, 2, 3, 4, 5, 6, 7, 8]).is_none());
    }

    #[test]
    fn test_inline_field_layout() {
        let field = try_inline(&[1, 2, 3]).unwrap();
        assert_eq!(field >> 36, 3);
        assert_eq!(field & 0xFF_FFFF, 1 | (2 << 12));
        assert_eq!(decode_inline(field), vec![1, 2, 3]);
        assert_eq!(field & DYNAMIC_LABELS_FLAG, 0);
    }

    #[test]
    fn test_concat_and_filter_errors() {
        assert_eq!(concat_and_sort(&[1, 5], 3).unwrap(), vec![1, 3, 5]);
        assert!(matches!(concat_and_sort(&[1, 5], 5), Err(Error::DuplicateLabel(5))));
        assert_eq!(filter(&[1, 3, 5], 3).unwrap(), vec![1, 5]);
        assert!(matches!(filter(&[1, 5], 4), Err(Error::LabelNotFound(4))));
    }

    proptest! {
        #[test]
        fn prop_filter_undoes_concat(
            set in proptest::collection::btree_set(0u64..1_000, 0..20),
            x in 0u64..1_000,
        ) {
            prop_assume!(!set.contains(&x));
            let labels: Vec<u64> = set.into_iter().collect();
            let combined = concat_and_sort(&labels, x).unwrap();
            prop_assert!(combined.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(concat_and_sort(&combined, x).is_err());
            prop_assert_eq!(filter(&combined, x).unwrap(), labels.clone());
            if !labels.is_empty() {
                prop_assert!(filter(&labels, x).is_err());
            }
        }

        #[test]
        fn prop_inline_field_decodes_to_labels(
            set in proptest::collection::btree_set(0u64..64, 0..8),
        ) {
            let labels: Vec<u64> = set.into_iter().collect();
            if let Some(field) = try_inline(&labels) {
                prop_assert_eq!(field >> 40, 0);
                prop_assert_eq!(decode_inline(field), labels);
            }
        }
    }

    #[test]
    fn test_inline_to_dynamic() {
        let (store, _dir) = create_label_store();
        let mut node = NodeRecord::created(42);
        let mut labels = NodeLabels::parse(&node);

        for label in [3, 1, 2] {
            labels.add(&mut node, label, &store).unwrap();
        }
        assert!(labels.is_inlined());
        assert_eq!(NodeLabels::parse(&node).get_if_loaded(), Some(&[1, 2, 3][..]));

        let big = 1 << 30;
        labels.add(&mut node, big, &store).unwrap();
        assert!(!labels.is_inlined());
        assert_ne!(node.label_field & DYNAMIC_LABELS_FLAG, 0);
        assert_eq!(labels.get_if_loaded(), Some(&[1, 2, 3, big][..]));

        let mut reparsed = NodeLabels::parse(&node);
        assert_eq!(reparsed.get_if_loaded(), None);
        assert_eq!(reparsed.get(&store).unwrap(), vec![1, 2, 3, big]);
        assert_eq!(reparsed.get_if_loaded(), Some(&[1, 2, 3, big][..]));
    }

    #[test]
    fn test_dynamic_stays_dynamic() {
        let (store, _dir) = create_label_store();
        let mut node = NodeRecord::created(7);
        let mut labels = NodeLabels::parse(&node);
        labels.put(&mut node, &[1, 2, 3, 4, 5, 6, 7, 8], &store).unwrap();
        let NodeLabels::Dynamic(dynamic) = &labels else {
            panic!("eight labels should not fit inline");
        };
        let head = dynamic.head();
        assert_eq!(store.get_records(head).unwrap().len(), 3);

        for label in [8, 7, 6, 5, 4, 3] {
            labels.remove(&mut node, label, &store).unwrap();
        }
        assert!(!labels.is_inlined());
        assert_eq!(node.label_field, DYNAMIC_LABELS_FLAG | head);
        assert_eq!(store.get_records(head).unwrap().len(), 1);

        let mut reparsed = NodeLabels::parse(&node);
        assert_eq!(reparsed.get(&store).unwrap(), vec![1, 2]);

        reparsed.put(&mut node, &[9], &store).unwrap();
        assert!(!reparsed.is_inlined());
        assert_eq!(NodeLabels::parse(&node).get(&store).unwrap(), vec![9]);
    }

    #[test]
    fn test_dynamic_add_and_remove_errors() {
        let (store, _dir) = create_label_store();
        let mut node = NodeRecord::created(1);
        let mut labels = NodeLabels::parse(&node);
        labels.put(&mut node, &[10, 1 << 40], &store).unwrap();

        let mut labels = NodeLabels::parse(&node);
        assert!(matches!(
            labels.add(&mut node, 10, &store),
            Err(Error::DuplicateLabel(10))
        ));
        assert!(matches!(
            labels.remove(&mut node, 11, &store),
            Err(Error::LabelNotFound(11))
        ));
        labels.add(&mut node, 11, &store).unwrap();
        assert_eq!(labels.get(&store).unwrap(), vec![10, 11, 1 << 40]);
    }

    #[test]
    fn test_put_rejects_duplicates() {
        let (store, _dir) = create_label_store();
        let mut node = NodeRecord::created(1);
        let mut labels = NodeLabels::parse(&node);
        assert!(matches!(
            labels.put(&mut node, &[4, 2, 4], &store),
            Err(Error::DuplicateLabel(4))
        ));
        assert_eq!(node.label_field, 0);
    }

    #[test]
    fn test_owner_mismatch_is_corrupt() {
        let (store, _dir) = create_label_store();
        let head = store.write_long_array(&[99, 1, 2]).unwrap();

        let mut node = NodeRecord::created(5);
        node.label_field = DYNAMIC_LABELS_FLAG | head;
        let err = NodeLabels::parse(&node).get(&store).unwrap_err();
        assert!(err.is_corrupt());
    }
}
