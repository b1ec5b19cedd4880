//! Token stores
//!
//! A token is a named id: a label, a relationship type or a property key.
//! The token record holds the head of the name's chain in a companion
//! string store. Names are unique per store; the name to id index lives in
//! memory and is rebuilt from a forward id scan when the store opens.

use crate::config::StoreConfig;
use crate::storage::dynamic::DynamicStore;
use crate::storage::format::{DynamicFormat, DynamicKind, TokenFormat, TokenKind};
use crate::storage::id_iterator::StoreIdIterator;
use crate::storage::record::TokenRecord;
use crate::storage::record_store::{CommonStore, RecordStore};
use crate::storage::visitor::RecordVisitor;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;

/// Token store with its name store and name index
pub struct TokenStore {
    kind: TokenKind,
    tokens: CommonStore<TokenFormat>,
    names: DynamicStore,
    index: RwLock<HashMap<String, u64>>,
    create_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("kind", &self.kind)
            .field("tokens", &self.index.read().len())
            .finish()
    }
}

impl TokenStore {
    /// Open the token store at `path` and its name store at `names_path`
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        path: P,
        names_path: Q,
        kind: TokenKind,
        config: &StoreConfig,
    ) -> Result<Self> {
        let tokens = CommonStore::open(path, TokenFormat::new(kind), config)?;
        let names = DynamicStore::open_dynamic(
            names_path,
            DynamicFormat::new(
                DynamicKind::String,
                kind.name_descriptor(),
                config.token_name_block_size,
            )?,
            config,
        )?;

        let store = Self {
            kind,
            tokens,
            names,
            index: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        };
        store.rebuild_index()?;
        Ok(store)
    }

    fn rebuild_index(&self) -> Result<()> {
        let mut index = HashMap::new();
        for id in StoreIdIterator::forward(&self.tokens) {
            if !self.tokens.is_in_use(id)? {
                continue;
            }
            let record = self.tokens.get_record(id)?;
            let name = self.names.read_string(record.name_id)?;
            if let Some(previous) = index.insert(name.clone(), id) {
                tracing::warn!(
                    kind = self.kind.name(),
                    name = %name,
                    previous,
                    id,
                    "duplicate token name, keeping the higher id"
                );
            }
        }

        tracing::debug!(kind = self.kind.name(), tokens = index.len(), "loaded token index");
        *self.index.write() = index;
        Ok(())
    }

    /// Token kind of the store
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Companion name store
    pub fn name_store(&self) -> &DynamicStore {
        &self.names
    }

    /// Create a token named `name`
    ///
    /// Fails with [`Error::TokenExists`] when the name is taken.
    pub fn create_token(&self, name: &str, internal: bool) -> Result<u64> {
        let _guard = self.create_lock.lock();
        if self.index.read().contains_key(name) {
            return Err(Error::TokenExists {
                kind: self.kind.name(),
                name: name.to_string(),
            });
        }
        self.insert_token(name, internal)
    }

    /// Id of the token named `name`, creating it if needed
    pub fn get_or_create_token(&self, name: &str) -> Result<u64> {
        if let Some(id) = self.token_id(name) {
            return Ok(id);
        }

        let _guard = self.create_lock.lock();
        if let Some(id) = self.token_id(name) {
            return Ok(id);
        }
        self.insert_token(name, false)
    }

    fn insert_token(&self, name: &str, internal: bool) -> Result<u64> {
        let id = self.tokens.next_id()?;
        let name_id = self.names.write_string(name)?;

        let mut record = TokenRecord::new(id);
        record.in_use = true;
        record.created = true;
        record.internal = internal;
        record.name_id = name_id;
        self.tokens.update_record(&record)?;

        self.index.write().insert(name.to_string(), id);
        tracing::debug!(kind = self.kind.name(), name, id, "created token");
        Ok(id)
    }

    /// Bring the name index in line with a record written to the token store
    ///
    /// A record going out of use drops its name. An in-use record maps its
    /// current name to its id, replacing whatever the id was known under.
    fn sync_index(&self, record: &TokenRecord) {
        let name = if record.in_use {
            match self.names.read_string(record.name_id) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(
                        kind = self.kind.name(),
                        id = record.id,
                        error = %e,
                        "token name unreadable, dropped from index"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut index = self.index.write();
        index.retain(|_, id| *id != record.id);
        if let Some(name) = name {
            index.insert(name, record.id);
        }
    }

    /// Id of the token named `name`
    pub fn token_id(&self, name: &str) -> Option<u64> {
        self.index.read().get(name).copied()
    }

    /// Name of token `id`
    pub fn token_name(&self, id: u64) -> Result<String> {
        let record = self.tokens.get_record(id)?;
        self.names.read_string(record.name_id)
    }

    /// Every token as `(id, name)`, ordered by id
    pub fn tokens(&self) -> Vec<(u64, String)> {
        let mut tokens: Vec<(u64, String)> = self
            .index
            .read()
            .iter()
            .map(|(name, &id)| (id, name.clone()))
            .collect();
        tokens.sort();
        tokens
    }
}

impl RecordStore for TokenStore {
    type Record = TokenRecord;

    fn type_descriptor(&self) -> &'static str {
        self.tokens.type_descriptor()
    }

    fn new_record(&self, id: u64) -> TokenRecord {
        self.tokens.new_record(id)
    }

    fn get_record(&self, id: u64) -> Result<TokenRecord> {
        self.tokens.get_record(id)
    }

    fn update_record(&self, record: &TokenRecord) -> Result<()> {
        self.tokens.update_record(record)?;
        self.sync_index(record);
        Ok(())
    }

    fn force_get_record(&self, id: u64) -> Result<TokenRecord> {
        self.tokens.force_get_record(id)
    }

    fn force_update_record(&self, record: &TokenRecord) -> Result<()> {
        self.tokens.force_update_record(record)?;
        self.sync_index(record);
        Ok(())
    }

    fn is_in_use(&self, id: u64) -> Result<bool> {
        self.tokens.is_in_use(id)
    }

    fn next_id(&self) -> Result<u64> {
        self.tokens.next_id()
    }

    fn high_id(&self) -> u64 {
        self.tokens.high_id()
    }

    fn set_high_id(&self, high_id: u64) {
        self.tokens.set_high_id(high_id)
    }

    fn highest_possible_id_in_use(&self) -> Option<u64> {
        self.tokens.highest_possible_id_in_use()
    }

    fn number_of_reserved_low_ids(&self) -> u64 {
        self.tokens.number_of_reserved_low_ids()
    }

    fn record_size(&self) -> usize {
        self.tokens.record_size()
    }

    fn records_per_page(&self) -> usize {
        self.tokens.records_per_page()
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &TokenRecord,
    ) -> std::result::Result<(), V::Error> {
        self.tokens.accept(visitor, record)
    }

    fn flush(&self) -> Result<()> {
        self.names.flush()?;
        self.tokens.flush()
    }

    fn close(&self) -> Result<()> {
        self.names.close()?;
        self.tokens.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, kind: TokenKind) -> TokenStore {
        TokenStore::open(
            dir.path().join("tokens.store"),
            dir.path().join("tokens.names.store"),
            kind,
            &StoreConfig::small(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::Label);

        let person = store.create_token("Person", false).unwrap();
        let company = store.create_token("Company", false).unwrap();
        assert_eq!((person, company), (0, 1));
        assert_eq!(store.token_id("Person"), Some(0));
        assert_eq!(store.token_id("Missing"), None);
        assert_eq!(store.token_name(company).unwrap(), "Company");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::RelationshipType);
        store.create_token("KNOWS", false).unwrap();
        assert!(matches!(
            store.create_token("KNOWS", false),
            Err(Error::TokenExists { kind: "RelationshipType", .. })
        ));
        assert_eq!(store.get_or_create_token("KNOWS").unwrap(), 0);
        assert_eq!(store.get_or_create_token("LIKES").unwrap(), 1);
    }

    #[test]
    fn test_long_names_span_blocks() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::PropertyKey);
        let name = "a_rather_long_property_key_name_spanning_several_blocks";
        let id = store.create_token(name, true).unwrap();

        let record = store.get_record(id).unwrap();
        assert!(record.internal);
        assert!(store.name_store().get_records(record.name_id).unwrap().len() > 1);
        assert_eq!(store.token_name(id).unwrap(), name);
    }

    #[test]
    fn test_index_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir, TokenKind::Label);
            for name in ["A", "B", "C"] {
                store.create_token(name, false).unwrap();
            }
            let mut deleted = store.get_record(1).unwrap();
            deleted.in_use = false;
            store.update_record(&deleted).unwrap();
            store.close().unwrap();
        }

        let store = open(&dir, TokenKind::Label);
        assert_eq!(
            store.tokens(),
            vec![(0, "A".to_string()), (2, "C".to_string())]
        );
        assert_eq!(store.token_id("B"), None);
    }

    #[test]
    fn test_deleted_token_leaves_index() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::Label);
        store.create_token("A", false).unwrap();
        let b = store.create_token("B", false).unwrap();

        let mut deleted = store.get_record(b).unwrap();
        deleted.in_use = false;
        store.update_record(&deleted).unwrap();

        assert_eq!(store.token_id("B"), None);
        assert_eq!(store.tokens(), vec![(0, "A".to_string())]);
        assert!(store.token_name(b).unwrap_err().is_not_in_use());

        // The name is free again and gets a fresh token
        let again = store.create_token("B", false).unwrap();
        assert_eq!(store.token_id("B"), Some(again));
        assert_eq!(store.token_name(again).unwrap(), "B");
    }

    #[test]
    fn test_forced_writes_keep_index_in_sync() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::PropertyKey);
        let id = store.create_token("name", false).unwrap();

        let mut record = store.force_get_record(id).unwrap();
        record.in_use = false;
        store.force_update_record(&record).unwrap();
        assert_eq!(store.token_id("name"), None);

        // Replaying the record back in restores the mapping
        record.in_use = true;
        store.force_update_record(&record).unwrap();
        assert_eq!(store.token_id("name"), Some(id));
        assert_eq!(store.tokens(), vec![(id, "name".to_string())]);
    }

    #[test]
    fn test_accept_uses_kind_branch() {
        struct Kinds(Vec<&'static str>);

        impl RecordVisitor for Kinds {
            type Error = ();

            fn process_label_token(&mut self, _: &TokenRecord) -> std::result::Result<(), ()> {
                self.0.push("label");
                Ok(())
            }

            fn process_relationship_type_token(
                &mut self,
                _: &TokenRecord,
            ) -> std::result::Result<(), ()> {
                self.0.push("type");
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let store = open(&dir, TokenKind::RelationshipType);
        let id = store.create_token("KNOWS", false).unwrap();
        let record = store.get_record(id).unwrap();

        let mut kinds = Kinds(vec![]);
        store.accept(&mut kinds, &record).unwrap();
        assert_eq!(kinds.0, vec!["type"]);
    }

    #[test]
    fn test_concurrent_get_or_create() {
        use std::sync::Arc;
        use std::thread;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(&dir, TokenKind::PropertyKey));
        let mut handles = vec![];

        for _ in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                (0..20)
                    .map(|i| store.get_or_create_token(&format!("key{}", i)).unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.tokens().len(), 20);
    }
}
