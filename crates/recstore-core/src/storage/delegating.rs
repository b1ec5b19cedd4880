//! Pass-through record store
//!
//! [`DelegatingRecordStore`] forwards every call to the wrapped store
//! synchronously and one to one. Wrappers adding instrumentation or access
//! checks embed it and override only what they need.

use crate::Result;
use crate::storage::record_store::RecordStore;
use crate::storage::visitor::RecordVisitor;

/// Record store forwarding to an inner store
#[derive(Debug)]
pub struct DelegatingRecordStore<S> {
    inner: S,
}

impl<S: RecordStore> DelegatingRecordStore<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwrap
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: RecordStore> RecordStore for DelegatingRecordStore<S> {
    type Record = S::Record;

    fn type_descriptor(&self) -> &'static str {
        self.inner.type_descriptor()
    }

    fn new_record(&self, id: u64) -> S::Record {
        self.inner.new_record(id)
    }

    fn get_record(&self, id: u64) -> Result<S::Record> {
        self.inner.get_record(id)
    }

    fn get_records(&self, id: u64) -> Result<Vec<S::Record>> {
        self.inner.get_records(id)
    }

    fn update_record(&self, record: &S::Record) -> Result<()> {
        self.inner.update_record(record)
    }

    fn force_get_record(&self, id: u64) -> Result<S::Record> {
        self.inner.force_get_record(id)
    }

    fn force_update_record(&self, record: &S::Record) -> Result<()> {
        self.inner.force_update_record(record)
    }

    fn is_in_use(&self, id: u64) -> Result<bool> {
        self.inner.is_in_use(id)
    }

    fn next_id(&self) -> Result<u64> {
        self.inner.next_id()
    }

    fn high_id(&self) -> u64 {
        self.inner.high_id()
    }

    fn set_high_id(&self, high_id: u64) {
        self.inner.set_high_id(high_id)
    }

    fn highest_possible_id_in_use(&self) -> Option<u64> {
        self.inner.highest_possible_id_in_use()
    }

    fn number_of_reserved_low_ids(&self) -> u64 {
        self.inner.number_of_reserved_low_ids()
    }

    fn record_size(&self) -> usize {
        self.inner.record_size()
    }

    fn records_per_page(&self) -> usize {
        self.inner.records_per_page()
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &S::Record,
    ) -> std::result::Result<(), V::Error> {
        self.inner.accept(visitor, record)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
