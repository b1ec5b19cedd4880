//! Record store contract and the generic store engine
//!
//! [`RecordStore`] is what every fixed-size store exposes. [`CommonStore`]
//! implements it once for any [`RecordFormat`]: it resolves ids to pages
//! through the page location arithmetic, moves bytes through the store's
//! [`PagedFile`], and keeps the id sequence in step with the records
//! written.

use crate::config::StoreConfig;
use crate::page_cache::{PageCacheStats, PagedFile};
use crate::storage::format::{RecordFormat, RecordLoad};
use crate::storage::header::{STORE_HEADER_SIZE, StoreHeader};
use crate::storage::id_generator::{IdGenerator, IdSequence};
use crate::storage::page_location::{
    file_page_size, offset_for_id, page_id_for_record, records_per_page,
};
use crate::storage::record::Record;
use crate::storage::visitor::RecordVisitor;
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Operations shared by every record store
pub trait RecordStore: Send + Sync {
    /// Record type held by the store
    type Record: Record;

    /// Type descriptor of the store file
    fn type_descriptor(&self) -> &'static str;

    /// Empty record for `id`
    fn new_record(&self, id: u64) -> Self::Record;

    /// Decode the in-use record at `id`
    ///
    /// Fails with [`Error::NotInUse`] when the id was freed and
    /// [`Error::CorruptRecord`] when the bytes are damaged.
    fn get_record(&self, id: u64) -> Result<Self::Record>;

    /// Every record making up the logical unit stored at `id`
    fn get_records(&self, id: u64) -> Result<Vec<Self::Record>> {
        Ok(vec![self.get_record(id)?])
    }

    /// Write the record to its slot
    fn update_record(&self, record: &Self::Record) -> Result<()>;

    /// Decode `id` whatever its state; recovery and consistency tooling only
    fn force_get_record(&self, id: u64) -> Result<Self::Record>;

    /// Write the record bypassing validation; recovery and consistency tooling only
    fn force_update_record(&self, record: &Self::Record) -> Result<()>;

    /// Whether the slot at `id` holds an in-use record
    fn is_in_use(&self, id: u64) -> Result<bool>;

    /// Allocate an id not used by any live record
    fn next_id(&self) -> Result<u64>;

    /// Exclusive upper bound of ever-allocated ids
    fn high_id(&self) -> u64;

    /// Overwrite the high id (recovery replay)
    fn set_high_id(&self, high_id: u64);

    /// Highest id that may be in use; never above `high_id() - 1`
    fn highest_possible_id_in_use(&self) -> Option<u64>;

    /// Ids excluded from allocation and iteration
    fn number_of_reserved_low_ids(&self) -> u64 {
        0
    }

    /// Bytes per record
    fn record_size(&self) -> usize;

    /// Records per page
    fn records_per_page(&self) -> usize;

    /// Dispatch `record` to this store's visitor branch
    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &Self::Record,
    ) -> std::result::Result<(), V::Error>;

    /// Make every written record durable
    fn flush(&self) -> Result<()>;

    /// Flush and release the store; idempotent
    fn close(&self) -> Result<()>;
}

/// Generic store engine parameterised by a record format
pub struct CommonStore<F: RecordFormat> {
    format: F,
    paged_file: PagedFile,
    ids: Arc<IdSequence>,
    page_size: usize,
    closed: AtomicBool,
}

impl<F: RecordFormat> std::fmt::Debug for CommonStore<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommonStore")
            .field("store", &self.format.type_descriptor())
            .field("path", &self.paged_file.path())
            .field("high_id", &self.ids.high_id())
            .finish()
    }
}

impl<F: RecordFormat> CommonStore<F> {
    /// Open (creating if needed) the store file at `path`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use recstore_core::config::StoreConfig;
    /// use recstore_core::storage::format::NodeFormat;
    /// use recstore_core::storage::record_store::{CommonStore, RecordStore};
    ///
    /// let nodes = CommonStore::open("./data/nodes.store", NodeFormat, &StoreConfig::default()).unwrap();
    /// let id = nodes.next_id().unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, format: F, config: &StoreConfig) -> Result<Self> {
        config.check_version_policy()?;
        let path = path.as_ref();
        let descriptor = format.type_descriptor();
        let record_size = format.record_size();
        if record_size == 0 || record_size > config.page_size {
            return Err(Error::invalid_config(format!(
                "{} records of {} bytes do not fit pages of {} bytes",
                descriptor, record_size, config.page_size
            )));
        }

        let page_size = file_page_size(config.page_size, record_size);
        let paged_file = PagedFile::open(
            path,
            page_size,
            config.page_cache_pages,
            STORE_HEADER_SIZE as u64,
        )?;

        match StoreHeader::decode(&paged_file.read_header(STORE_HEADER_SIZE)?)? {
            Some(header) => header.verify(descriptor, record_size, config.version_mismatch)?,
            None => {
                let header = StoreHeader::current(descriptor, record_size);
                paged_file.write_header(&header.encode()?)?;
                tracing::info!(store = descriptor, path = %path.display(), "created store file");
            }
        }

        let ids = Self::scan_id_space(&format, &paged_file, page_size)?;
        tracing::debug!(
            store = descriptor,
            high_id = ids.high_id(),
            free_ids = ids.free_count(),
            "opened store"
        );

        Ok(Self {
            format,
            paged_file,
            ids: Arc::new(ids),
            page_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Rebuild the id sequence: high id past the last in-use record, every
    /// unused slot below it free for reuse
    fn scan_id_space(format: &F, paged_file: &PagedFile, page_size: usize) -> Result<IdSequence> {
        let record_size = format.record_size();
        let per_page = records_per_page(page_size, record_size) as u64;
        let reserved = format.reserved_low_ids();

        let mut high_id = reserved;
        let mut unused = Vec::new();
        let mut page_bytes = vec![0u8; page_size];

        for page_id in 0..paged_file.page_count()? {
            paged_file.pin(page_id)?.read(0, &mut page_bytes)?;
            for slot in 0..per_page {
                let id = page_id * per_page + slot;
                if id < reserved {
                    continue;
                }
                let offset = slot as usize * record_size;
                if format.is_in_use(&page_bytes[offset..offset + record_size]) {
                    high_id = id + 1;
                } else {
                    unused.push(id);
                }
            }
        }

        Ok(IdSequence::rebuilt(
            format.type_descriptor(),
            reserved,
            format.max_id(),
            high_id,
            unused,
        ))
    }

    /// Record format of the store
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Id sequence of the store, shared with dynamic record allocators
    pub fn id_generator(&self) -> Arc<dyn IdGenerator> {
        self.ids.clone()
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        self.paged_file.path()
    }

    /// Page cache statistics of the store file
    pub fn page_cache_stats(&self) -> PageCacheStats {
        self.paged_file.stats()
    }

    /// Page size used by this store (whole records only)
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether [`RecordStore::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::StoreClosed(self.format.type_descriptor()));
        }
        Ok(())
    }

    fn check_addressable(&self, id: u64) -> Result<()> {
        if id > self.format.max_id() {
            return Err(Error::invalid_record(
                self.format.type_descriptor(),
                id,
                format!("id beyond max id {}", self.format.max_id()),
            ));
        }
        Ok(())
    }

    fn read_slot(&self, id: u64) -> Result<Vec<u8>> {
        self.check_open()?;
        self.check_addressable(id)?;

        let record_size = self.format.record_size();
        let mut bytes = vec![0u8; record_size];
        let page = self
            .paged_file
            .pin(page_id_for_record(id, self.page_size, record_size))?;
        page.read(offset_for_id(id, self.page_size, record_size), &mut bytes)?;
        Ok(bytes)
    }

    fn read_record(&self, id: u64, mode: RecordLoad) -> Result<F::Record> {
        let bytes = self.read_slot(id)?;
        if mode == RecordLoad::Normal && !self.format.is_in_use(&bytes) {
            return Err(Error::NotInUse {
                store: self.format.type_descriptor(),
                id,
            });
        }
        self.format.read(id, &bytes, mode)
    }

    fn write_record(&self, record: &F::Record, validate: bool) -> Result<()> {
        self.check_open()?;
        let id = record.id();
        self.check_addressable(id)?;
        if validate && id < self.format.reserved_low_ids() {
            return Err(Error::invalid_record(
                self.format.type_descriptor(),
                id,
                "reserved ids are not writable",
            ));
        }

        let record_size = self.format.record_size();
        let mut bytes = vec![0u8; record_size];
        self.format.write(record, &mut bytes)?;

        let page = self
            .paged_file
            .pin(page_id_for_record(id, self.page_size, record_size))?;
        page.write(offset_for_id(id, self.page_size, record_size), &bytes)?;
        drop(page);

        if record.in_use() {
            self.ids.mark_used(id);
        } else {
            self.ids.free_id(id);
        }
        Ok(())
    }
}

impl<F: RecordFormat> RecordStore for CommonStore<F> {
    type Record = F::Record;

    fn type_descriptor(&self) -> &'static str {
        self.format.type_descriptor()
    }

    fn new_record(&self, id: u64) -> F::Record {
        self.format.new_record(id)
    }

    fn get_record(&self, id: u64) -> Result<F::Record> {
        self.read_record(id, RecordLoad::Normal)
    }

    fn get_records(&self, id: u64) -> Result<Vec<F::Record>> {
        let mut records = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !visited.insert(current) {
                return Err(Error::corrupt(
                    self.type_descriptor(),
                    id,
                    format!("record chain loops back to {}", current),
                ));
            }
            let record = self.get_record(current).map_err(|e| match e {
                Error::NotInUse { .. } if current != id => Error::corrupt(
                    self.type_descriptor(),
                    id,
                    format!("record chain points to unused record {}", current),
                ),
                Error::InvalidRecord { .. } if current != id => Error::corrupt(
                    self.type_descriptor(),
                    id,
                    format!("record chain points past max id to {}", current),
                ),
                other => other,
            })?;
            next = self.format.next_in_chain(&record);
            records.push(record);
        }

        Ok(records)
    }

    fn update_record(&self, record: &F::Record) -> Result<()> {
        self.write_record(record, true)
    }

    fn force_get_record(&self, id: u64) -> Result<F::Record> {
        self.read_record(id, RecordLoad::Force)
    }

    fn force_update_record(&self, record: &F::Record) -> Result<()> {
        self.write_record(record, false)
    }

    fn is_in_use(&self, id: u64) -> Result<bool> {
        let bytes = self.read_slot(id)?;
        Ok(self.format.is_in_use(&bytes))
    }

    fn next_id(&self) -> Result<u64> {
        self.check_open()?;
        self.ids.next_id()
    }

    fn high_id(&self) -> u64 {
        self.ids.high_id()
    }

    fn set_high_id(&self, high_id: u64) {
        self.ids.set_high_id(high_id);
    }

    fn highest_possible_id_in_use(&self) -> Option<u64> {
        self.ids.highest_possible_id_in_use()
    }

    fn number_of_reserved_low_ids(&self) -> u64 {
        self.format.reserved_low_ids()
    }

    fn record_size(&self) -> usize {
        self.format.record_size()
    }

    fn records_per_page(&self) -> usize {
        records_per_page(self.page_size, self.format.record_size())
    }

    fn accept<V: RecordVisitor>(
        &self,
        visitor: &mut V,
        record: &F::Record,
    ) -> std::result::Result<(), V::Error> {
        self.format.accept(visitor, record)
    }

    fn flush(&self) -> Result<()> {
        self.check_open()?;
        self.paged_file.flush()?;
        tracing::debug!(store = self.type_descriptor(), "flushed store");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        // Stays open when the final flush fails so close can be retried
        self.paged_file.close()?;
        self.closed.store(true, Ordering::Release);
        tracing::debug!(store = self.type_descriptor(), "closed store");
        Ok(())
    }
}

impl<F: RecordFormat> Drop for CommonStore<F> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(store = self.type_descriptor(), error = %e, "failed to close store on drop");
        }
    }
}
