//! Page cache - file-backed pages for record store files
//!
//! Every store file gets one [`PagedFile`]: a bounded set of cached pages
//! with pin/unpin semantics and Clock (second-chance) eviction. Dirty pages
//! are written back when evicted and on [`PagedFile::flush`].
//!
//! # Layout
//!
//! The first `data_offset` bytes of the file belong to the store header and
//! are never paged; page `n` starts at `data_offset + n * page_size`. Pages
//! past the end of the file read as zeroes.
//!
//! Each page guards its bytes with its own `RwLock`, so a record-sized
//! read never observes half of a concurrent record-sized write.

use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Cached page of a store file
#[derive(Debug)]
pub struct Page {
    /// Page ID
    pub id: u64,
    /// Page bytes (page_size long)
    data: RwLock<Vec<u8>>,
    /// Dirty flag (needs flush to disk)
    dirty: AtomicU32,
    /// Pin count (number of active references)
    pin_count: AtomicU32,
    /// Reference bit for Clock algorithm
    reference_bit: AtomicU32,
}

impl Page {
    fn new(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            data: RwLock::new(data),
            dirty: AtomicU32::new(0),
            pin_count: AtomicU32::new(0),
            reference_bit: AtomicU32::new(1), // Newly loaded pages are "referenced"
        }
    }

    /// Check if page is dirty
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire) != 0
    }

    fn mark_dirty(&self) {
        self.dirty.store(1, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set
    fn take_dirty(&self) -> bool {
        self.dirty.swap(0, Ordering::AcqRel) != 0
    }

    /// Check if page is pinned
    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Unpin page, true if this was the last pin
    fn unpin(&self) -> bool {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        prev == 1
    }

    /// Get pin count
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    fn set_reference_bit(&self) {
        self.reference_bit.store(1, Ordering::Release);
    }

    /// Clear and get reference bit (for Clock algorithm)
    fn clear_reference_bit(&self) -> bool {
        self.reference_bit.swap(0, Ordering::AcqRel) != 0
    }
}

/// A page held in the cache for the lifetime of the guard
#[derive(Debug)]
pub struct PinnedPage {
    page: Arc<Page>,
}

impl PinnedPage {
    /// Page ID
    pub fn id(&self) -> u64 {
        self.page.id
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the page
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let data = self.page.data.read();
        let end = offset + buf.len();
        if end > data.len() {
            return Err(Error::page_cache(format!(
                "Read beyond page {}: offset={}, len={}, page_size={}",
                self.page.id,
                offset,
                buf.len(),
                data.len()
            )));
        }
        buf.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    /// Overwrite bytes starting at `offset` and mark the page dirty
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        {
            let mut data = self.page.data.write();
            let end = offset + bytes.len();
            if end > data.len() {
                return Err(Error::page_cache(format!(
                    "Write beyond page {}: offset={}, len={}, page_size={}",
                    self.page.id,
                    offset,
                    bytes.len(),
                    data.len()
                )));
            }
            data[offset..end].copy_from_slice(bytes);
        }
        self.page.mark_dirty();
        Ok(())
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        self.page.unpin();
    }
}

/// Page cache statistics
#[derive(Debug, Clone, Default)]
pub struct PageCacheStats {
    /// Total page accesses
    pub total_accesses: u64,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Pages evicted
    pub evictions: u64,
    /// Pages written back to the file
    pub flushes: u64,
    /// Current cache size
    pub cache_size: usize,
}

impl PageCacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

struct CacheState {
    /// Cache storage (page_id → Page)
    pages: HashMap<u64, Arc<Page>>,
    /// Maximum number of pages in cache
    capacity: usize,
    /// Clock hand position (for eviction)
    clock_hand: usize,
    /// Slots scanned by the clock hand
    page_list: Vec<Option<u64>>,
    stats: PageCacheStats,
}

/// One store file seen through a bounded page cache
pub struct PagedFile {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
    data_offset: u64,
    state: Mutex<CacheState>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("data_offset", &self.data_offset)
            .finish()
    }
}

impl PagedFile {
    /// Create or open a paged file
    ///
    /// # Arguments
    ///
    /// * `path` - Store file
    /// * `page_size` - Bytes per page
    /// * `capacity` - Maximum number of cached pages
    /// * `data_offset` - Header bytes that precede page 0
    pub fn open<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        capacity: usize,
        data_offset: u64,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::page_cache("Capacity must be > 0"));
        }
        if page_size == 0 {
            return Err(Error::page_cache("Page size must be > 0"));
        }

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_size,
            data_offset,
            state: Mutex::new(CacheState {
                pages: HashMap::with_capacity(capacity),
                capacity,
                clock_hand: 0,
                page_list: vec![None; capacity],
                stats: PageCacheStats::default(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether [`PagedFile::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pin a page, loading it from the file on a miss
    pub fn pin(&self, page_id: u64) -> Result<PinnedPage> {
        if self.is_closed() {
            return Err(Error::page_cache(format!(
                "{} is closed",
                self.path.display()
            )));
        }

        let mut state = self.state.lock();
        state.stats.total_accesses += 1;

        if let Some(page) = state.pages.get(&page_id) {
            let page = Arc::clone(page);
            state.stats.hits += 1;
            page.set_reference_bit();
            page.pin();
            return Ok(PinnedPage { page });
        }

        state.stats.misses += 1;

        if state.pages.len() >= state.capacity {
            self.evict_page(&mut state)?;
        }

        let data = self.load_page(page_id)?;
        let page = Arc::new(Page::new(page_id, data));
        page.pin();
        Self::insert_page(&mut state, Arc::clone(&page));

        Ok(PinnedPage { page })
    }

    fn insert_page(state: &mut CacheState, page: Arc<Page>) {
        let page_id = page.id;
        state.pages.insert(page_id, page);

        if let Some(slot) = state.page_list.iter().position(|p| p.is_none()) {
            state.page_list[slot] = Some(page_id);
        } else if state.clock_hand < state.page_list.len() {
            state.page_list[state.clock_hand] = Some(page_id);
        }

        state.stats.cache_size = state.pages.len();
    }

    /// Evict a page using the Clock algorithm
    fn evict_page(&self, state: &mut CacheState) -> Result<()> {
        let capacity = state.capacity;
        let max_iterations = capacity * 2;

        for _ in 0..max_iterations {
            let hand = state.clock_hand;
            state.clock_hand = (hand + 1) % capacity;

            let Some(page_id) = state.page_list[hand] else {
                continue;
            };
            let Some(page) = state.pages.get(&page_id).cloned() else {
                state.page_list[hand] = None;
                continue;
            };

            if page.is_pinned() || page.clear_reference_bit() {
                continue;
            }

            if page.is_dirty() {
                tracing::debug!(
                    file = %self.path.display(),
                    page_id,
                    "flushing dirty page on eviction"
                );
            }
            if self.write_back(&page)? {
                state.stats.flushes += 1;
            }

            state.pages.remove(&page_id);
            state.page_list[hand] = None;
            state.stats.evictions += 1;
            state.stats.cache_size = state.pages.len();
            return Ok(());
        }

        Err(Error::page_cache("All pages are pinned, cannot evict"))
    }

    fn page_position(&self, page_id: u64) -> u64 {
        self.data_offset + page_id * self.page_size as u64
    }

    fn load_page(&self, page_id: u64) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.page_size];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.page_position(page_id)))?;

        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(data)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let data = page.data.read();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.page_position(page.id)))?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Write a dirty page to the file, `false` if it was clean
    ///
    /// The dirty flag is cleared before copying so a concurrent write
    /// re-marks it, and restored when the write fails.
    fn write_back(&self, page: &Page) -> Result<bool> {
        if !page.take_dirty() {
            return Ok(false);
        }
        if let Err(e) = self.write_page(page) {
            page.mark_dirty();
            tracing::warn!(
                file = %self.path.display(),
                page_id = page.id,
                error = %e,
                "page write-back failed, page kept dirty"
            );
            return Err(e);
        }
        Ok(true)
    }

    /// Read the unpaged header bytes; missing bytes read as zero
    pub fn read_header(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;

        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(buf)
    }

    /// Overwrite the unpaged header bytes
    pub fn write_header(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > self.data_offset {
            return Err(Error::page_cache(format!(
                "Header of {} bytes overlaps page 0 at offset {}",
                bytes.len(),
                self.data_offset
            )));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)?;
        file.sync_data()?;
        Ok(())
    }

    /// Size of the file on disk in bytes
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Number of whole pages the file holds after its header
    pub fn page_count(&self) -> Result<u64> {
        let len = self.file_len()?;
        let body = len.saturating_sub(self.data_offset);
        Ok(body.div_ceil(self.page_size as u64))
    }

    /// Write back every dirty page and sync the file
    pub fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let dirty: Vec<Arc<Page>> = state
            .pages
            .values()
            .filter(|p| p.is_dirty())
            .cloned()
            .collect();

        for page in &dirty {
            if self.write_back(page)? {
                state.stats.flushes += 1;
            }
        }
        drop(state);

        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Flush and drop every cached page; later calls are no-ops
    pub fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.closed.store(true, Ordering::Release);

        let mut state = self.state.lock();
        state.pages.clear();
        state.page_list.iter_mut().for_each(|slot| *slot = None);
        state.stats.cache_size = 0;
        Ok(())
    }

    /// Check if page is in cache
    pub fn contains_page(&self, page_id: u64) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    /// Number of dirty cached pages
    pub fn dirty_count(&self) -> usize {
        self.state
            .lock()
            .pages
            .values()
            .filter(|p| p.is_dirty())
            .count()
    }

    /// Get statistics
    pub fn stats(&self) -> PageCacheStats {
        self.state.lock().stats.clone()
    }
}
