//! Record id to page arithmetic
//!
//! Records never straddle pages: a store's file page size is always a whole
//! multiple of its record size (see [`file_page_size`]), so record `n` sits
//! at byte `n * record_size` of the record area.

/// Page size actually used by a store: `page_size` truncated to whole records
pub fn file_page_size(page_size: usize, record_size: usize) -> usize {
    page_size - page_size % record_size
}

/// Number of records on one page; remainder bytes are padding
pub fn records_per_page(page_size: usize, record_size: usize) -> usize {
    page_size / record_size
}

/// First usable record id on `page_id`, skipping reserved low ids
pub fn first_record_on_page(
    page_id: u64,
    page_size: usize,
    record_size: usize,
    reserved_low_ids: u64,
) -> u64 {
    let per_page = records_per_page(page_size, record_size) as u64;
    reserved_low_ids.max(page_id * per_page)
}

/// Page holding record `id`
pub fn page_id_for_record(id: u64, page_size: usize, record_size: usize) -> u64 {
    (id * record_size as u64) / page_size as u64
}

/// Byte offset of record `id` within its page
pub fn offset_for_id(id: u64, page_size: usize, record_size: usize) -> usize {
    ((id * record_size as u64) % page_size as u64) as usize
}
