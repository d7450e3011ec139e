//! The paged file substrate (spec.md §4.1 `PageStore`), grounded on the
//! teacher's `recovery/wasp/tree.rs::{BlockAllocator, CowTree::write_page/read_page}`.
//!
//! Pages are fixed-size slots in a single file. The first two page-sized slots
//! are reserved for the `GlobalHeader` A/B pair; all page offsets handed out
//! by this module are relative to the end of that reservation.
//!
//! Physical layout of a page:
//! ```text
//! [ next: i64 BE ] [ len: u32 BE, first page of a record only ] [ payload ... ]
//! ```
//! `next` chains multi-page records together and, for a free page, points at
//! the next entry on the free list (or `FREE_LIST_END`).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{MavibotError, Result};
use crate::trace_event;

use super::page::{
    FREE_LIST_END, NO_PAGE, cont_page_capacity, first_page_capacity, pages_needed,
};

/// Number of reserved page-sized slots at the start of the file (the A/B
/// `GlobalHeader` pair).
pub const RESERVED_SLOTS: i64 = 2;

/// Fixed-size page file with an explicit free list.
///
/// The free-list head is intentionally *not* owned by this struct: it is part
/// of the enclosing write transaction's uncommitted state and is only
/// published when the caller writes a new `GlobalHeader` at commit. Every
/// method that mutates the free list therefore takes it as `&mut i64`.
#[derive(Debug)]
pub struct PageStore {
    file: File,
    page_size: usize,
}

impl PageStore {
    pub fn create(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        Ok(Self { file, page_size })
    }

    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, page_size })
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn slot_offset(&self, page_no: i64) -> u64 {
        ((RESERVED_SLOTS + page_no) as u64) * self.page_size as u64
    }

    fn read_raw_page(&mut self, page_no: i64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(self.slot_offset(page_no)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_raw_page(&mut self, page_no: i64, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.file.seek(SeekFrom::Start(self.slot_offset(page_no)))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn read_next_pointer(&mut self, page_no: i64) -> Result<i64> {
        let buf = self.read_raw_page(page_no)?;
        Ok(i64::from_be_bytes(buf[0..8].try_into().unwrap()))
    }

    /// Pops one page off the free list, returning its page number, or `None`
    /// if the list is exhausted.
    fn pop_free(&mut self, free_list_head: &mut i64) -> Result<Option<i64>> {
        if *free_list_head == FREE_LIST_END || *free_list_head == NO_PAGE {
            return Ok(None);
        }
        let page_no = *free_list_head;
        let next = self.read_next_pointer(page_no)?;
        *free_list_head = next;
        Ok(Some(page_no))
    }

    /// Pushes a single page onto the head of the free list.
    fn push_free(&mut self, free_list_head: &mut i64, page_no: i64) -> Result<()> {
        let mut buf = vec![0u8; self.page_size];
        buf[0..8].copy_from_slice(&(*free_list_head).to_be_bytes());
        self.write_raw_page(page_no, &buf)?;
        *free_list_head = page_no;
        Ok(())
    }

    /// Allocates `n` fresh page numbers, preferring the free list before
    /// extending the file.
    fn alloc_pages(&mut self, free_list_head: &mut i64, n: usize) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(p) = self.pop_free(free_list_head)? {
                out.push(p);
            } else {
                let len = self.file.metadata()?.len();
                let slot_size = self.page_size as u64;
                let reserved_bytes = RESERVED_SLOTS as u64 * slot_size;
                let used = len.saturating_sub(reserved_bytes);
                let next_page_no = used.div_ceil(slot_size) as i64;
                let new_len = self.slot_offset(next_page_no) + slot_size;
                self.file.set_len(new_len)?;
                out.push(next_page_no);
            }
        }
        Ok(out)
    }

    /// Allocates enough pages to hold `nbytes`, writes `bytes` across them in
    /// chained fashion, and returns the offset of the first page (the
    /// record's address).
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn allocate(&mut self, free_list_head: &mut i64, bytes: &[u8]) -> Result<i64> {
        let n = pages_needed(self.page_size, bytes.len());
        let pages = self.alloc_pages(free_list_head, n)?;
        self.write_chain(&pages, bytes)?;
        trace_event!("allocate nbytes={} pages={} head={}", bytes.len(), n, pages[0]);
        Ok(pages[0])
    }

    /// Overwrites the record whose first page is already `first_page` with
    /// new bytes. If the new content needs fewer or more pages than before,
    /// trailing pages are freed or new ones allocated; the first page's
    /// offset never changes, so existing references stay valid.
    ///
    /// # Errors
    /// Returns an error on I/O failure or if `first_page` does not chain the
    /// expected number of pages.
    pub fn rewrite(&mut self, free_list_head: &mut i64, first_page: i64, bytes: &[u8]) -> Result<()> {
        let old_chain = self.chain_pages(first_page)?;
        let needed = pages_needed(self.page_size, bytes.len());
        let mut pages = old_chain.clone();
        if pages.len() > needed {
            let extra: Vec<i64> = pages.split_off(needed);
            for p in extra {
                self.push_free(free_list_head, p)?;
            }
        } else if pages.len() < needed {
            let more = self.alloc_pages(free_list_head, needed - pages.len())?;
            pages.extend(more);
        }
        self.write_chain(&pages, bytes)?;
        Ok(())
    }

    /// Frees every page in the chain starting at `first_page`, pushing each
    /// onto the free list.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn free(&mut self, free_list_head: &mut i64, first_page: i64) -> Result<()> {
        let chain = self.chain_pages(first_page)?;
        for p in chain {
            self.push_free(free_list_head, p)?;
        }
        trace_event!("free head={}", first_page);
        Ok(())
    }

    /// Reads back the full record starting at `first_page`.
    ///
    /// # Errors
    /// Returns [`MavibotError::Corruption`] if the length prefix is
    /// inconsistent with the chain length, or an I/O error.
    pub fn read(&mut self, first_page: i64) -> Result<Vec<u8>> {
        let first_cap = first_page_capacity(self.page_size);
        let cont_cap = cont_page_capacity(self.page_size);

        let mut page_no = first_page;
        let buf = self.read_raw_page(page_no)?;
        let next = i64::from_be_bytes(buf[0..8].try_into().unwrap());
        let total_len = u32::from_be_bytes(buf[8..12].try_into().unwrap()) as usize;

        let mut out = Vec::with_capacity(total_len);
        let take = total_len.min(first_cap);
        out.extend_from_slice(&buf[12..12 + take]);
        let mut next_no = next;

        while out.len() < total_len {
            if next_no == NO_PAGE {
                return Err(MavibotError::Corruption(format!(
                    "record chain starting at {first_page} ended early"
                )));
            }
            page_no = next_no;
            let buf = self.read_raw_page(page_no)?;
            let next = i64::from_be_bytes(buf[0..8].try_into().unwrap());
            let remaining = total_len - out.len();
            let take = remaining.min(cont_cap);
            out.extend_from_slice(&buf[8..8 + take]);
            next_no = next;
        }
        Ok(out)
    }

    /// Returns the page numbers making up the record chain starting at
    /// `first_page`, in order.
    fn chain_pages(&mut self, first_page: i64) -> Result<Vec<i64>> {
        let mut out = vec![first_page];
        let mut next = self.read_next_pointer(first_page)?;
        while next != NO_PAGE {
            out.push(next);
            next = self.read_next_pointer(next)?;
        }
        Ok(out)
    }

    fn write_chain(&mut self, pages: &[i64], bytes: &[u8]) -> Result<()> {
        let first_cap = first_page_capacity(self.page_size);
        let cont_cap = cont_page_capacity(self.page_size);

        let mut buf = vec![0u8; self.page_size];
        let next0 = if pages.len() > 1 { pages[1] } else { NO_PAGE };
        buf[0..8].copy_from_slice(&next0.to_be_bytes());
        buf[8..12].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
        let take = bytes.len().min(first_cap);
        buf[12..12 + take].copy_from_slice(&bytes[0..take]);
        self.write_raw_page(pages[0], &buf)?;

        let mut written = take;
        for (i, &page_no) in pages.iter().enumerate().skip(1) {
            let mut buf = vec![0u8; self.page_size];
            let next = if i + 1 < pages.len() { pages[i + 1] } else { NO_PAGE };
            buf[0..8].copy_from_slice(&next.to_be_bytes());
            let remaining = bytes.len() - written;
            let take = remaining.min(cont_cap);
            buf[8..8 + take].copy_from_slice(&bytes[written..written + take]);
            self.write_raw_page(page_no, &buf)?;
            written += take;
        }
        Ok(())
    }

    /// Flushes file contents and metadata to stable storage.
    ///
    /// # Errors
    /// Returns an error if the underlying `sync_all` fails.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Direct access to the underlying file for `GlobalHeader` slot I/O.
    pub(crate) fn raw_file(&mut self) -> &mut File {
        &mut self.file
    }
}
