//! The double-buffered `GlobalHeader` (spec.md §4.4 commit protocol), grounded
//! on the teacher's `recovery/wasp/manifest.rs::{Manifest, WaspFile}` A/B slot
//! scheme: two fixed slots at the start of the file, each holding one
//! generation of the header; commit always writes the *other* slot, then the
//! reader picks whichever slot has the higher revision and a valid checksum.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::codec::primitives::{Reader, Writer};
use crate::error::{MavibotError, Result};
use crate::page_store::NO_PAGE;

const MAGIC: u32 = 0x4d41_5649; // "MAVI"
const FORMAT_VERSION: u32 = 1;

/// The root of the whole database: revision number, free-list head, and the
/// roots of the two catalog trees (tree-of-trees and copied-pages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeader {
    pub magic: u32,
    pub format_version: u32,
    pub page_size: u32,
    pub revision: u64,
    pub free_list_head: i64,
    pub tree_of_trees_root: i64,
    pub copied_pages_root: i64,
    pub txn_counter: u64,
}

impl GlobalHeader {
    #[must_use]
    pub fn new_empty(page_size: u32) -> Self {
        Self {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            page_size,
            revision: 0,
            free_list_head: crate::page_store::FREE_LIST_END,
            tree_of_trees_root: NO_PAGE,
            copied_pages_root: NO_PAGE,
            txn_counter: 0,
        }
    }

    /// Packs the header per spec.md §6's fixed big-endian layout: magic(4),
    /// format_version(4), page_size(4), revision(8), free_list_head(8),
    /// tree_of_trees_root(8), copied_pages_root(8), txn_counter(8).
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(self.magic)
            .u32(self.format_version)
            .u32(self.page_size)
            .u64(self.revision)
            .i64(self.free_list_head)
            .i64(self.tree_of_trees_root)
            .i64(self.copied_pages_root)
            .u64(self.txn_counter);
        w.into_vec()
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        Ok(Self {
            magic: r.u32()?,
            format_version: r.u32()?,
            page_size: r.u32()?,
            revision: r.u64()?,
            free_list_head: r.i64()?,
            tree_of_trees_root: r.i64()?,
            copied_pages_root: r.i64()?,
            txn_counter: r.u64()?,
        })
    }
}

/// Manages the two on-disk `GlobalHeader` slots.
#[derive(Debug)]
pub struct HeaderSlots {
    slot_size: u64,
    /// Which slot (0 or 1) holds the currently-active header.
    active_slot: u8,
}

impl HeaderSlots {
    /// Reads both slots from `file` and returns the one with the highest
    /// valid revision, or a fresh empty header if neither slot is valid
    /// (a brand new file).
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn open(file: &mut std::fs::File, page_size: u32) -> Result<(Self, GlobalHeader)> {
        let slot_size = u64::from(page_size);
        let candidates: Vec<Option<(GlobalHeader, u32)>> = (0..2)
            .map(|slot: u64| Self::read_slot(file, slot_size, slot))
            .collect();

        match (candidates[0].clone(), candidates[1].clone()) {
            (Some((h0, _)), Some((h1, _))) => {
                let (slot, header) = if h1.revision > h0.revision { (1u8, h1) } else { (0u8, h0) };
                Ok((Self { slot_size, active_slot: slot }, header))
            }
            (Some((h0, _)), None) => Ok((Self { slot_size, active_slot: 0 }, h0)),
            (None, Some((h1, _))) => Ok((Self { slot_size, active_slot: 1 }, h1)),
            (None, None) => {
                let header = GlobalHeader::new_empty(page_size);
                let mut slots = Self { slot_size, active_slot: 1 };
                slots.write(file, &header)?;
                Ok((slots, header))
            }
        }
    }

    /// Reads one slot, returning the decoded header only if its stored CRC32
    /// matches the payload bytes (a torn or never-written slot yields `None`).
    fn read_slot(
        file: &mut std::fs::File,
        slot_size: u64,
        slot: u64,
    ) -> Option<(GlobalHeader, u32)> {
        let mut buf = vec![0u8; slot_size as usize];
        file.seek(SeekFrom::Start(slot * slot_size)).ok()?;
        file.read_exact(&mut buf).ok()?;
        let stored_checksum = u32::from_be_bytes(buf[0..4].try_into().ok()?);
        let len = u32::from_be_bytes(buf[4..8].try_into().ok()?) as usize;
        if 8 + len > buf.len() {
            return None;
        }
        let payload = &buf[8..8 + len];
        if crc32fast::hash(payload) != stored_checksum {
            return None;
        }
        let header = GlobalHeader::from_bytes(payload).ok()?;
        Some((header, stored_checksum))
    }

    /// Writes `header` into the slot that is *not* currently active, then
    /// flips `active_slot` to it. The previously-active slot is left intact
    /// as the prior, still-valid generation until this call returns; after
    /// this call it becomes the stale generation.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn write(&mut self, file: &mut std::fs::File, header: &GlobalHeader) -> Result<()> {
        let target_slot = if self.active_slot == 0 { 1u64 } else { 0u64 };
        let payload = header.to_bytes();
        let checksum = crc32fast::hash(&payload);

        let mut buf = vec![0u8; self.slot_size as usize];
        buf[0..4].copy_from_slice(&checksum.to_be_bytes());
        buf[4..8].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        let cap = buf.len() - 8;
        if payload.len() > cap {
            return Err(MavibotError::Corruption(
                "global header does not fit in one page".to_string(),
            ));
        }
        buf[8..8 + payload.len()].copy_from_slice(&payload);

        file.seek(SeekFrom::Start(target_slot * self.slot_size))?;
        file.write_all(&buf)?;
        file.sync_data()?;
        self.active_slot = target_slot as u8;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_file_yields_empty_header() {
        let f = NamedTempFile::new().unwrap();
        let mut file = std::fs::OpenOptions::new().read(true).write(true).open(f.path()).unwrap();
        file.set_len(2 * 512).unwrap();
        let (_, header) = HeaderSlots::open(&mut file, 512).unwrap();
        assert_eq!(header.revision, 0);
        assert_eq!(header.tree_of_trees_root, NO_PAGE);
    }

    #[test]
    fn write_then_reopen_picks_latest_revision() {
        let f = NamedTempFile::new().unwrap();
        let mut file = std::fs::OpenOptions::new().read(true).write(true).open(f.path()).unwrap();
        file.set_len(2 * 512).unwrap();
        let (mut slots, mut header) = HeaderSlots::open(&mut file, 512).unwrap();
        header.revision = 1;
        header.tree_of_trees_root = 3;
        slots.write(&mut file, &header).unwrap();

        header.revision = 2;
        header.tree_of_trees_root = 7;
        slots.write(&mut file, &header).unwrap();

        let (_, reopened) = HeaderSlots::open(&mut file, 512).unwrap();
        assert_eq!(reopened.revision, 2);
        assert_eq!(reopened.tree_of_trees_root, 7);
    }
}
