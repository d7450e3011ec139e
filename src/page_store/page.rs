//! Sentinels and per-page framing constants (spec.md §4.1, §6).

/// The null page reference, and the "free list is empty" marker.
pub const NO_PAGE: i64 = -1;
/// Terminator written into the `next` field of the last page on the free list.
pub const FREE_LIST_END: i64 = -2;
/// The first pending-id value a write transaction's working set hands out.
/// Anything `<= PENDING_BASE` is a staged page, not yet assigned a real offset.
pub const PENDING_BASE: i64 = -3;

/// 8-byte next pointer, plus (first page of a record only) a 4-byte length prefix.
pub const CONT_PAGE_OVERHEAD: usize = 8;
pub const FIRST_PAGE_OVERHEAD: usize = CONT_PAGE_OVERHEAD + 4;

#[must_use]
pub const fn is_real_offset(v: i64) -> bool {
    v >= 0
}

#[must_use]
pub const fn is_pending_id(v: i64) -> bool {
    v <= PENDING_BASE
}

/// Maps a pending id to its index in a write transaction's working set.
#[must_use]
pub const fn pending_index(v: i64) -> usize {
    (PENDING_BASE - v) as usize
}

/// Maps a working-set index back to the pending id that refers to it.
#[must_use]
pub const fn pending_id(index: usize) -> i64 {
    PENDING_BASE - index as i64
}

#[must_use]
pub const fn first_page_capacity(page_size: usize) -> usize {
    page_size - FIRST_PAGE_OVERHEAD
}

#[must_use]
pub const fn cont_page_capacity(page_size: usize) -> usize {
    page_size - CONT_PAGE_OVERHEAD
}

/// Number of physical pages needed to hold `nbytes` of record payload.
#[must_use]
pub fn pages_needed(page_size: usize, nbytes: usize) -> usize {
    let first_cap = first_page_capacity(page_size);
    if nbytes <= first_cap {
        return 1;
    }
    let remaining = nbytes - first_cap;
    let cont_cap = cont_page_capacity(page_size);
    1 + remaining.div_ceil(cont_cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_id_roundtrips() {
        for i in 0..10usize {
            let id = pending_id(i);
            assert!(is_pending_id(id));
            assert!(!is_real_offset(id));
            assert_eq!(pending_index(id), i);
        }
    }

    #[test]
    fn pages_needed_accounts_for_overhead() {
        let page_size = 512;
        assert_eq!(pages_needed(page_size, 1), 1);
        assert_eq!(pages_needed(page_size, first_page_capacity(page_size)), 1);
        assert_eq!(pages_needed(page_size, first_page_capacity(page_size) + 1), 2);
    }
}
