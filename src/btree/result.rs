//! Flat tagged result variants for insert/delete (spec.md §4.3, §9 "Class
//! hierarchies for result types ... recast as a flat tagged variant").

/// Outcome of an insert at one level of the tree.
#[derive(Debug)]
pub enum InsertResult {
    /// Key present, duplicates disallowed, value already equal: nothing changed.
    Exists,
    /// Key present and value differs, or key absent and the leaf had room.
    Modified { new_page: i64, previous_value: Option<Vec<u8>> },
    /// The leaf or node overflowed and was split in two.
    Split { pivot: Vec<u8>, left_page: i64, right_page: i64 },
}

/// Outcome of a delete at one level of the tree.
#[derive(Debug)]
pub enum DeleteResult {
    NotPresent,
    /// Removed without underflowing; `new_left_most` is set when the removed
    /// key was the leaf's leftmost, so the parent pivot can be refreshed.
    Remove { new_page: i64, removed: Vec<u8>, new_left_most: Option<Vec<u8>> },
    BorrowedFromLeft { new_page: i64, new_sibling: i64, removed: Vec<u8> },
    BorrowedFromRight { new_page: i64, new_sibling: i64, removed: Vec<u8> },
    Merged { new_page: i64, removed: Vec<u8> },
}
