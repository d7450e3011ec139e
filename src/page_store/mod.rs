//! The paged file substrate. See [`file::PageStore`] for the main entry point.

pub mod file;
pub mod page;

pub use file::PageStore;
pub use page::{FREE_LIST_END, NO_PAGE, is_pending_id, is_real_offset, pending_id, pending_index};
