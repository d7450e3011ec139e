//! Crate-wide error type. One flat enum, no error hierarchy, no boxed trait
//! objects for the common cases.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MavibotError {
    #[error("key not found")]
    KeyNotFound,

    #[error("tree not found: {0}")]
    TreeNotFound(String),

    #[error("tree already managed: {0}")]
    TreeAlreadyManaged(String),

    #[error("duplicate value not allowed for this key")]
    DuplicateValueNotAllowed,

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("end of file: expected {expected} more bytes at offset {offset}")]
    EndOfFile { offset: i64, expected: usize },

    #[error("cursor error: {0}")]
    Cursor(&'static str),

    #[error("bad transaction state: {0}")]
    BadTransactionState(&'static str),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MavibotError>;

impl MavibotError {
    /// Whether this error is expected/recoverable (spec.md §7 propagation
    /// policy) and therefore must *not* poison the enclosing transaction.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound
                | Self::DuplicateValueNotAllowed
                | Self::EndOfFile { .. }
                | Self::Cursor(_)
        )
    }
}
