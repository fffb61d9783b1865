use thiserror::Error;

use crate::file::{FileError, PageId};

use super::SlotId;

/// Result type for heap-file operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors that can occur during heap-file operations
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record size mismatch: expected {expected}, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    #[error("Record size {0} does not fit in a page")]
    RecordTooLarge(usize),

    #[error("Invalid slot {1} on page {0}")]
    InvalidSlot(PageId, SlotId),

    #[error("Heap file header is corrupt: {0}")]
    BadHeader(String),
}
