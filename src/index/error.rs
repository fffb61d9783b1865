use thiserror::Error;

use crate::file::FileError;
use crate::record::RecordError;

use super::serialization::DataType;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations.
///
/// `NoSuchKeyFound` and `ScanNotInitialized` are expected control signals of
/// the scan protocol rather than failures; scan exhaustion itself is not an
/// error at all but the `Ok(None)` arm of `scan_next`.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Existing index file {0} does not match the relation, byte offset, or key type")]
    BadIndexInfo(String),

    #[error("Scan operators must be GT or GTE for the low bound and LT or LTE for the high bound")]
    BadOpcodes,

    #[error("Invalid scan range: low value exceeds high value")]
    BadScanrange,

    #[error("No key in the index satisfies the scan range")]
    NoSuchKeyFound,

    #[error("No scan is in progress")]
    ScanNotInitialized,

    #[error("Unsupported key type: {0:?}")]
    UnsupportedKeyType(DataType),

    #[error("Key at byte offset {offset} is out of bounds for a {record_len}-byte record")]
    KeyOutOfBounds { offset: usize, record_len: usize },

    #[error("Index metadata is corrupt: {0}")]
    CorruptMeta(String),
}
