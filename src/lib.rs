pub mod file;
pub mod index;
pub mod record;

pub use file::{
    BUFFER_POOL_SIZE, BufferManager, FileHandle, PAGE_SIZE, PagePin, PageId, PagedFileManager,
};
pub use index::{BTreeIndex, DataType, IndexError, IndexResult, Operator};
pub use record::{HeapFile, HeapScan, RecordId, SlotId};
