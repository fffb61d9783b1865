//! Fixed-width-record heap file

use crate::file::{BufferManager, FileHandle, PAGE_SIZE, PageId};

use super::error::{RecordError, RecordResult};
use super::{RecordId, SlotId};

/// Magic tag on the heap header page: "HEAP" in ASCII
const MAGIC_NUMBER: u32 = 0x48454150;

/// Bytes reserved at the start of each data page
const DATA_PAGE_HEADER: usize = 8;

/// A heap file of fixed-size records.
///
/// Page 0 holds the file header (magic tag and record size); data pages
/// follow from page 1, each a small occupancy header plus densely packed
/// records. Records are only ever appended.
pub struct HeapFile {
    file: FileHandle,
    name: String,
    record_size: usize,
    slots_per_page: usize,
    /// Last data page, 0 while the file has none
    last_page_id: PageId,
}

impl HeapFile {
    /// Create a new heap file for records of the given size
    pub fn create(
        buffer_mgr: &mut BufferManager,
        path: &str,
        record_size: usize,
    ) -> RecordResult<Self> {
        if record_size == 0 || record_size > PAGE_SIZE - DATA_PAGE_HEADER {
            return Err(RecordError::RecordTooLarge(record_size));
        }

        buffer_mgr.file_manager_mut().create_file(path)?;
        let file = buffer_mgr.file_manager_mut().open_file(path)?;

        let header = buffer_mgr.alloc_page(file)?;
        debug_assert_eq!(header.page_id(), 0);
        {
            let mut data = header.data_mut();
            data[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
            data[4..8].copy_from_slice(&(record_size as u32).to_le_bytes());
        }

        Ok(Self {
            file,
            name: path.to_string(),
            record_size,
            slots_per_page: (PAGE_SIZE - DATA_PAGE_HEADER) / record_size,
            last_page_id: 0,
        })
    }

    /// Open an existing heap file
    pub fn open(buffer_mgr: &mut BufferManager, path: &str) -> RecordResult<Self> {
        let file = buffer_mgr.file_manager_mut().open_file(path)?;

        let record_size = {
            let header = buffer_mgr.read_page(file, 0)?;
            let data = header.data();
            let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            if magic != MAGIC_NUMBER {
                return Err(RecordError::BadHeader(format!(
                    "bad magic number {magic:#010x}"
                )));
            }
            u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize
        };

        if record_size == 0 || record_size > PAGE_SIZE - DATA_PAGE_HEADER {
            return Err(RecordError::BadHeader(format!(
                "record size {record_size} does not fit in a page"
            )));
        }

        let page_count = buffer_mgr.file_manager_mut().page_count(file)?;

        Ok(Self {
            file,
            name: path.to_string(),
            record_size,
            slots_per_page: (PAGE_SIZE - DATA_PAGE_HEADER) / record_size,
            last_page_id: page_count.saturating_sub(1),
        })
    }

    /// The file path, which doubles as the relation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of every record in this file
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Append a record, returning its id
    pub fn insert_record(
        &mut self,
        buffer_mgr: &mut BufferManager,
        record: &[u8],
    ) -> RecordResult<RecordId> {
        if record.len() != self.record_size {
            return Err(RecordError::RecordSizeMismatch {
                expected: self.record_size,
                actual: record.len(),
            });
        }

        // Reuse the last page while it has room, otherwise start a new one
        let pin = if self.last_page_id != 0 {
            let pin = buffer_mgr.read_page(self.file, self.last_page_id)?;
            let used = page_used(&pin.data());
            if used < self.slots_per_page {
                pin
            } else {
                drop(pin);
                let pin = buffer_mgr.alloc_page(self.file)?;
                self.last_page_id = pin.page_id();
                pin
            }
        } else {
            let pin = buffer_mgr.alloc_page(self.file)?;
            self.last_page_id = pin.page_id();
            pin
        };

        let mut data = pin.data_mut();
        let slot = page_used(&data);
        let offset = DATA_PAGE_HEADER + slot * self.record_size;
        data[offset..offset + self.record_size].copy_from_slice(record);
        set_page_used(&mut data, slot + 1);

        Ok(RecordId::new(pin.page_id(), slot as SlotId))
    }

    /// Fetch the record addressed by `rid`
    pub fn get_record(
        &self,
        buffer_mgr: &mut BufferManager,
        rid: RecordId,
    ) -> RecordResult<Vec<u8>> {
        if rid.page_number == 0 || rid.page_number > self.last_page_id {
            return Err(RecordError::InvalidSlot(rid.page_number, rid.slot_number));
        }

        let pin = buffer_mgr.read_page(self.file, rid.page_number)?;
        let data = pin.data();

        let slot = rid.slot_number as usize;
        if slot >= page_used(&data) {
            return Err(RecordError::InvalidSlot(rid.page_number, rid.slot_number));
        }

        let offset = DATA_PAGE_HEADER + slot * self.record_size;
        Ok(data[offset..offset + self.record_size].to_vec())
    }

    /// A scanner over every record in the file, in storage order.
    ///
    /// The scanner keeps its own position and borrows the buffer manager only
    /// per call, so the caller can interleave other page accesses.
    pub fn scan(&self) -> HeapScan {
        HeapScan {
            file: self.file,
            record_size: self.record_size,
            last_page_id: self.last_page_id,
            current_page: 1,
            current_slot: 0,
        }
    }
}

/// Cursor over the records of a [`HeapFile`]
pub struct HeapScan {
    file: FileHandle,
    record_size: usize,
    last_page_id: PageId,
    current_page: PageId,
    current_slot: usize,
}

impl HeapScan {
    /// Yield the next record, or `None` once the file is exhausted
    pub fn next(
        &mut self,
        buffer_mgr: &mut BufferManager,
    ) -> RecordResult<Option<(RecordId, Vec<u8>)>> {
        loop {
            if self.last_page_id == 0 || self.current_page > self.last_page_id {
                return Ok(None);
            }

            let pin = buffer_mgr.read_page(self.file, self.current_page)?;
            let data = pin.data();

            if self.current_slot >= page_used(&data) {
                drop(data);
                self.current_page += 1;
                self.current_slot = 0;
                continue;
            }

            let offset = DATA_PAGE_HEADER + self.current_slot * self.record_size;
            let record = data[offset..offset + self.record_size].to_vec();
            let rid = RecordId::new(self.current_page, self.current_slot as SlotId);
            self.current_slot += 1;

            return Ok(Some((rid, record)));
        }
    }
}

fn page_used(data: &[u8]) -> usize {
    u16::from_le_bytes([data[0], data[1]]) as usize
}

fn set_page_used(data: &mut [u8], used: usize) {
    data[0..2].copy_from_slice(&(used as u16).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, BufferManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_manager = PagedFileManager::new();
        (temp_dir, BufferManager::new(file_manager))
    }

    fn make_record(i: u32, size: usize) -> Vec<u8> {
        let mut record = vec![0u8; size];
        record[0..4].copy_from_slice(&i.to_le_bytes());
        record
    }

    #[test]
    fn test_insert_and_get() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        let mut heap = HeapFile::create(&mut bm, &path, 16).unwrap();

        let rid = heap.insert_record(&mut bm, &make_record(7, 16)).unwrap();
        assert_eq!(rid, RecordId::new(1, 0));

        let record = heap.get_record(&mut bm, rid).unwrap();
        assert_eq!(record, make_record(7, 16));
    }

    #[test]
    fn test_record_size_mismatch() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        let mut heap = HeapFile::create(&mut bm, &path, 16).unwrap();
        let result = heap.insert_record(&mut bm, &[0u8; 8]);
        assert!(matches!(result, Err(RecordError::RecordSizeMismatch { .. })));
    }

    #[test]
    fn test_scan_spans_pages() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        // Large records so a handful of inserts crosses a page boundary
        let record_size = 2048;
        let mut heap = HeapFile::create(&mut bm, &path, record_size).unwrap();

        let count = 10u32;
        let mut rids = Vec::new();
        for i in 0..count {
            rids.push(
                heap.insert_record(&mut bm, &make_record(i, record_size))
                    .unwrap(),
            );
        }
        assert!(rids.iter().any(|rid| rid.page_number > 1));

        let mut scan = heap.scan();
        let mut seen = 0u32;
        while let Some((rid, record)) = scan.next(&mut bm).unwrap() {
            assert_eq!(rid, rids[seen as usize]);
            assert_eq!(record, make_record(seen, record_size));
            seen += 1;
        }
        assert_eq!(seen, count);
    }

    #[test]
    fn test_scan_empty_file() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        let heap = HeapFile::create(&mut bm, &path, 16).unwrap();
        let mut scan = heap.scan();
        assert!(scan.next(&mut bm).unwrap().is_none());
    }

    #[test]
    fn test_reopen() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        let mut rids = Vec::new();
        {
            let mut heap = HeapFile::create(&mut bm, &path, 32).unwrap();
            for i in 0..100u32 {
                rids.push(heap.insert_record(&mut bm, &make_record(i, 32)).unwrap());
            }
        }
        bm.flush_all().unwrap();

        let heap = HeapFile::open(&mut bm, &path).unwrap();
        assert_eq!(heap.record_size(), 32);
        for (i, rid) in rids.iter().enumerate() {
            let record = heap.get_record(&mut bm, *rid).unwrap();
            assert_eq!(record, make_record(i as u32, 32));
        }
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("relA").display().to_string();

        bm.file_manager_mut().create_file(&path).unwrap();
        let handle = bm.file_manager_mut().open_file(&path).unwrap();
        bm.file_manager_mut()
            .write_page(handle, 0, &vec![0xffu8; PAGE_SIZE])
            .unwrap();
        bm.close_file(handle).unwrap();

        let result = HeapFile::open(&mut bm, &path);
        assert!(matches!(result, Err(RecordError::BadHeader(_))));
    }
}
