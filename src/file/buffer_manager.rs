use lru::LruCache;
use std::cell::{Ref, RefCell, RefMut};
use std::num::NonZeroUsize;
use std::rc::Rc;

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, PagedFileManager};
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_id: PageId,
}

/// A page frame in the buffer pool
struct Frame {
    /// The actual page data
    data: Vec<u8>,
    /// Whether this page has been modified since it was loaded
    dirty: bool,
}

/// A pinned page frame.
///
/// Holding a `PagePin` keeps the frame resident; dropping it releases the pin.
/// Because the release rides on `Drop`, a pin is returned exactly once on
/// every exit path, including early returns and panics. Writing through
/// [`PagePin::data_mut`] marks the frame dirty, so the page is written back
/// before eviction or at flush time.
pub struct PagePin {
    page_id: PageId,
    frame: Rc<RefCell<Frame>>,
}

impl PagePin {
    /// The id of the pinned page
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Shared access to the page bytes
    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.frame.borrow(), |f| f.data.as_slice())
    }

    /// Mutable access to the page bytes; marks the frame dirty
    pub fn data_mut(&self) -> RefMut<'_, [u8]> {
        let mut frame = self.frame.borrow_mut();
        frame.dirty = true;
        RefMut::map(frame, |f| f.data.as_mut_slice())
    }
}

/// Manages a buffer pool of page frames with LRU eviction.
///
/// Every lookup hands out a [`PagePin`]; a frame is evictable only while no
/// pin on it is alive. The pool and the recency order share one data
/// structure, so every operation hits a single hash table.
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Combined frame storage and LRU tracker
    pool: LruCache<BufferKey, Rc<RefCell<Frame>>>,
    /// Maximum number of frames
    capacity: usize,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, BUFFER_POOL_SIZE)
    }

    /// Create a new buffer manager with specified capacity
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        Self {
            file_manager,
            pool: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            capacity,
        }
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Pin a page into a frame, loading it from disk if necessary
    pub fn read_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<PagePin> {
        let key = BufferKey { file, page_id };

        if let Some(frame) = self.pool.get(&key) {
            return Ok(PagePin {
                page_id,
                frame: Rc::clone(frame),
            });
        }

        self.make_room()?;

        let mut data = vec![0u8; PAGE_SIZE];
        self.file_manager.read_page(file, page_id, &mut data)?;

        let frame = Rc::new(RefCell::new(Frame { data, dirty: false }));
        self.pool.put(key, Rc::clone(&frame));

        Ok(PagePin { page_id, frame })
    }

    /// Append a new page to the file and pin it. The frame starts dirty so
    /// the zeroed page reaches disk even if it is never written to.
    pub fn alloc_page(&mut self, file: FileHandle) -> FileResult<PagePin> {
        self.make_room()?;

        let page_id = self.file_manager.allocate_page(file)?;
        let frame = Rc::new(RefCell::new(Frame {
            data: vec![0u8; PAGE_SIZE],
            dirty: true,
        }));
        self.pool
            .put(BufferKey { file, page_id }, Rc::clone(&frame));

        Ok(PagePin { page_id, frame })
    }

    /// Write all dirty frames of a file to disk and sync it.
    ///
    /// Fails with [`FileError::PagePinned`] while any page of the file is
    /// still pinned.
    pub fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        let mut keys = Vec::new();
        for (key, frame) in self.pool.iter() {
            if key.file != file {
                continue;
            }
            if Rc::strong_count(frame) > 1 {
                return Err(FileError::PagePinned(key.page_id));
            }
            keys.push(*key);
        }

        for key in keys {
            // peek avoids reshuffling the recency order during a flush
            if let Some(frame) = self.pool.peek(&key) {
                let frame = Rc::clone(frame);
                let mut f = frame.borrow_mut();
                if f.dirty {
                    self.file_manager.write_page(key.file, key.page_id, &f.data)?;
                    f.dirty = false;
                }
            }
        }

        self.file_manager.sync_file(file)
    }

    /// Flush a file, drop its cached frames, and release the file handle
    pub fn close_file(&mut self, file: FileHandle) -> FileResult<()> {
        self.flush_file(file)?;

        let keys: Vec<BufferKey> = self
            .pool
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.pool.pop(&key);
        }

        self.file_manager.close_file(file)
    }

    /// Write every dirty frame to disk, pinned or not, and sync all files.
    /// Used on drop, where refusing would lose data.
    pub fn flush_all(&mut self) -> FileResult<()> {
        let keys: Vec<BufferKey> = self.pool.iter().map(|(key, _)| *key).collect();

        for key in keys {
            if let Some(frame) = self.pool.peek(&key) {
                let frame = Rc::clone(frame);
                let mut f = frame.borrow_mut();
                if f.dirty {
                    self.file_manager.write_page(key.file, key.page_id, &f.data)?;
                    f.dirty = false;
                }
            }
        }

        self.file_manager.sync_all()
    }

    /// Evict the least recently used unpinned frame if the pool is full
    fn make_room(&mut self) -> FileResult<()> {
        if self.pool.len() < self.capacity {
            return Ok(());
        }

        // Pinned frames rotate to the most-recent end and are skipped; after
        // one full pass without an unpinned frame the pool is exhausted.
        for _ in 0..self.pool.len() {
            let (key, frame) = self.pool.pop_lru().expect("pool is non-empty");

            if Rc::strong_count(&frame) > 1 {
                self.pool.put(key, frame);
                continue;
            }

            let dirty = frame.borrow().dirty;
            if dirty {
                let write_result = self
                    .file_manager
                    .write_page(key.file, key.page_id, &frame.borrow().data);
                if let Err(e) = write_result {
                    // keep the frame on failure so the data is not lost
                    self.pool.put(key, frame);
                    return Err(e);
                }
            }
            return Ok(());
        }

        Err(FileError::BufferPoolFull)
    }

    /// Get the number of frames currently in the pool
    pub fn buffer_pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Check if a page is resident in the pool
    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.pool.contains(&BufferKey { file, page_id })
    }

    /// Number of outstanding pins on a page
    pub fn pin_count(&self, file: FileHandle, page_id: PageId) -> usize {
        self.pool
            .peek(&BufferKey { file, page_id })
            .map(|frame| Rc::strong_count(frame) - 1)
            .unwrap_or(0)
    }

    /// Number of pages of a file with at least one outstanding pin
    pub fn pinned_page_count(&self, file: FileHandle) -> usize {
        self.pool
            .iter()
            .filter(|(key, frame)| key.file == file && Rc::strong_count(frame) > 1)
            .count()
    }

    /// Get the number of dirty frames in the pool
    pub fn dirty_page_count(&self) -> usize {
        self.pool
            .iter()
            .filter(|(_, frame)| frame.borrow().dirty)
            .count()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Best effort: push remaining dirty frames to disk
        let _ = self.flush_all();
    }
}
