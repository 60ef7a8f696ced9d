use std::collections::{HashMap, LinkedList};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StorageError, HEADER_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, WriteProxy};
use crate::storage::header_page::{HeaderPageMut, HeaderPageView};

use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    page_table: Mutex<HashMap<PageId, FrameId>>,
    free_list: Mutex<LinkedList<FrameId>>,
    replacer: LruKReplacer,
}

/// Fixed-size pool of in-memory page frames, backed by a [`DiskManager`]
/// through an asynchronous [`WriteProxy`], evicted under LRU-K.
///
/// Page 0 is reserved as the header page: this manager owns its
/// `allocate_count` field (the next page id to hand out), persisting it
/// only on `flush_all`/`Drop` rather than on every allocation. The header
/// page's `root_page_id` and `aux` fields belong to other collaborators
/// (the B+ tree index and external callers, respectively) and are never
/// touched here.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    write_proxy: Arc<WriteProxy>,
    disk_manager: Arc<DiskManager>,
    next_page_id: AtomicI32,
}

impl BufferPoolManager {
    /// Builds a pool of `pool_size` frames with the given LRU-K `k`,
    /// restoring the page allocator's high-water mark from `disk_manager`'s
    /// header page if one already exists.
    pub fn new(pool_size: usize, k: usize, disk_manager: DiskManager) -> Self {
        let disk_manager = Arc::new(disk_manager);

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();
        for i in 0..pool_size {
            let frame_id = FrameId::new(i);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            page_table: Mutex::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: LruKReplacer::new(k, pool_size),
        });

        let next_page_id = if disk_manager.is_first_visit() {
            let mut data = [0u8; PAGE_SIZE];
            HeaderPageMut::new(&mut data).init();
            disk_manager
                .write_page(HEADER_PAGE_ID, &data)
                .expect("failed to initialize header page");
            HEADER_PAGE_ID.as_i32() + 1
        } else {
            let mut data = [0u8; PAGE_SIZE];
            disk_manager
                .read_page(HEADER_PAGE_ID, &mut data)
                .expect("failed to read header page");
            HEADER_PAGE_ID.as_i32() + 1 + HeaderPageView::new(&data).allocate_count()
        };

        let write_proxy = Arc::new(WriteProxy::new(Arc::clone(&disk_manager)));

        Self {
            pool_size,
            state,
            write_proxy,
            disk_manager,
            next_page_id: AtomicI32::new(next_page_id),
        }
    }

    /// True if the underlying database file did not exist before this
    /// pool's disk manager opened it.
    pub fn is_first_visit(&self) -> bool {
        self.disk_manager.is_first_visit()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let page_table = self.state.page_table.lock();
        page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Allocates a new page, pinned once on the caller's behalf. Returns
    /// [`StorageError::BufferPoolFull`] if no frame is free. The caller must
    /// [`Self::unpin_page`] it when done, or fetch a guard instead and let
    /// `Drop` do it; callers that want the guard up front should use
    /// [`Self::new_page_guarded`].
    pub fn new_page(&self) -> Result<PageId> {
        let (page_id, _frame_id) = self.new_page_pinned()?;
        Ok(page_id)
    }

    /// Allocates a new page and returns it already pinned behind a
    /// [`BasicPageGuard`], retrying instead of failing if the pool is
    /// momentarily full.
    pub fn new_page_guarded(&self) -> Result<(PageId, BasicPageGuard)> {
        loop {
            match self.new_page_pinned() {
                Ok((page_id, frame_id)) => {
                    let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
                    let guard =
                        BasicPageGuard::new(page_id, frame, Self::release_callback(&self.state));
                    return Ok((page_id, guard));
                }
                Err(StorageError::BufferPoolFull) => {
                    std::thread::yield_now();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pins `page_id` with no data latch. Retries on a momentarily full
    /// pool instead of failing.
    pub fn fetch_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch_pinned_retry(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(
            page_id,
            frame,
            Self::release_callback(&self.state),
        ))
    }

    /// Pins `page_id` and takes a read latch on its data. Retries on a
    /// momentarily full pool instead of failing.
    pub fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_pinned_retry(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Self::release_callback(&self.state)) })
    }

    /// Pins `page_id` and takes a write latch on its data. Retries on a
    /// momentarily full pool instead of failing.
    pub fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_pinned_retry(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, Self::release_callback(&self.state)) })
    }

    /// Manually unpins a page outside the guard lifecycle. Returns `false`
    /// if the page isn't currently resident.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let page_table = self.state.page_table.lock();
        if let Some(&frame_id) = page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if is_dirty {
                frame.set_dirty(true);
            }
            if let Some(0) = frame.unpin() {
                self.state.replacer.set_evictable(frame_id, true);
            }
            true
        } else {
            false
        }
    }

    /// Queues `page_id`'s current bytes for write-back and blocks until
    /// they land on disk. Returns `false` if the page isn't resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let page_table = self.state.page_table.lock();
        let Some(&frame_id) = page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        drop(page_table);

        self.write_proxy.write(page_id, &data);
        self.write_proxy.flush_all()?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every dirty page, then persists the page allocator's
    /// high-water mark into the header page.
    pub fn flush_all(&self) -> Result<()> {
        let dirty: Vec<(PageId, FrameId)> = {
            let page_table = self.state.page_table.lock();
            page_table
                .iter()
                .filter(|(_, &frame_id)| self.state.frames[frame_id.as_usize()].is_dirty())
                .map(|(&page_id, &frame_id)| (page_id, frame_id))
                .collect()
        };

        for &(page_id, frame_id) in &dirty {
            let frame = &self.state.frames[frame_id.as_usize()];
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.write_proxy.write(page_id, &data);
        }
        self.write_proxy.flush_all()?;
        for &(_, frame_id) in &dirty {
            self.state.frames[frame_id.as_usize()].set_dirty(false);
        }

        self.persist_allocate_count()
    }

    /// Removes a page from the pool and forgets its id. The page must be
    /// unpinned; page ids are never reused once allocated.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut page_table = self.state.page_table.lock();
        let Some(frame_id) = page_table.remove(&page_id) else {
            return Ok(false);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            page_table.insert(page_id, frame_id);
            return Err(StorageError::PageStillPinned(page_id));
        }

        frame.reset();
        drop(page_table);
        self.state.replacer.remove(frame_id);
        self.state.free_list.lock().push_back(frame_id);

        Ok(true)
    }

    fn new_page_pinned(&self) -> Result<(PageId, FrameId)> {
        let frame_id = self.get_free_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let page_id = self.allocate_page_id();

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.lock().insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok((page_id, frame_id))
    }

    fn fetch_pinned_retry(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }
        loop {
            match self.fetch_page_pinned(page_id) {
                Ok(frame_id) => return Ok(frame_id),
                Err(StorageError::BufferPoolFull) => {
                    std::thread::yield_now();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_page_pinned(&self, page_id: PageId) -> Result<FrameId> {
        {
            let page_table = self.state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                let frame = &self.state.frames[frame_id.as_usize()];
                frame.pin();
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, false);
                return Ok(frame_id);
            }
        }

        let frame_id = self.get_free_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.write_proxy.read(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        self.state.page_table.lock().insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    fn get_free_frame(&self) -> Result<FrameId> {
        {
            let mut free_list = self.state.free_list.lock();
            if let Some(frame_id) = free_list.pop_front() {
                return Ok(frame_id);
            }
        }

        if let Some(frame_id) = self.state.replacer.evict() {
            let frame = &self.state.frames[frame_id.as_usize()];
            let old_page_id = frame.page_id();

            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.write_proxy.write(old_page_id, &data);
            }

            self.state.page_table.lock().remove(&old_page_id);
            frame.reset();

            Ok(frame_id)
        } else {
            Err(StorageError::BufferPoolFull)
        }
    }

    fn allocate_page_id(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    fn persist_allocate_count(&self) -> Result<()> {
        let allocate_count =
            self.next_page_id.load(Ordering::SeqCst) - HEADER_PAGE_ID.as_i32() - 1;
        let mut guard = self.fetch_write(HEADER_PAGE_ID)?;
        HeaderPageMut::new(guard.data_mut()).set_allocate_count(allocate_count);
        drop(guard);
        self.flush_page(HEADER_PAGE_ID)?;
        Ok(())
    }

    fn release_callback(state: &Arc<BufferPoolState>) -> ReleaseCallback {
        let state = Arc::clone(state);
        Box::new(move |page_id, is_dirty| {
            let page_table = state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                let frame = &state.frames[frame_id.as_usize()];
                if is_dirty {
                    frame.set_dirty(true);
                }
                if let Some(0) = frame.unpin() {
                    state.replacer.set_evictable(frame_id, true);
                }
            }
        })
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}
