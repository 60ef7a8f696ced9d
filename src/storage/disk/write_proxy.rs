use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::common::{PageId, Result, PAGE_SIZE, WRITE_PROXY_IDLE_TIMEOUT_MS};

use super::disk_manager::DiskManager;

struct PendingWrite {
    data: Box<[u8; PAGE_SIZE]>,
    version: u64,
}

struct Shared {
    pending: Mutex<HashMap<PageId, PendingWrite>>,
    signal: Condvar,
    shutdown: AtomicBool,
}

/// Coalescing, asynchronous write-back in front of a [`DiskManager`].
///
/// Writes are buffered in a pending map keyed by page id and applied by a
/// single background thread. A page written twice before the writer catches
/// up is written to disk only once, with the latest bytes: callers never
/// observe torn or out-of-order writes to the same page because `read`
/// serves pending pages straight out of the map (read-your-writes).
///
/// Dropping the proxy blocks until every pending write has been flushed.
pub struct WriteProxy {
    disk_manager: Arc<DiskManager>,
    shared: Arc<Shared>,
    next_version: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl WriteProxy {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            let disk_manager = Arc::clone(&disk_manager);
            std::thread::Builder::new()
                .name("write-proxy".to_string())
                .spawn(move || Self::run(shared, disk_manager))
                .expect("failed to spawn write-proxy thread")
        };

        Self {
            disk_manager,
            shared,
            next_version: AtomicU64::new(1),
            worker: Some(worker),
        }
    }

    /// Queues `data` to be written to `page_id`, returning immediately.
    /// A later call for the same page before the writer drains it
    /// overwrites the pending bytes rather than issuing two disk writes.
    pub fn write(&self, page_id: PageId, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let mut boxed = Box::new([0u8; PAGE_SIZE]);
        boxed.copy_from_slice(data);

        let mut pending = self.shared.pending.lock();
        pending.insert(
            page_id,
            PendingWrite {
                data: boxed,
                version,
            },
        );
        drop(pending);

        self.shared.signal.notify_one();
    }

    /// Reads `page_id`, preferring a not-yet-flushed write over the copy on
    /// disk so callers always see their own latest write.
    pub fn read(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        {
            let pending = self.shared.pending.lock();
            if let Some(entry) = pending.get(&page_id) {
                data.copy_from_slice(entry.data.as_slice());
                return Ok(());
            }
        }

        self.disk_manager.read_page(page_id, data)
    }

    /// Blocks until every write queued before this call has reached disk.
    pub fn flush_all(&self) -> Result<()> {
        loop {
            let pending = self.shared.pending.lock();
            if pending.is_empty() {
                return Ok(());
            }
            drop(pending);
            self.shared.signal.notify_one();
            std::thread::yield_now();
        }
    }

    fn run(shared: Arc<Shared>, disk_manager: Arc<DiskManager>) {
        loop {
            let next = {
                let mut pending = shared.pending.lock();
                if pending.is_empty() {
                    if shared.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    let timed_out = shared
                        .signal
                        .wait_for(
                            &mut pending,
                            Duration::from_millis(WRITE_PROXY_IDLE_TIMEOUT_MS),
                        )
                        .timed_out();
                    if timed_out && pending.is_empty() && shared.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    continue;
                }

                // Snapshot without removing: a concurrent `read` must still
                // find this entry in the map while the write is in flight.
                let page_id = *pending.keys().next().unwrap();
                let entry = pending.get(&page_id).unwrap();
                (page_id, entry.version, entry.data.clone())
            };

            let (page_id, version, data) = next;
            let _ = disk_manager.write_page(page_id, data.as_slice());

            // Only erase the entry if nobody overwrote it while we were
            // writing; a version bump means a newer write is still pending
            // and must get its own trip to disk.
            let mut pending = shared.pending.lock();
            if let Some(entry) = pending.get(&page_id) {
                if entry.version == version {
                    pending.remove(&page_id);
                }
            }
        }
    }
}

impl Drop for WriteProxy {
    fn drop(&mut self) {
        let _ = self.flush_all();
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
