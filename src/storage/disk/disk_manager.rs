use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// Positional read/write of fixed-size pages over a single file.
///
/// All seek+read and seek+write pairs go through one mutex so concurrent
/// callers never interleave the file cursor's motion. Every call issues its
/// own `seek` before touching the file; there is no shared cursor state.
pub struct DiskManager {
    file: Mutex<File>,
    db_path: PathBuf,
    first_visit: AtomicBool,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let existed = db_path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            first_visit: AtomicBool::new(!existed),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// True if the database file did not exist before this `open`.
    pub fn is_first_visit(&self) -> bool {
        self.first_visit.load(Ordering::Acquire)
    }

    /// Reads exactly one page. Reading past EOF yields zero bytes rather
    /// than an error, since a freshly allocated page reads as all-zero
    /// until something writes it.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = Self::offset_of(page_id);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes exactly one page. No explicit flush is issued here; durability
    /// across writes is the write proxy's concern.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = Self::offset_of(page_id);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Forces all previously issued writes to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    fn offset_of(page_id: PageId) -> u64 {
        page_id.as_i32() as u64 * PAGE_SIZE as u64
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_is_first_visit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dm = DiskManager::new(&db_path).unwrap();
        assert!(dm.is_first_visit());
        assert!(db_path.exists());
    }

    #[test]
    fn reopening_existing_file_is_not_first_visit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let _dm = DiskManager::new(&db_path).unwrap();
        }
        let dm2 = DiskManager::new(&db_path).unwrap();
        assert!(!dm2.is_first_visit());
    }

    #[test]
    fn read_write_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("rw.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(PageId::new(3), &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(3), &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn reading_past_eof_yields_zeros() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("sparse.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let mut data = [0xffu8; PAGE_SIZE];
        dm.read_page(PageId::new(5), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_order_allocation_leaves_holes_readable_as_zero() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("holes.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.write_page(PageId::new(2), &data).unwrap();

        let mut hole = [0xffu8; PAGE_SIZE];
        dm.read_page(PageId::new(1), &mut hole).unwrap();
        assert!(hole.iter().all(|&b| b == 0));

        dm.read_page(PageId::new(2), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 7));
    }

    #[test]
    fn persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        {
            let dm = DiskManager::new(&db_path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(PageId::new(0), &data).unwrap();
        }

        let dm = DiskManager::new(&db_path).unwrap();
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(0), &mut data).unwrap();
        assert_eq!(data[0], 123);
    }
}
