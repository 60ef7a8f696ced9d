//! trackdb - the on-disk storage engine behind a train-ticketing backend.
//!
//! This crate owns the page-based file manager, the LRU-K buffer pool with
//! asynchronous write-back, and a concurrent B+ tree index. Domain entities
//! (trains, tickets, orders, waitlists) are external collaborators that talk
//! to this crate only through the buffer pool and B+ tree APIs; they are not
//! implemented here.
//!
//! # Architecture
//!
//! - **`storage::disk`**: `DiskManager` (positional page I/O over a single
//!   file) and `WriteProxy` (coalescing, asynchronous write-back with
//!   read-your-writes).
//! - **`buffer`**: `BufferPoolManager`, `LruKReplacer`, `FrameHeader`, and
//!   the RAII page guards (`BasicPageGuard`, `ReadPageGuard`,
//!   `WritePageGuard`).
//! - **`index`**: the disk-resident `BTree` with latch-crabbed search and
//!   guard-stacked insert/remove.
//! - **`page`**: generic tuple-page layouts (`TuplePage`, `LinkedTuplePage`,
//!   `DynamicTuplePage`) collaborators may overlay on page bytes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trackdb::buffer::BufferPoolManager;
//! use trackdb::storage::disk::DiskManager;
//!
//! let disk_manager = DiskManager::new("ticket.db").unwrap();
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let (page_id, mut guard) = bpm.new_page_guarded().unwrap();
//! guard.data_mut()[0] = 42;
//! drop(guard);
//!
//! bpm.flush_all().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod page;
pub mod storage;

pub use common::{PageId, Result, StorageError};
