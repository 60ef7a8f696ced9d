use thiserror::Error;

use super::types::{FrameId, PageId};

/// Errors surfaced by the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {0} not found")]
    PageNotFound(PageId),

    #[error("frame {0} not found")]
    FrameNotFound(FrameId),

    #[error("buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("failed to evict page")]
    EvictionFailed,

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("key not found")]
    KeyNotFound,

    #[error("B+ tree page is corrupted: {0}")]
    TreeCorrupted(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
