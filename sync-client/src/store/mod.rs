//! Sync bookkeeping storage.
//!
//! Two narrow contracts over the account's persistent store:
//! - [`CursorStore`] holds the last applied event cursor
//! - [`SnapshotStore`] holds the staleness flag, the last slow-sync record
//!   and the locally applied migration version
//!
//! Both are written only by the active sync run. Other readers may see
//! slightly outdated values.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use sync_core::SnapshotRecord;
use sync_types::{Cursor, Version};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage of the last processed event cursor.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Read the stored cursor.
    async fn get(&self) -> Result<Option<Cursor>, StoreError>;

    /// Replace the stored cursor.
    async fn set(&self, cursor: &Cursor) -> Result<(), StoreError>;

    /// Forget the stored cursor.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Durable storage of snapshot bookkeeping.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Check the staleness flag.
    async fn is_stale(&self) -> Result<bool, StoreError>;

    /// Set the staleness flag; the next run performs a slow sync.
    async fn mark_stale(&self) -> Result<(), StoreError>;

    /// Clear the staleness flag.
    async fn clear_stale(&self) -> Result<(), StoreError>;

    /// Read the record of the last completed slow sync.
    async fn snapshot(&self) -> Result<Option<SnapshotRecord>, StoreError>;

    /// Replace the record of the last completed slow sync.
    async fn record_snapshot(&self, record: SnapshotRecord) -> Result<(), StoreError>;

    /// Version of the last applied local migration.
    async fn local_version(&self) -> Result<Version, StoreError>;

    /// Record the version local data has been migrated to.
    async fn set_local_version(&self, version: Version) -> Result<(), StoreError>;
}
