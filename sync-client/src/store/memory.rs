//! In-memory store for tests and simulations.
//!
//! Records every cursor write for verification and supports failure
//! injection.

use super::{CursorStore, SnapshotStore, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sync_core::SnapshotRecord;
use sync_types::{Cursor, Version};

/// In-memory store.
///
/// Clones share state, so a test can keep one handle while the sync core
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    cursor: Option<Cursor>,
    cursor_writes: Vec<Cursor>,
    stale: bool,
    snapshot: Option<SnapshotRecord>,
    local_version: Version,
    fail_next_cursor_write: Option<String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a cursor.
    pub fn with_cursor(cursor: Cursor) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().cursor = Some(cursor);
        store
    }

    /// Seed a snapshot record.
    pub fn seed_snapshot(&self, record: SnapshotRecord) {
        self.inner.lock().unwrap().snapshot = Some(record);
    }

    /// Seed the local migration version.
    pub fn seed_local_version(&self, version: Version) {
        self.inner.lock().unwrap().local_version = version;
    }

    /// Current cursor, without going through the async trait.
    pub fn cursor(&self) -> Option<Cursor> {
        self.inner.lock().unwrap().cursor.clone()
    }

    /// Every cursor written, in write order.
    pub fn cursor_writes(&self) -> Vec<Cursor> {
        self.inner.lock().unwrap().cursor_writes.clone()
    }

    /// Current staleness flag.
    pub fn stale(&self) -> bool {
        self.inner.lock().unwrap().stale
    }

    /// Current snapshot record.
    pub fn snapshot_record(&self) -> Option<SnapshotRecord> {
        self.inner.lock().unwrap().snapshot
    }

    /// Current local migration version.
    pub fn version(&self) -> Version {
        self.inner.lock().unwrap().local_version
    }

    /// Cause the next cursor write to fail with the given error.
    pub fn fail_next_cursor_write(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_cursor_write = Some(error.to_string());
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get(&self) -> Result<Option<Cursor>, StoreError> {
        Ok(self.inner.lock().unwrap().cursor.clone())
    }

    async fn set(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_cursor_write.take() {
            return Err(StoreError::Unavailable(error));
        }
        inner.cursor = Some(cursor.clone());
        inner.cursor_writes.push(cursor.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().cursor = None;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn is_stale(&self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().stale)
    }

    async fn mark_stale(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().stale = true;
        Ok(())
    }

    async fn clear_stale(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().stale = false;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self.inner.lock().unwrap().snapshot)
    }

    async fn record_snapshot(&self, record: SnapshotRecord) -> Result<(), StoreError> {
        self.inner.lock().unwrap().snapshot = Some(record);
        Ok(())
    }

    async fn local_version(&self) -> Result<Version, StoreError> {
        Ok(self.inner.lock().unwrap().local_version)
    }

    async fn set_local_version(&self, version: Version) -> Result<(), StoreError> {
        self.inner.lock().unwrap().local_version = version;
        Ok(())
    }
}
