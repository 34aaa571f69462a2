//! JSON file store.
//!
//! Keeps the whole bookkeeping document in memory and rewrites the file on
//! every change. Each write goes to a uniquely named temp file in the same
//! directory, is flushed to disk and then renamed over the document, so a
//! crash mid-write leaves the previous document intact.
//!
//! An update runs to completion on the blocking pool while holding the
//! state lock, even if the caller stops waiting for it. The file on disk
//! therefore always matches the in-memory copy once the lock is free.

use super::{CursorStore, SnapshotStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_core::SnapshotRecord;
use sync_types::{Cursor, Version};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// On-disk document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cursor: Option<Cursor>,
    #[serde(default)]
    stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot: Option<SnapshotRecord>,
    #[serde(default)]
    local_version: Version,
}

/// Durable store backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Arc<Mutex<PersistedState>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty document if the file does
    /// not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Opened sync store at {}", path.display());
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` and persist the result. The in-memory copy is only
    /// replaced once the file write succeeded.
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut PersistedState) + Send + 'static,
    {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut next = state.clone();
            change(&mut next);
            if next == *state {
                return Ok(());
            }
            write_atomic(&path, &next)?;
            *state = next;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store write task failed: {}", e)))?
    }
}

fn write_atomic(path: &Path, state: &PersistedState) -> Result<(), StoreError> {
    let contents = serde_json::to_vec_pretty(state)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Make the rename itself durable.
    #[cfg(unix)]
    std::fs::File::open(dir)?.sync_all()?;

    Ok(())
}

#[async_trait]
impl CursorStore for JsonFileStore {
    async fn get(&self) -> Result<Option<Cursor>, StoreError> {
        Ok(self.state.lock().await.cursor.clone())
    }

    async fn set(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let cursor = cursor.clone();
        self.update(move |s| s.cursor = Some(cursor)).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update(|s| s.cursor = None).await
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn is_stale(&self) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.stale)
    }

    async fn mark_stale(&self) -> Result<(), StoreError> {
        self.update(|s| s.stale = true).await
    }

    async fn clear_stale(&self) -> Result<(), StoreError> {
        self.update(|s| s.stale = false).await
    }

    async fn snapshot(&self) -> Result<Option<SnapshotRecord>, StoreError> {
        Ok(self.state.lock().await.snapshot)
    }

    async fn record_snapshot(&self, record: SnapshotRecord) -> Result<(), StoreError> {
        self.update(move |s| s.snapshot = Some(record)).await
    }

    async fn local_version(&self) -> Result<Version, StoreError> {
        Ok(self.state.lock().await.local_version)
    }

    async fn set_local_version(&self, version: Version) -> Result<(), StoreError> {
        self.update(move |s| s.local_version = version).await
    }
}
