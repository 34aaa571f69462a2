//! Collaborators of the slow-sync engine.

use async_trait::async_trait;
use sync_types::{Cursor, SlowSyncStep, StepFailure, Version};
use thiserror::Error;

/// Fetches the server snapshot for one step and stores it locally.
#[async_trait]
pub trait SlowSyncStepRunner: Send + Sync {
    /// Run one step. Must replace (not merge) the local data it owns, so a
    /// step can be repeated safely.
    ///
    /// May return a cursor marking the newest event the fetched snapshot
    /// already reflects.
    async fn run(&self, step: SlowSyncStep) -> Result<Option<Cursor>, StepFailure>;

    /// Data version the server currently expects.
    async fn server_version(&self) -> Result<Version, StepFailure>;
}

/// Migration failure reported by a [`Migration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MigrationError(pub String);

/// One-time transformation of local data to a newer version.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Version local data is at once this migration ran.
    fn target_version(&self) -> Version;

    /// Transform local data.
    async fn run(&self) -> Result<(), MigrationError>;
}
