//! Failure taxonomies for convo-sync.
//!
//! Each component reports a single tagged union so callers handle every
//! case exhaustively.

use thiserror::Error;

use crate::ids::Version;

/// Failure of a single slow-sync step or migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    /// The request never reached the server or timed out.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with an error.
    #[error("server rejected request: {reason}")]
    ServerRejection {
        /// Server-provided explanation.
        reason: String,
        /// Whether the rejection is transient (e.g. 5xx, rate limit).
        retryable: bool,
    },

    /// Writing the fetched snapshot locally failed.
    #[error("local storage failure: {0}")]
    LocalStorage(String),

    /// The server speaks an API version this client cannot handle.
    #[error("unsupported server version: {0}")]
    UnsupportedServerVersion(String),

    /// A data migration failed.
    #[error("migration to version {version} failed: {reason}")]
    Migration {
        /// Target version of the failed migration.
        version: Version,
        /// What went wrong.
        reason: String,
    },
}

impl StepFailure {
    /// Whether retrying the slow sync later can be expected to help.
    pub fn can_retry(&self) -> bool {
        match self {
            StepFailure::Network(_) => true,
            StepFailure::ServerRejection { retryable, .. } => *retryable,
            StepFailure::LocalStorage(_) => true,
            StepFailure::UnsupportedServerVersion(_) => false,
            StepFailure::Migration { .. } => false,
        }
    }
}

/// Failure applying one event during incremental sync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingFailure {
    /// The event is bad on its own (malformed, duplicate, unknown
    /// conversation). Skip it and continue.
    #[error("recoverable processing failure: {0}")]
    Recoverable(String),

    /// Local state can no longer be trusted (crypto engine or storage
    /// failure). Abort the session.
    #[error("unrecoverable processing failure: {0}")]
    Unrecoverable(String),
}

impl ProcessingFailure {
    /// Check if the failure only affects the current event.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessingFailure::Recoverable(_))
    }
}

/// Cause carried by a `Failed` sync status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    /// Slow sync aborted.
    #[error("slow sync failed: {0}")]
    SlowSync(#[source] StepFailure),

    /// The incremental session hit an unrecoverable failure.
    #[error("incremental sync failed: {0}")]
    Incremental(String),

    /// Local sync bookkeeping (cursor, staleness flag) could not be read
    /// or written.
    #[error("sync store failure: {0}")]
    Store(String),
}

impl SyncFailure {
    /// Whether retrying can be expected to help.
    pub fn can_retry(&self) -> bool {
        match self {
            SyncFailure::SlowSync(step) => step.can_retry(),
            SyncFailure::Incremental(_) => true,
            SyncFailure::Store(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StepFailure::Migration {
            version: 6,
            reason: "column missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration to version 6 failed: column missing"
        );
    }

    #[test]
    fn server_rejection_retryability_follows_flag() {
        let transient = StepFailure::ServerRejection {
            reason: "503".into(),
            retryable: true,
        };
        let definitive = StepFailure::ServerRejection {
            reason: "403".into(),
            retryable: false,
        };
        assert!(transient.can_retry());
        assert!(!definitive.can_retry());
    }

    #[test]
    fn incremental_failures_are_retryable() {
        assert!(SyncFailure::Incremental("decryption failed".into()).can_retry());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StepFailure>();
        assert_send_sync::<ProcessingFailure>();
        assert_send_sync::<SyncFailure>();
    }
}
