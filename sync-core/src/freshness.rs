//! Local snapshot freshness.
//!
//! A run performs a slow sync unless the last completed one is recent,
//! recorded by the current slow-sync version, not flagged stale, and the
//! cursor it left behind is still stored. A slow sync that was not issued a
//! cursor is reusable without one: incremental sync then starts from the
//! beginning of the stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use sync_types::Version;

/// Bookkeeping written when a slow sync completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unix timestamp (seconds) of completion.
    pub completed_at_secs: u64,
    /// Slow-sync version that produced the snapshot.
    pub version: Version,
    /// Whether the server issued a cursor during that slow sync. Records
    /// written before this field existed assume it did.
    #[serde(default = "cursor_issued_default")]
    pub cursor_issued: bool,
}

fn cursor_issued_default() -> bool {
    true
}

/// Why a run needs a slow sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlowSyncReason {
    /// No slow sync ever completed on this account.
    NeverCompleted,
    /// The staleness flag is set (gap or unrecoverable failure).
    MarkedStale,
    /// The cursor issued by the last slow sync is gone.
    MissingCursor,
    /// The snapshot was produced by an older slow-sync version.
    OutdatedVersion {
        /// Version in the record.
        recorded: Version,
        /// Version this client requires.
        required: Version,
    },
    /// The snapshot is older than the configured maximum age.
    Expired {
        /// Age of the snapshot.
        age: Duration,
    },
}

impl fmt::Display for SlowSyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlowSyncReason::NeverCompleted => f.write_str("never completed"),
            SlowSyncReason::MarkedStale => f.write_str("local state marked stale"),
            SlowSyncReason::MissingCursor => f.write_str("no stored cursor"),
            SlowSyncReason::OutdatedVersion { recorded, required } => {
                write!(f, "snapshot version {} < {}", recorded, required)
            }
            SlowSyncReason::Expired { age } => {
                write!(f, "snapshot expired ({}s old)", age.as_secs())
            }
        }
    }
}

/// Thresholds for deciding whether a snapshot can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Snapshots older than this are refreshed.
    pub max_age: Duration,
    /// Snapshots recorded below this version are refreshed.
    pub required_version: Version,
}

impl FreshnessPolicy {
    /// Decide whether a slow sync is required.
    ///
    /// Returns `None` when the snapshot can be reused. Reasons are checked
    /// in a fixed order so the reported one is deterministic.
    pub fn evaluate(
        &self,
        record: Option<&SnapshotRecord>,
        stale: bool,
        has_cursor: bool,
        now_secs: u64,
    ) -> Option<SlowSyncReason> {
        let Some(record) = record else {
            return Some(SlowSyncReason::NeverCompleted);
        };
        if stale {
            return Some(SlowSyncReason::MarkedStale);
        }
        if record.cursor_issued && !has_cursor {
            return Some(SlowSyncReason::MissingCursor);
        }
        if record.version < self.required_version {
            return Some(SlowSyncReason::OutdatedVersion {
                recorded: record.version,
                required: self.required_version,
            });
        }
        // A clock that moved backwards counts as age zero.
        let age = Duration::from_secs(now_secs.saturating_sub(record.completed_at_secs));
        if age > self.max_age {
            return Some(SlowSyncReason::Expired { age });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy {
            max_age: Duration::from_secs(7 * DAY),
            required_version: 2,
        }
    }

    fn record(completed_at_secs: u64, version: Version) -> SnapshotRecord {
        SnapshotRecord {
            completed_at_secs,
            version,
            cursor_issued: true,
        }
    }

    #[test]
    fn fresh_snapshot_is_reused() {
        let rec = record(10 * DAY, 2);
        assert_eq!(policy().evaluate(Some(&rec), false, true, 11 * DAY), None);
    }

    #[test]
    fn missing_record_requires_slow_sync() {
        assert_eq!(
            policy().evaluate(None, false, true, 0),
            Some(SlowSyncReason::NeverCompleted)
        );
    }

    #[test]
    fn stale_flag_wins_over_freshness() {
        let rec = record(10 * DAY, 2);
        assert_eq!(
            policy().evaluate(Some(&rec), true, true, 10 * DAY),
            Some(SlowSyncReason::MarkedStale)
        );
    }

    #[test]
    fn missing_cursor_requires_slow_sync() {
        let rec = record(10 * DAY, 2);
        assert_eq!(
            policy().evaluate(Some(&rec), false, false, 10 * DAY),
            Some(SlowSyncReason::MissingCursor)
        );
    }

    #[test]
    fn snapshot_without_issued_cursor_is_reused() {
        let rec = SnapshotRecord {
            cursor_issued: false,
            ..record(10 * DAY, 2)
        };
        assert_eq!(policy().evaluate(Some(&rec), false, false, 10 * DAY), None);
    }

    #[test]
    fn record_without_cursor_flag_assumes_cursor_was_issued() {
        let rec: SnapshotRecord =
            serde_json::from_str(r#"{"completed_at_secs": 100, "version": 2}"#).unwrap();
        assert!(rec.cursor_issued);
    }

    #[test]
    fn outdated_version_requires_slow_sync() {
        let rec = record(10 * DAY, 1);
        assert_eq!(
            policy().evaluate(Some(&rec), false, true, 10 * DAY),
            Some(SlowSyncReason::OutdatedVersion {
                recorded: 1,
                required: 2
            })
        );
    }

    #[test]
    fn expired_snapshot_requires_slow_sync() {
        let rec = record(DAY, 2);
        let reason = policy().evaluate(Some(&rec), false, true, 9 * DAY);
        assert_eq!(
            reason,
            Some(SlowSyncReason::Expired {
                age: Duration::from_secs(8 * DAY)
            })
        );
    }

    #[test]
    fn clock_skew_does_not_expire() {
        let rec = record(10 * DAY, 2);
        assert_eq!(policy().evaluate(Some(&rec), false, true, 0), None);
    }
}
