//! Observable sync state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncFailure;

/// Resource classes fetched during a slow sync, in execution order.
///
/// The derived `Ord` is the execution order: later steps reference
/// entities populated by earlier ones (members need their conversations,
/// one-on-one resolution needs contacts, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowSyncStep {
    /// Pre-sync local data migrations.
    Migration,
    /// The self user's profile.
    SelfUser,
    /// Team/server feature configuration.
    FeatureFlags,
    /// Advertise the protocols this client supports.
    UpdateSupportedProtocols,
    /// Conversation list and metadata.
    Conversations,
    /// Connection requests.
    Connections,
    /// Conversation memberships.
    Members,
    /// The self user's team.
    SelfTeam,
    /// Known users.
    Contacts,
    /// Join MLS groups the client is not yet part of.
    JoiningMlsConversations,
    /// Pick a protocol for each one-on-one conversation.
    ResolveOneOnOneProtocols,
    /// Legal-hold status.
    LegalHold,
}

impl SlowSyncStep {
    /// Every step, in execution order.
    pub const ALL: [SlowSyncStep; 12] = [
        SlowSyncStep::Migration,
        SlowSyncStep::SelfUser,
        SlowSyncStep::FeatureFlags,
        SlowSyncStep::UpdateSupportedProtocols,
        SlowSyncStep::Conversations,
        SlowSyncStep::Connections,
        SlowSyncStep::Members,
        SlowSyncStep::SelfTeam,
        SlowSyncStep::Contacts,
        SlowSyncStep::JoiningMlsConversations,
        SlowSyncStep::ResolveOneOnOneProtocols,
        SlowSyncStep::LegalHold,
    ];

    /// Stable snake_case name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlowSyncStep::Migration => "migration",
            SlowSyncStep::SelfUser => "self_user",
            SlowSyncStep::FeatureFlags => "feature_flags",
            SlowSyncStep::UpdateSupportedProtocols => "update_supported_protocols",
            SlowSyncStep::Conversations => "conversations",
            SlowSyncStep::Connections => "connections",
            SlowSyncStep::Members => "members",
            SlowSyncStep::SelfTeam => "self_team",
            SlowSyncStep::Contacts => "contacts",
            SlowSyncStep::JoiningMlsConversations => "joining_mls_conversations",
            SlowSyncStep::ResolveOneOnOneProtocols => "resolve_one_on_one_protocols",
            SlowSyncStep::LegalHold => "legal_hold",
        }
    }

    /// Parse the snake_case name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == name)
    }
}

impl fmt::Display for SlowSyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account sync status exposed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No sync attempted, or criteria not met.
    Pending,
    /// Full resync in progress.
    SlowSyncOngoing(SlowSyncStep),
    /// Local snapshot is complete; incremental sync is starting or active.
    SlowSyncCompleted,
    /// The current attempt failed.
    Failed {
        /// What went wrong.
        cause: SyncFailure,
        /// Whether retrying can be expected to help.
        can_retry: bool,
    },
}

impl SyncStatus {
    /// Build a `Failed` status, deriving `can_retry` from the cause.
    pub fn failed(cause: SyncFailure) -> Self {
        let can_retry = cause.can_retry();
        Self::Failed { cause, can_retry }
    }

    /// Check if a slow sync step is running.
    pub fn is_slow_sync_ongoing(&self) -> bool {
        matches!(self, Self::SlowSyncOngoing(_))
    }

    /// Check if the status is `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Status of the live-event session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementalSyncStatus {
    /// No session open.
    Pending,
    /// Replaying events missed while offline.
    FetchingPendingEvents,
    /// Caught up; applying events as they arrive.
    Live,
    /// The session ended without being cancelled.
    Interrupted(String),
}

impl Default for IncrementalSyncStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// What an incremental session does once every pending event is applied.
///
/// The policy can change while a session is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Stay connected and keep applying live events.
    #[default]
    KeepAlive,
    /// End the session cleanly. Used by background jobs.
    DisconnectAfterPendingEvents,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepFailure;

    #[test]
    fn all_steps_are_sorted() {
        let mut sorted = SlowSyncStep::ALL;
        sorted.sort();
        assert_eq!(sorted, SlowSyncStep::ALL);
    }

    #[test]
    fn conversations_precede_members() {
        assert!(SlowSyncStep::Conversations < SlowSyncStep::Members);
        assert!(SlowSyncStep::Migration < SlowSyncStep::SelfUser);
    }

    #[test]
    fn step_names_roundtrip() {
        for step in SlowSyncStep::ALL {
            assert_eq!(SlowSyncStep::parse(step.as_str()), Some(step));
        }
        assert_eq!(SlowSyncStep::parse("teams"), None);
    }

    #[test]
    fn failed_status_derives_retryability() {
        let status = SyncStatus::failed(SyncFailure::SlowSync(StepFailure::Network(
            "timeout".into(),
        )));
        assert!(matches!(status, SyncStatus::Failed { can_retry: true, .. }));

        let status = SyncStatus::failed(SyncFailure::SlowSync(
            StepFailure::UnsupportedServerVersion("v9".into()),
        ));
        assert!(matches!(status, SyncStatus::Failed { can_retry: false, .. }));
    }
}
