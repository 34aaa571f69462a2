//! Sync preconditions.

use std::collections::BTreeSet;
use std::fmt;

/// A single unmet sync precondition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotReadyReason {
    /// No valid session for the account.
    MissingCredentials,
    /// The device has no registered client.
    MissingRegisteredClient,
    /// The network is unreachable.
    NoNetwork,
    /// A precondition contributed by an extension signal.
    Custom(String),
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::MissingCredentials => f.write_str("missing credentials"),
            NotReadyReason::MissingRegisteredClient => f.write_str("missing registered client"),
            NotReadyReason::NoNetwork => f.write_str("no network"),
            NotReadyReason::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Whether sync may currently run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCriteriaResolution {
    /// All preconditions hold.
    Ready,
    /// Only the session is missing.
    MissingCredentials,
    /// Only the registered client is missing.
    MissingRegisteredClient,
    /// Only the network is missing.
    NoNetwork,
    /// Several preconditions fail, or an extension precondition fails.
    NotReady(BTreeSet<NotReadyReason>),
}

impl SyncCriteriaResolution {
    /// Build the resolution for a set of unmet preconditions.
    ///
    /// An empty set is `Ready`; a single well-known reason maps to its
    /// dedicated variant; anything else is the composite `NotReady`.
    pub fn from_reasons(reasons: BTreeSet<NotReadyReason>) -> Self {
        if reasons.is_empty() {
            return Self::Ready;
        }
        if reasons.len() == 1 {
            match reasons.iter().next() {
                Some(NotReadyReason::MissingCredentials) => return Self::MissingCredentials,
                Some(NotReadyReason::MissingRegisteredClient) => {
                    return Self::MissingRegisteredClient
                }
                Some(NotReadyReason::NoNetwork) => return Self::NoNetwork,
                _ => {}
            }
        }
        Self::NotReady(reasons)
    }

    /// Check if sync may run.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// The unmet preconditions (empty when `Ready`).
    pub fn reasons(&self) -> BTreeSet<NotReadyReason> {
        match self {
            Self::Ready => BTreeSet::new(),
            Self::MissingCredentials => BTreeSet::from([NotReadyReason::MissingCredentials]),
            Self::MissingRegisteredClient => {
                BTreeSet::from([NotReadyReason::MissingRegisteredClient])
            }
            Self::NoNetwork => BTreeSet::from([NotReadyReason::NoNetwork]),
            Self::NotReady(reasons) => reasons.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reasons_are_ready() {
        assert_eq!(
            SyncCriteriaResolution::from_reasons(BTreeSet::new()),
            SyncCriteriaResolution::Ready
        );
    }

    #[test]
    fn single_reason_maps_to_dedicated_variant() {
        let resolution =
            SyncCriteriaResolution::from_reasons(BTreeSet::from([NotReadyReason::NoNetwork]));
        assert_eq!(resolution, SyncCriteriaResolution::NoNetwork);
        assert_eq!(
            resolution.reasons(),
            BTreeSet::from([NotReadyReason::NoNetwork])
        );
    }

    #[test]
    fn multiple_reasons_are_composite() {
        let reasons = BTreeSet::from([
            NotReadyReason::NoNetwork,
            NotReadyReason::MissingCredentials,
        ]);
        let resolution = SyncCriteriaResolution::from_reasons(reasons.clone());
        assert_eq!(resolution, SyncCriteriaResolution::NotReady(reasons));
        assert!(!resolution.is_ready());
    }

    #[test]
    fn single_custom_reason_is_composite() {
        let reasons = BTreeSet::from([NotReadyReason::Custom("account deleted".into())]);
        assert!(matches!(
            SyncCriteriaResolution::from_reasons(reasons),
            SyncCriteriaResolution::NotReady(_)
        ));
    }
}
