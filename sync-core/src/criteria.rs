//! Sync criteria resolution.
//!
//! Pure projection of the current precondition signals onto a
//! [`SyncCriteriaResolution`], plus the "distinct until changed" filter the
//! coordinator relies on to avoid redundant restarts.

use std::collections::BTreeSet;
use sync_types::{NotReadyReason, SyncCriteriaResolution};

/// Current value of one precondition signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    /// Reason reported while the signal is unsatisfied.
    pub reason: NotReadyReason,
    /// Whether the precondition currently holds.
    pub satisfied: bool,
}

impl Criterion {
    /// Create a criterion snapshot.
    pub fn new(reason: NotReadyReason, satisfied: bool) -> Self {
        Self { reason, satisfied }
    }
}

/// Resolve a set of signal values.
pub fn resolve<'a, I>(criteria: I) -> SyncCriteriaResolution
where
    I: IntoIterator<Item = &'a Criterion>,
{
    let reasons: BTreeSet<NotReadyReason> = criteria
        .into_iter()
        .filter(|c| !c.satisfied)
        .map(|c| c.reason.clone())
        .collect();
    SyncCriteriaResolution::from_reasons(reasons)
}

/// Suppresses consecutive duplicate values.
#[derive(Debug, Clone)]
pub struct DistinctUntilChanged<T> {
    last: Option<T>,
}

impl<T: Clone + PartialEq> DistinctUntilChanged<T> {
    /// Create a filter that has seen nothing yet.
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Returns the value if it differs from the previously observed one.
    pub fn observe(&mut self, value: T) -> Option<T> {
        if self.last.as_ref() == Some(&value) {
            return None;
        }
        self.last = Some(value.clone());
        Some(value)
    }

    /// The last value let through.
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

impl<T: Clone + PartialEq> Default for DistinctUntilChanged<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(session: bool, client: bool, network: bool) -> Vec<Criterion> {
        vec![
            Criterion::new(NotReadyReason::MissingCredentials, session),
            Criterion::new(NotReadyReason::MissingRegisteredClient, client),
            Criterion::new(NotReadyReason::NoNetwork, network),
        ]
    }

    #[test]
    fn all_satisfied_is_ready() {
        assert_eq!(
            resolve(&standard(true, true, true)),
            SyncCriteriaResolution::Ready
        );
    }

    #[test]
    fn no_criteria_is_ready() {
        let none: Vec<Criterion> = Vec::new();
        assert_eq!(resolve(&none), SyncCriteriaResolution::Ready);
    }

    #[test]
    fn single_failure_maps_to_variant() {
        assert_eq!(
            resolve(&standard(true, true, false)),
            SyncCriteriaResolution::NoNetwork
        );
        assert_eq!(
            resolve(&standard(false, true, true)),
            SyncCriteriaResolution::MissingCredentials
        );
        assert_eq!(
            resolve(&standard(true, false, true)),
            SyncCriteriaResolution::MissingRegisteredClient
        );
    }

    #[test]
    fn multiple_failures_are_composite() {
        let resolution = resolve(&standard(false, true, false));
        assert_eq!(
            resolution,
            SyncCriteriaResolution::NotReady(BTreeSet::from([
                NotReadyReason::MissingCredentials,
                NotReadyReason::NoNetwork,
            ]))
        );
    }

    #[test]
    fn extension_signal_participates() {
        let mut criteria = standard(true, true, true);
        criteria.push(Criterion::new(
            NotReadyReason::Custom("blocked by admin".into()),
            false,
        ));
        assert!(!resolve(&criteria).is_ready());
    }

    #[test]
    fn distinct_filter_drops_repeats() {
        let mut filter = DistinctUntilChanged::new();
        assert_eq!(
            filter.observe(SyncCriteriaResolution::Ready),
            Some(SyncCriteriaResolution::Ready)
        );
        assert_eq!(filter.observe(SyncCriteriaResolution::Ready), None);
        assert_eq!(
            filter.observe(SyncCriteriaResolution::NoNetwork),
            Some(SyncCriteriaResolution::NoNetwork)
        );
        assert_eq!(
            filter.observe(SyncCriteriaResolution::Ready),
            Some(SyncCriteriaResolution::Ready)
        );
        assert_eq!(filter.last(), Some(&SyncCriteriaResolution::Ready));
    }
}
