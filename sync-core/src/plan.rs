//! Slow sync planning.
//!
//! Decides which data steps run and in which order, and which migrations
//! apply for a given version gap. Both answers are pure functions of their
//! inputs.

use std::collections::BTreeSet;
use sync_types::{SlowSyncStep, Version};

/// An ordered list of data steps for one slow sync.
///
/// Whatever order the steps were configured in, they execute in the
/// canonical [`SlowSyncStep`] order. `Migration` is never part of the plan;
/// migrations run before the first planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowSyncPlan {
    steps: Vec<SlowSyncStep>,
}

impl SlowSyncPlan {
    /// Every data step.
    pub fn full() -> Self {
        Self::from_steps(SlowSyncStep::ALL)
    }

    /// Plan a subset of steps.
    pub fn from_steps(steps: impl IntoIterator<Item = SlowSyncStep>) -> Self {
        let ordered: BTreeSet<SlowSyncStep> = steps
            .into_iter()
            .filter(|step| *step != SlowSyncStep::Migration)
            .collect();
        Self {
            steps: ordered.into_iter().collect(),
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[SlowSyncStep] {
        &self.steps
    }

    /// Number of data steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan has no data steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for SlowSyncPlan {
    fn default() -> Self {
        Self::full()
    }
}

/// Select the migrations to run for a version gap.
///
/// Returns every distinct target in `(local, server]`, ascending. An empty
/// result means local state is current (or ahead of the server).
pub fn select_migrations<I>(available: I, local: Version, server: Version) -> Vec<Version>
where
    I: IntoIterator<Item = Version>,
{
    if server <= local {
        return Vec::new();
    }
    let selected: BTreeSet<Version> = available
        .into_iter()
        .filter(|target| *target > local && *target <= server)
        .collect();
    selected.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_plan_excludes_migration() {
        let plan = SlowSyncPlan::full();
        assert_eq!(plan.len(), SlowSyncStep::ALL.len() - 1);
        assert_eq!(plan.steps()[0], SlowSyncStep::SelfUser);
        assert_eq!(plan.steps().last(), Some(&SlowSyncStep::LegalHold));
    }

    #[test]
    fn subset_is_reordered_canonically() {
        let plan = SlowSyncPlan::from_steps([
            SlowSyncStep::Members,
            SlowSyncStep::Connections,
            SlowSyncStep::SelfUser,
            SlowSyncStep::Conversations,
        ]);
        assert_eq!(
            plan.steps(),
            &[
                SlowSyncStep::SelfUser,
                SlowSyncStep::Conversations,
                SlowSyncStep::Connections,
                SlowSyncStep::Members,
            ]
        );
    }

    #[test]
    fn duplicate_steps_collapse() {
        let plan = SlowSyncPlan::from_steps([
            SlowSyncStep::Contacts,
            SlowSyncStep::Contacts,
            SlowSyncStep::Migration,
        ]);
        assert_eq!(plan.steps(), &[SlowSyncStep::Contacts]);
    }

    #[test]
    fn migrations_within_gap_run_ascending() {
        assert_eq!(select_migrations([7, 6], 5, 7), vec![6, 7]);
    }

    #[test]
    fn migrations_outside_gap_are_skipped() {
        assert_eq!(select_migrations([3, 5, 6, 8], 5, 7), vec![6]);
    }

    #[test]
    fn no_migrations_when_current_or_ahead() {
        assert!(select_migrations([6, 7], 7, 7).is_empty());
        assert!(select_migrations([6, 7], 8, 7).is_empty());
    }

    #[test]
    fn duplicate_migration_targets_run_once() {
        assert_eq!(select_migrations([6, 6, 7], 5, 7), vec![6, 7]);
    }
}
