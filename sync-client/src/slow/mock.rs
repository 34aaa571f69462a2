//! Mock slow-sync collaborators for testing.
//!
//! [`MockStepRunner`] and the [`MockMigration`]s created from it share one
//! execution log, so tests can check migrations ran before any data step.

use super::runner::{Migration, MigrationError, SlowSyncStepRunner};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use sync_types::{Cursor, SlowSyncStep, StepFailure, Version};

/// Entry of the shared execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// A migration to this version completed.
    Migration(Version),
    /// A data step completed.
    Step(SlowSyncStep),
}

/// Mock step runner for testing.
#[derive(Debug, Default)]
pub struct MockStepRunner {
    inner: Arc<Mutex<MockStepRunnerInner>>,
}

#[derive(Debug, Default)]
struct MockStepRunnerInner {
    log: Vec<Execution>,
    started: Vec<SlowSyncStep>,
    failures: HashMap<SlowSyncStep, StepFailure>,
    hang_on: Option<SlowSyncStep>,
    cursors: HashMap<SlowSyncStep, Cursor>,
    local_state: BTreeMap<SlowSyncStep, String>,
    server_version: Version,
    fail_server_version: Option<StepFailure>,
}

impl MockStepRunner {
    /// Create a runner where every step succeeds without a cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `cursor` from `step`.
    pub fn set_cursor(&self, step: SlowSyncStep, cursor: Cursor) {
        let mut inner = self.inner.lock().unwrap();
        inner.cursors.insert(step, cursor);
    }

    /// Set the version reported by `server_version()`.
    pub fn set_server_version(&self, version: Version) {
        let mut inner = self.inner.lock().unwrap();
        inner.server_version = version;
    }

    /// Fail `step` with `failure` until [`clear_failures`](Self::clear_failures).
    pub fn fail_step(&self, step: SlowSyncStep, failure: StepFailure) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.insert(step, failure);
    }

    /// Cause the next server_version() to fail with the given error.
    pub fn fail_next_server_version(&self, failure: StepFailure) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_server_version = Some(failure);
    }

    /// Let every step succeed again.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.clear();
        inner.hang_on = None;
    }

    /// Never finish `step`; it blocks until cancelled.
    pub fn hang_on(&self, step: SlowSyncStep) {
        let mut inner = self.inner.lock().unwrap();
        inner.hang_on = Some(step);
    }

    /// Create a migration that records into this runner's log.
    pub fn migration(&self, target: Version) -> MockMigration {
        MockMigration {
            target,
            failure: None,
            log: Arc::clone(&self.inner),
        }
    }

    /// Everything that completed, in completion order.
    pub fn log(&self) -> Vec<Execution> {
        let inner = self.inner.lock().unwrap();
        inner.log.clone()
    }

    /// Data steps that completed, in completion order.
    pub fn completed_steps(&self) -> Vec<SlowSyncStep> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Execution::Step(step) => Some(step),
                Execution::Migration(_) => None,
            })
            .collect()
    }

    /// Data steps that were entered, completed or not.
    pub fn started_steps(&self) -> Vec<SlowSyncStep> {
        let inner = self.inner.lock().unwrap();
        inner.started.clone()
    }

    /// Local data written by the steps.
    pub fn local_state(&self) -> BTreeMap<SlowSyncStep, String> {
        let inner = self.inner.lock().unwrap();
        inner.local_state.clone()
    }
}

impl Clone for MockStepRunner {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SlowSyncStepRunner for MockStepRunner {
    async fn run(&self, step: SlowSyncStep) -> Result<Option<Cursor>, StepFailure> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.started.push(step);
            if let Some(failure) = inner.failures.get(&step) {
                return Err(failure.clone());
            }
            inner.hang_on == Some(step)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        let snapshot = format!("{} at v{}", step, inner.server_version);
        inner.local_state.insert(step, snapshot);
        inner.log.push(Execution::Step(step));
        Ok(inner.cursors.get(&step).cloned())
    }

    async fn server_version(&self) -> Result<Version, StepFailure> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(failure) = inner.fail_server_version.take() {
            return Err(failure);
        }
        Ok(inner.server_version)
    }
}

/// Mock migration for testing.
#[derive(Debug, Clone)]
pub struct MockMigration {
    target: Version,
    failure: Option<String>,
    log: Arc<Mutex<MockStepRunnerInner>>,
}

impl MockMigration {
    /// Make this migration fail with `reason`.
    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl Migration for MockMigration {
    fn target_version(&self) -> Version {
        self.target
    }

    async fn run(&self) -> Result<(), MigrationError> {
        if let Some(reason) = &self.failure {
            return Err(MigrationError(reason.clone()));
        }
        let mut inner = self.log.lock().unwrap();
        inner.log.push(Execution::Migration(self.target));
        Ok(())
    }
}
