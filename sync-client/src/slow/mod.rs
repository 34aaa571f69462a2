//! Slow sync engine.
//!
//! Rebuilds the local snapshot of account state from the server:
//! - Pending migrations run first, once, in ascending target order
//! - Data steps then run strictly one after another in plan order
//! - The first failure aborts the whole sync; nothing after it runs
//!
//! Every step replaces the data it owns, so a failed or cancelled slow sync
//! can simply be started again from the top.

mod mock;
mod runner;

pub use mock::{Execution, MockMigration, MockStepRunner};
pub use runner::{Migration, MigrationError, SlowSyncStepRunner};

use crate::store::{CursorStore, SnapshotStore, StoreError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sync_core::{select_migrations, SlowSyncPlan, SnapshotRecord};
use sync_types::{Cursor, SlowSyncStep, StepFailure, Version};

/// Version of the slow-sync procedure. Snapshots recorded by an older
/// version are refreshed.
pub const SLOW_SYNC_VERSION: Version = 1;

/// Result of a completed slow sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowSyncOutcome {
    /// Cursor incremental sync resumes from, if a step supplied one.
    pub cursor: Option<Cursor>,
    /// Migration targets that ran.
    pub migrations: Vec<Version>,
}

/// Runs migrations and slow-sync steps for one account.
pub struct SlowSyncEngine {
    runner: Arc<dyn SlowSyncStepRunner>,
    migrations: Vec<Arc<dyn Migration>>,
    cursors: Arc<dyn CursorStore>,
    snapshots: Arc<dyn SnapshotStore>,
    plan: SlowSyncPlan,
}

impl SlowSyncEngine {
    /// Create an engine.
    pub fn new(
        runner: Arc<dyn SlowSyncStepRunner>,
        migrations: Vec<Arc<dyn Migration>>,
        cursors: Arc<dyn CursorStore>,
        snapshots: Arc<dyn SnapshotStore>,
        plan: SlowSyncPlan,
    ) -> Self {
        Self {
            runner,
            migrations,
            cursors,
            snapshots,
            plan,
        }
    }

    /// The data steps this engine runs.
    pub fn plan(&self) -> &SlowSyncPlan {
        &self.plan
    }

    /// Bring local data up to the server's version.
    ///
    /// Reports [`SlowSyncStep::Migration`] once if any migration is due.
    /// The local version is recorded after each migration, so a failure
    /// leaves earlier migrations applied.
    pub async fn migrate<F>(&self, on_step: &mut F) -> Result<Vec<Version>, StepFailure>
    where
        F: FnMut(SlowSyncStep) + Send,
    {
        let local = self.snapshots.local_version().await.map_err(storage)?;
        let server = self.runner.server_version().await?;
        let targets = select_migrations(
            self.migrations.iter().map(|m| m.target_version()),
            local,
            server,
        );

        if !targets.is_empty() {
            on_step(SlowSyncStep::Migration);
        }

        for &target in &targets {
            tracing::info!("Migrating local data to version {}", target);
            for migration in self.migrations.iter().filter(|m| m.target_version() == target) {
                migration
                    .run()
                    .await
                    .map_err(|e| StepFailure::Migration {
                        version: target,
                        reason: e.to_string(),
                    })?;
            }
            self.snapshots
                .set_local_version(target)
                .await
                .map_err(storage)?;
        }

        if server > local && targets.last() != Some(&server) {
            self.snapshots
                .set_local_version(server)
                .await
                .map_err(storage)?;
        }

        Ok(targets)
    }

    /// Run a full slow sync.
    ///
    /// On success the cursor store holds the fresh cursor (or is cleared
    /// when no step supplied one), a [`SnapshotRecord`] is written and the
    /// staleness flag is cleared.
    pub async fn run<F>(&self, mut on_step: F) -> Result<SlowSyncOutcome, StepFailure>
    where
        F: FnMut(SlowSyncStep) + Send,
    {
        let migrations = self.migrate(&mut on_step).await?;

        let mut cursor = None;
        for &step in self.plan.steps() {
            on_step(step);
            tracing::debug!("Slow sync step {}", step);
            if let Some(fresh) = self.runner.run(step).await.inspect_err(|e| {
                tracing::warn!("Slow sync step {} failed: {}", step, e);
            })? {
                cursor = Some(fresh);
            }
        }

        let written = match &cursor {
            Some(fresh) => self.cursors.set(fresh).await,
            None => self.cursors.clear().await,
        };
        written.map_err(storage)?;

        self.snapshots
            .record_snapshot(SnapshotRecord {
                completed_at_secs: unix_now(),
                version: SLOW_SYNC_VERSION,
                cursor_issued: cursor.is_some(),
            })
            .await
            .map_err(storage)?;
        self.snapshots.clear_stale().await.map_err(storage)?;

        tracing::info!("Slow sync completed ({} steps)", self.plan.len());
        Ok(SlowSyncOutcome { cursor, migrations })
    }
}

fn storage(e: StoreError) -> StepFailure {
    StepFailure::LocalStorage(e.to_string())
}

/// Seconds since the Unix epoch. A clock before the epoch reads as zero.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine(runner: &MockStepRunner, store: &MemoryStore, plan: SlowSyncPlan) -> SlowSyncEngine {
        SlowSyncEngine::new(
            Arc::new(runner.clone()),
            Vec::new(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            plan,
        )
    }

    #[tokio::test]
    async fn runs_every_step_in_order_and_reports_each() {
        let runner = MockStepRunner::new();
        let store = MemoryStore::new();
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        let mut reported = Vec::new();
        engine.run(|step| reported.push(step)).await.unwrap();

        let expected: Vec<_> = SlowSyncPlan::full().steps().to_vec();
        assert_eq!(reported, expected);
        assert_eq!(runner.completed_steps(), expected);
    }

    #[tokio::test]
    async fn success_persists_cursor_and_snapshot() {
        let runner = MockStepRunner::new();
        runner.set_cursor(SlowSyncStep::SelfUser, Cursor::new("evt-1"));
        runner.set_cursor(SlowSyncStep::Conversations, Cursor::new("evt-2"));
        let store = MemoryStore::new();
        store.mark_stale().await.unwrap();
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        let outcome = engine.run(|_| {}).await.unwrap();

        assert_eq!(outcome.cursor, Some(Cursor::new("evt-2")));
        assert_eq!(store.cursor(), Some(Cursor::new("evt-2")));
        assert!(!store.stale());
        let record = store.snapshot_record().unwrap();
        assert_eq!(record.version, SLOW_SYNC_VERSION);
        assert!(record.completed_at_secs > 0);
        assert!(record.cursor_issued);
    }

    #[tokio::test]
    async fn missing_cursor_clears_stored_one() {
        let runner = MockStepRunner::new();
        let store = MemoryStore::with_cursor(Cursor::new("evt-old"));
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        let outcome = engine.run(|_| {}).await.unwrap();

        assert_eq!(outcome.cursor, None);
        assert_eq!(store.cursor(), None);
        assert!(!store.snapshot_record().unwrap().cursor_issued);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_steps() {
        let runner = MockStepRunner::new();
        runner.fail_step(
            SlowSyncStep::Conversations,
            StepFailure::ServerRejection {
                reason: "503".into(),
                retryable: true,
            },
        );
        let store = MemoryStore::new();
        store.mark_stale().await.unwrap();
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        let result = engine.run(|_| {}).await;

        assert!(matches!(result, Err(StepFailure::ServerRejection { .. })));
        assert_eq!(
            runner.completed_steps(),
            vec![
                SlowSyncStep::SelfUser,
                SlowSyncStep::FeatureFlags,
                SlowSyncStep::UpdateSupportedProtocols
            ]
        );
        assert!(store.stale());
        assert!(store.snapshot_record().is_none());
    }

    #[tokio::test]
    async fn rerun_yields_same_local_state() {
        let runner = MockStepRunner::new();
        let store = MemoryStore::new();
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        engine.run(|_| {}).await.unwrap();
        let first = runner.local_state();
        engine.run(|_| {}).await.unwrap();

        assert_eq!(runner.local_state(), first);
    }

    #[tokio::test]
    async fn migrations_run_ascending_before_data_steps() {
        let runner = MockStepRunner::new();
        runner.set_server_version(7);
        let store = MemoryStore::new();
        store.seed_local_version(5);
        let engine = SlowSyncEngine::new(
            Arc::new(runner.clone()),
            vec![Arc::new(runner.migration(7)), Arc::new(runner.migration(6))],
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SlowSyncPlan::from_steps([SlowSyncStep::SelfUser]),
        );

        let mut reported = Vec::new();
        let outcome = engine.run(|step| reported.push(step)).await.unwrap();

        assert_eq!(outcome.migrations, vec![6, 7]);
        assert_eq!(
            runner.log(),
            vec![
                Execution::Migration(6),
                Execution::Migration(7),
                Execution::Step(SlowSyncStep::SelfUser),
            ]
        );
        assert_eq!(
            reported,
            vec![SlowSyncStep::Migration, SlowSyncStep::SelfUser]
        );
        assert_eq!(store.version(), 7);
    }

    #[tokio::test]
    async fn failed_migration_keeps_earlier_ones() {
        let runner = MockStepRunner::new();
        runner.set_server_version(7);
        let store = MemoryStore::new();
        store.seed_local_version(5);
        let engine = SlowSyncEngine::new(
            Arc::new(runner.clone()),
            vec![
                Arc::new(runner.migration(6)),
                Arc::new(runner.migration(7).failing("column missing")),
            ],
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SlowSyncPlan::full(),
        );

        let result = engine.run(|_| {}).await;

        assert_eq!(
            result,
            Err(StepFailure::Migration {
                version: 7,
                reason: "column missing".into()
            })
        );
        assert_eq!(store.version(), 6);
        assert!(runner.completed_steps().is_empty());
    }

    #[tokio::test]
    async fn up_to_date_version_reports_no_migration() {
        let runner = MockStepRunner::new();
        runner.set_server_version(3);
        let store = MemoryStore::new();
        store.seed_local_version(3);
        let engine = SlowSyncEngine::new(
            Arc::new(runner.clone()),
            vec![Arc::new(runner.migration(3))],
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SlowSyncPlan::full(),
        );

        let mut reported = Vec::new();
        let migrated = engine.migrate(&mut |step| reported.push(step)).await.unwrap();

        assert!(migrated.is_empty());
        assert!(reported.is_empty());
    }

    #[tokio::test]
    async fn version_without_migrations_is_recorded() {
        let runner = MockStepRunner::new();
        runner.set_server_version(4);
        let store = MemoryStore::new();
        let engine = engine(&runner, &store, SlowSyncPlan::full());

        engine.migrate(&mut |_| {}).await.unwrap();
        assert_eq!(store.version(), 4);
    }
}
