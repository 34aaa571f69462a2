//! Sync coordinator.
//!
//! Binds the criteria resolutions of one account to sync runs. Decisions
//! come from [`CoordinatorState`]; this module only executes the actions it
//! returns:
//! - Runs are spawned tasks, hard-cancelled by abort and awaited before the
//!   next run starts
//! - Status changes are published on `watch` channels
//! - Reports from a run are tagged with its [`RunId`]
//! - The connection policy is shared with running sessions through a
//!   `watch` channel the actor owns
//!
//! # Example
//!
//! ```ignore
//! let coordinator = SyncCoordinator::builder()
//!     .event_stream(Arc::new(stream))
//!     .event_processor(Arc::new(processor))
//!     .step_runner(Arc::new(runner))
//!     .store(store)
//!     .build()?;
//!
//! let handle = coordinator.start(CriteriaResolver::standard(session, client, network));
//! handle.wait_until_live_or_failure().await?;
//! ```

use crate::config::SyncConfig;
use crate::criteria::CriteriaResolver;
use crate::incremental::IncrementalSyncManager;
use crate::processor::EventProcessor;
use crate::slow::{unix_now, Migration, SlowSyncEngine, SlowSyncStepRunner};
use crate::store::{CursorStore, SnapshotStore, StoreError};
use crate::transport::EventStream;
use std::sync::Arc;
use sync_core::{
    Action, CoordinatorState, Event, FreshnessPolicy, RunEnd, RunId, RunPhase, RunReport,
    SlowSyncReason,
};
use sync_types::{
    ConnectionPolicy, IncrementalSyncStatus, SyncCriteriaResolution, SyncFailure, SyncStatus,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 8;

/// A collaborator was not supplied to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing {0}")]
pub struct BuildError(&'static str);

/// Errors returned through a [`SyncHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Sync failed.
    #[error(transparent)]
    Failed(SyncFailure),

    /// The incremental session was interrupted.
    #[error("incremental sync interrupted: {0}")]
    Interrupted(String),

    /// The coordinator has shut down.
    #[error("sync coordinator stopped")]
    Stopped,
}

/// Builder for [`SyncCoordinator`].
#[derive(Default)]
pub struct SyncCoordinatorBuilder {
    stream: Option<Arc<dyn EventStream>>,
    processor: Option<Arc<dyn EventProcessor>>,
    runner: Option<Arc<dyn SlowSyncStepRunner>>,
    migrations: Vec<Arc<dyn Migration>>,
    cursors: Option<Arc<dyn CursorStore>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    config: SyncConfig,
}

impl SyncCoordinatorBuilder {
    /// Source of server events.
    pub fn event_stream(mut self, stream: Arc<dyn EventStream>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Applies events to local state.
    pub fn event_processor(mut self, processor: Arc<dyn EventProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Runs slow-sync steps.
    pub fn step_runner(mut self, runner: Arc<dyn SlowSyncStepRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register a migration.
    pub fn migration(mut self, migration: Arc<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Cursor storage.
    pub fn cursor_store(mut self, cursors: Arc<dyn CursorStore>) -> Self {
        self.cursors = Some(cursors);
        self
    }

    /// Snapshot bookkeeping storage.
    pub fn snapshot_store(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Use one store for both cursor and snapshot bookkeeping.
    pub fn store<S>(self, store: S) -> Self
    where
        S: CursorStore + SnapshotStore + 'static,
    {
        let store = Arc::new(store);
        self.cursor_store(store.clone()).snapshot_store(store)
    }

    /// Tuning (defaults apply otherwise).
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire the coordinator.
    pub fn build(self) -> Result<SyncCoordinator, BuildError> {
        let stream = self.stream.ok_or(BuildError("event stream"))?;
        let processor = self.processor.ok_or(BuildError("event processor"))?;
        let runner = self.runner.ok_or(BuildError("slow sync step runner"))?;
        let cursors = self.cursors.ok_or(BuildError("cursor store"))?;
        let snapshots = self.snapshots.ok_or(BuildError("snapshot store"))?;

        let slow = SlowSyncEngine::new(
            runner,
            self.migrations,
            cursors.clone(),
            snapshots.clone(),
            self.config.slow_sync_plan(),
        );
        let (policy_tx, policy_rx) = watch::channel(self.config.incremental.connection_policy);
        let incremental =
            IncrementalSyncManager::new(stream, processor, cursors.clone(), snapshots.clone())
                .with_policy_updates(policy_rx)
                .with_offline_buffer_capacity(self.config.incremental.offline_buffer_capacity);

        Ok(SyncCoordinator {
            ctx: Arc::new(RunContext {
                slow,
                incremental,
                cursors,
                snapshots,
                freshness: self.config.freshness_policy(),
            }),
            policy_tx,
        })
    }
}

/// Everything a run needs. Shared by all runs of one coordinator.
struct RunContext {
    slow: SlowSyncEngine,
    incremental: IncrementalSyncManager,
    cursors: Arc<dyn CursorStore>,
    snapshots: Arc<dyn SnapshotStore>,
    freshness: FreshnessPolicy,
}

impl RunContext {
    async fn slow_sync_reason(&self) -> Result<Option<SlowSyncReason>, StoreError> {
        let record = self.snapshots.snapshot().await?;
        let stale = self.snapshots.is_stale().await?;
        let has_cursor = self.cursors.get().await?.is_some();
        Ok(self
            .freshness
            .evaluate(record.as_ref(), stale, has_cursor, unix_now()))
    }
}

/// Sync coordinator for one account.
pub struct SyncCoordinator {
    ctx: Arc<RunContext>,
    policy_tx: watch::Sender<ConnectionPolicy>,
}

impl SyncCoordinator {
    /// Start building a coordinator.
    pub fn builder() -> SyncCoordinatorBuilder {
        SyncCoordinatorBuilder::default()
    }

    /// Start the coordinator on its own criteria resolver.
    pub fn start(self, resolver: CriteriaResolver) -> SyncHandle {
        let (resolutions, _task) = resolver.spawn();
        self.spawn(resolutions)
    }

    /// Start the coordinator on a stream of criteria resolutions.
    ///
    /// The coordinator shuts down when the stream closes.
    pub fn spawn(self, resolutions: mpsc::Receiver<SyncCriteriaResolution>) -> SyncHandle {
        let (status_tx, status_rx) = watch::channel(SyncStatus::Pending);
        let (incremental_tx, incremental_rx) = watch::channel(IncrementalSyncStatus::Pending);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(RunPhase::default());
        let policy = *self.policy_tx.borrow();

        let actor = Actor {
            ctx: self.ctx,
            state: CoordinatorState::with_connection_policy(policy),
            run: None,
            status_tx,
            incremental_tx,
            phase_tx,
            policy_tx: self.policy_tx,
            reports_tx,
            shutdown_acks: Vec::new(),
        };
        tokio::spawn(actor.run(commands_rx, resolutions, reports_rx));

        SyncHandle {
            commands: commands_tx,
            status: status_rx,
            incremental: incremental_rx,
            phase: phase_rx,
        }
    }
}

enum Command {
    Retry(oneshot::Sender<()>),
    SetConnectionPolicy(ConnectionPolicy, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Actor {
    ctx: Arc<RunContext>,
    state: CoordinatorState,
    run: Option<(RunId, JoinHandle<()>)>,
    status_tx: watch::Sender<SyncStatus>,
    incremental_tx: watch::Sender<IncrementalSyncStatus>,
    phase_tx: watch::Sender<RunPhase>,
    policy_tx: watch::Sender<ConnectionPolicy>,
    reports_tx: mpsc::UnboundedSender<Event>,
    shutdown_acks: Vec<oneshot::Sender<()>>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut resolutions: mpsc::Receiver<SyncCriteriaResolution>,
        mut reports: mpsc::UnboundedReceiver<Event>,
    ) {
        let mut commands_open = true;
        loop {
            // Commands are acknowledged once their event is handled.
            let (event, ack) = tokio::select! {
                biased;
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Retry(ack)) => (Event::RetryRequested, Some(ack)),
                    Some(Command::SetConnectionPolicy(policy, ack)) => {
                        tracing::info!("Connection policy: {:?}", policy);
                        self.policy_tx.send_replace(policy);
                        (Event::ConnectionPolicyChanged(policy), Some(ack))
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.shutdown_acks.push(ack);
                        (Event::ShutdownRequested, None)
                    }
                    None => {
                        commands_open = false;
                        continue;
                    }
                },
                resolution = resolutions.recv() => match resolution {
                    Some(resolution) => (Event::CriteriaChanged(resolution), None),
                    None => {
                        tracing::info!("Criteria stream closed, stopping sync");
                        (Event::ShutdownRequested, None)
                    }
                },
                Some(report) = reports.recv() => (report, None),
            };

            let running = self.handle(event).await;
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
            if !running {
                break;
            }
        }

        // Channels close before shutdown is acknowledged.
        let acks = std::mem::take(&mut self.shutdown_acks);
        drop(commands);
        drop(resolutions);
        drop(self);
        tracing::info!("Sync coordinator stopped");
        for ack in acks {
            let _ = ack.send(());
        }
    }

    /// Returns `false` once the coordinator must stop.
    async fn handle(&mut self, event: Event) -> bool {
        let state = std::mem::take(&mut self.state);
        let (state, actions) = state.on_event(event);
        self.state = state;

        let phase = self.state.run_phase();
        self.phase_tx.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });

        for action in actions {
            match action {
                Action::CancelRun(run) => self.cancel(run).await,
                Action::StartRun(run) => self.start(run).await,
                Action::PublishStatus(status) => {
                    tracing::info!("Sync status: {:?}", status);
                    self.status_tx.send_replace(status);
                }
                Action::PublishIncremental(status) => {
                    tracing::debug!("Incremental sync status: {:?}", status);
                    self.incremental_tx.send_replace(status);
                }
                Action::MarkStale => {
                    if let Err(e) = self.ctx.snapshots.mark_stale().await {
                        tracing::error!("Failed to mark local state stale: {}", e);
                    }
                }
                Action::Stop => return false,
            }
        }
        true
    }

    async fn cancel(&mut self, run: RunId) {
        match self.run.take() {
            Some((id, handle)) if id == run => {
                tracing::info!("Cancelling {}", run);
                handle.abort();
                let _ = handle.await;
            }
            other => self.run = other,
        }
    }

    async fn start(&mut self, run: RunId) {
        // A run that ended on its own may still be winding down.
        if let Some((_, previous)) = self.run.take() {
            previous.abort();
            let _ = previous.await;
        }

        let reporter = Reporter {
            run,
            tx: self.reports_tx.clone(),
        };
        let handle = tokio::spawn(execute_run(Arc::clone(&self.ctx), reporter));
        self.run = Some((run, handle));
    }
}

#[derive(Clone)]
struct Reporter {
    run: RunId,
    tx: mpsc::UnboundedSender<Event>,
}

impl Reporter {
    fn send(&self, report: RunReport) {
        // The actor is gone only after shutdown.
        let _ = self.tx.send(Event::Run {
            run: self.run,
            report,
        });
    }
}

async fn execute_run(ctx: Arc<RunContext>, reporter: Reporter) {
    tracing::info!("Starting {}", reporter.run);

    let slow_sync_cursor = match ctx.slow_sync_reason().await {
        Err(e) => {
            tracing::error!("Failed to read sync bookkeeping: {}", e);
            reporter.send(RunReport::Ended(RunEnd::StoreFailed(e.to_string())));
            return;
        }
        Ok(Some(reason)) => {
            tracing::info!("Slow sync required: {}", reason);
            match ctx
                .slow
                .run(|step| reporter.send(RunReport::SlowSyncStep(step)))
                .await
            {
                Ok(outcome) => {
                    reporter.send(RunReport::SlowSyncCompleted);
                    outcome.cursor
                }
                Err(failure) => {
                    tracing::warn!("Slow sync failed: {}", failure);
                    reporter.send(RunReport::SlowSyncFailed(failure));
                    return;
                }
            }
        }
        Ok(None) => {
            tracing::debug!("Local snapshot is fresh, skipping slow sync");
            let migrated = ctx
                .slow
                .migrate(&mut |step| reporter.send(RunReport::SlowSyncStep(step)))
                .await;
            if let Err(failure) = migrated {
                tracing::warn!("Migration failed: {}", failure);
                reporter.send(RunReport::SlowSyncFailed(failure));
                return;
            }
            reporter.send(RunReport::SlowSyncSkipped);
            None
        }
    };

    let end = ctx
        .incremental
        .run(slow_sync_cursor, |status| {
            reporter.send(RunReport::Incremental(status))
        })
        .await;
    tracing::info!("{} ended: {:?}", reporter.run, end);
    reporter.send(RunReport::Ended(end));
}

/// Handle to a running coordinator.
///
/// Clones control the same coordinator.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SyncStatus>,
    incremental: watch::Receiver<IncrementalSyncStatus>,
    phase: watch::Receiver<RunPhase>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Retry(_) => f.write_str("Retry"),
            Command::SetConnectionPolicy(policy, _) => {
                f.debug_tuple("SetConnectionPolicy").field(policy).finish()
            }
            Command::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl SyncHandle {
    /// Current sync status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Observe sync status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Current incremental session status.
    pub fn incremental_status(&self) -> IncrementalSyncStatus {
        self.incremental.borrow().clone()
    }

    /// Observe incremental session status changes.
    pub fn subscribe_incremental(&self) -> watch::Receiver<IncrementalSyncStatus> {
        self.incremental.clone()
    }

    /// Start a fresh run if the criteria are `Ready`; no-op otherwise.
    ///
    /// Returns once the coordinator has acted on the request.
    pub async fn retry(&self) -> Result<(), SyncError> {
        self.request(Command::Retry).await
    }

    /// Change the connection policy of the current and future sessions.
    ///
    /// Switching to `DisconnectAfterPendingEvents` ends a live session
    /// cleanly. Switching back to `KeepAlive` restarts a session that ended
    /// that way.
    pub async fn set_connection_policy(&self, policy: ConnectionPolicy) -> Result<(), SyncError> {
        self.request(|ack| Command::SetConnectionPolicy(policy, ack))
            .await
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), SyncError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(command(ack))
            .await
            .map_err(|_| SyncError::Stopped)?;
        done.await.map_err(|_| SyncError::Stopped)
    }

    /// Cancel the active run and stop the coordinator.
    ///
    /// Returns once the run is gone. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Wait until the slow-sync phase of the newest run is over.
    ///
    /// Succeeds on `SlowSyncCompleted`, fails on `Failed`. A
    /// `SlowSyncCompleted` left by an earlier run does not count while a
    /// newer run is still deciding whether to slow sync.
    pub async fn wait_until_started_or_failure(&self) -> Result<(), SyncError> {
        let mut status = self.status.clone();
        let mut phase = self.phase.clone();
        loop {
            let current = status.borrow_and_update().clone();
            let settled = phase.borrow_and_update().is_settled();
            match current {
                SyncStatus::SlowSyncCompleted if settled => return Ok(()),
                SyncStatus::Failed { cause, .. } => return Err(SyncError::Failed(cause)),
                _ => {}
            }

            let closed = tokio::select! {
                changed = status.changed() => changed.is_err(),
                changed = phase.changed() => changed.is_err(),
            };
            if closed {
                return Err(SyncError::Stopped);
            }
        }
    }

    /// Wait until the incremental session is live.
    ///
    /// Fails on `Failed` or when the session is interrupted.
    pub async fn wait_until_live_or_failure(&self) -> Result<(), SyncError> {
        let mut status = self.status.clone();
        let mut incremental = self.incremental.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if let SyncStatus::Failed { cause, .. } = current {
                return Err(SyncError::Failed(cause));
            }
            let session = incremental.borrow_and_update().clone();
            match session {
                IncrementalSyncStatus::Live => return Ok(()),
                IncrementalSyncStatus::Interrupted(reason) => {
                    return Err(SyncError::Interrupted(reason))
                }
                IncrementalSyncStatus::Pending | IncrementalSyncStatus::FetchingPendingEvents => {}
            }

            let closed = tokio::select! {
                changed = status.changed() => changed.is_err(),
                changed = incremental.changed() => changed.is_err(),
            };
            if closed {
                return Err(SyncError::Stopped);
            }
        }
    }
}
