//! Coordinator state machine for convo-sync.
//!
//! This module provides a pure, side-effect-free state machine binding the
//! sync criteria to sync runs. It takes events as input and produces a new
//! state plus a list of actions to execute.
//!
//! The actual work (spawning runs, cancelling them, publishing status) is
//! performed by sync-client, not by this module.
//!
//! Every run gets a fresh [`RunId`]. Reports from a run that is no longer
//! the active one are dropped, so a cancelled run can never move the status
//! after its successor started.
//!
//! A session that ended because of [`ConnectionPolicy::DisconnectAfterPendingEvents`]
//! is restarted once the policy goes back to `KeepAlive`.

use std::fmt;
use sync_types::{
    ConnectionPolicy, IncrementalSyncStatus, SlowSyncStep, StepFailure, SyncCriteriaResolution,
    SyncFailure, SyncStatus,
};

/// Generation number of a coordination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Progress of the newest run.
///
/// `settled` is the last run whose slow-sync phase is over, successfully or
/// not. While it lags behind `started`, the current status may still be the
/// one left by an earlier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunPhase {
    /// Number of runs started so far.
    pub started: u64,
    /// Generation of the last run that got past slow sync.
    pub settled: u64,
}

impl RunPhase {
    /// Whether the newest run got past slow sync.
    pub fn is_settled(&self) -> bool {
        self.settled >= self.started
    }
}

/// Coordinator state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorState {
    criteria: Option<SyncCriteriaResolution>,
    status: SyncStatus,
    incremental: IncrementalSyncStatus,
    policy: ConnectionPolicy,
    active_run: Option<RunId>,
    runs_started: u64,
    runs_settled: u64,
    // The last session ended cleanly and nothing restarted it yet.
    completed: bool,
    stopped: bool,
}

impl CoordinatorState {
    /// Create a coordinator in the `Pending` state with no run.
    pub fn new() -> Self {
        Self {
            criteria: None,
            status: SyncStatus::Pending,
            incremental: IncrementalSyncStatus::Pending,
            policy: ConnectionPolicy::default(),
            active_run: None,
            runs_started: 0,
            runs_settled: 0,
            completed: false,
            stopped: false,
        }
    }

    /// Create a coordinator whose sessions start under `policy`.
    pub fn with_connection_policy(policy: ConnectionPolicy) -> Self {
        Self {
            policy,
            ..Self::new()
        }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions in order.
    pub fn on_event(mut self, event: Event) -> (Self, Vec<Action>) {
        let mut actions = Vec::new();
        if self.stopped {
            return (self, actions);
        }

        match event {
            Event::CriteriaChanged(resolution) => {
                let ready = resolution.is_ready();
                self.criteria = Some(resolution);
                if ready {
                    self.start_run(&mut actions);
                } else {
                    self.completed = false;
                    self.cancel_run(&mut actions);
                    self.set_status(SyncStatus::Pending, &mut actions);
                    self.set_incremental(IncrementalSyncStatus::Pending, &mut actions);
                }
            }

            Event::RetryRequested => {
                if self.is_ready() {
                    self.start_run(&mut actions);
                }
            }

            Event::ConnectionPolicyChanged(policy) => {
                self.policy = policy;
                if policy == ConnectionPolicy::KeepAlive && self.completed && self.is_ready() {
                    self.start_run(&mut actions);
                }
            }

            Event::ShutdownRequested => {
                self.cancel_run(&mut actions);
                self.set_status(SyncStatus::Pending, &mut actions);
                self.set_incremental(IncrementalSyncStatus::Pending, &mut actions);
                self.stopped = true;
                actions.push(Action::Stop);
            }

            Event::Run { run, report } => {
                if self.active_run != Some(run) {
                    // Late report from a superseded run.
                    return (self, actions);
                }
                self.on_run_report(run, report, &mut actions);
            }
        }

        (self, actions)
    }

    fn on_run_report(&mut self, run: RunId, report: RunReport, actions: &mut Vec<Action>) {
        if !matches!(report, RunReport::SlowSyncStep(_) | RunReport::Incremental(_)) {
            self.runs_settled = run.0;
        }

        match report {
            RunReport::SlowSyncStep(step) => {
                self.set_status(SyncStatus::SlowSyncOngoing(step), actions);
            }
            RunReport::SlowSyncCompleted | RunReport::SlowSyncSkipped => {
                self.set_status(SyncStatus::SlowSyncCompleted, actions);
            }
            RunReport::SlowSyncFailed(failure) => {
                self.active_run = None;
                self.set_status(SyncStatus::failed(SyncFailure::SlowSync(failure)), actions);
            }
            RunReport::Incremental(status) => {
                self.set_incremental(status, actions);
            }
            RunReport::Ended(end) => {
                self.active_run = None;
                match end {
                    RunEnd::ConnectivityLost(reason) => {
                        self.set_incremental(IncrementalSyncStatus::Interrupted(reason), actions);
                    }
                    RunEnd::GapDetected => {
                        self.set_status(SyncStatus::Pending, actions);
                        self.set_incremental(
                            IncrementalSyncStatus::Interrupted("event gap detected".into()),
                            actions,
                        );
                    }
                    RunEnd::Unrecoverable(reason) => {
                        actions.push(Action::MarkStale);
                        self.set_incremental(
                            IncrementalSyncStatus::Interrupted(reason.clone()),
                            actions,
                        );
                        self.set_status(
                            SyncStatus::failed(SyncFailure::Incremental(reason)),
                            actions,
                        );
                    }
                    RunEnd::StoreFailed(reason) => {
                        self.set_incremental(
                            IncrementalSyncStatus::Interrupted(reason.clone()),
                            actions,
                        );
                        self.set_status(SyncStatus::failed(SyncFailure::Store(reason)), actions);
                    }
                    RunEnd::Completed => {
                        self.set_incremental(IncrementalSyncStatus::Pending, actions);
                        if self.policy == ConnectionPolicy::KeepAlive && self.is_ready() {
                            // The policy went back up while the session was ending.
                            self.start_run(actions);
                        } else {
                            self.completed = true;
                        }
                    }
                }
            }
        }
    }

    fn start_run(&mut self, actions: &mut Vec<Action>) {
        self.cancel_run(actions);
        self.completed = false;
        self.runs_started += 1;
        let run = RunId(self.runs_started);
        self.active_run = Some(run);
        if self.status.is_failed() || self.status.is_slow_sync_ongoing() {
            self.set_status(SyncStatus::Pending, actions);
        }
        self.set_incremental(IncrementalSyncStatus::Pending, actions);
        actions.push(Action::StartRun(run));
    }

    fn cancel_run(&mut self, actions: &mut Vec<Action>) {
        if let Some(run) = self.active_run.take() {
            actions.push(Action::CancelRun(run));
        }
    }

    fn set_status(&mut self, status: SyncStatus, actions: &mut Vec<Action>) {
        if self.status != status {
            self.status = status.clone();
            actions.push(Action::PublishStatus(status));
        }
    }

    fn set_incremental(&mut self, status: IncrementalSyncStatus, actions: &mut Vec<Action>) {
        if self.incremental != status {
            self.incremental = status.clone();
            actions.push(Action::PublishIncremental(status));
        }
    }

    /// Current sync status.
    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Current incremental session status.
    pub fn incremental_status(&self) -> &IncrementalSyncStatus {
        &self.incremental
    }

    /// The run allowed to report, if any.
    pub fn active_run(&self) -> Option<RunId> {
        self.active_run
    }

    /// Progress of the newest run.
    pub fn run_phase(&self) -> RunPhase {
        RunPhase {
            started: self.runs_started,
            settled: self.runs_settled,
        }
    }

    /// Connection policy for incremental sessions.
    pub fn connection_policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// The last criteria resolution received.
    pub fn criteria(&self) -> Option<&SyncCriteriaResolution> {
        self.criteria.as_ref()
    }

    /// Check if the last criteria resolution was `Ready`.
    pub fn is_ready(&self) -> bool {
        self.criteria.as_ref().is_some_and(|c| c.is_ready())
    }

    /// Check if shutdown was requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that drive the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The criteria resolver emitted a new resolution.
    CriteriaChanged(SyncCriteriaResolution),
    /// The application asked for a new attempt.
    RetryRequested,
    /// The application changed the connection policy.
    ConnectionPolicyChanged(ConnectionPolicy),
    /// The account is being torn down.
    ShutdownRequested,
    /// Progress reported by a run.
    Run {
        /// Which run reported.
        run: RunId,
        /// What happened.
        report: RunReport,
    },
}

/// Progress reported by a coordination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// A slow-sync step is about to execute.
    SlowSyncStep(SlowSyncStep),
    /// Slow sync finished successfully.
    SlowSyncCompleted,
    /// The local snapshot is fresh; slow sync was not needed.
    SlowSyncSkipped,
    /// Slow sync aborted. The run has ended.
    SlowSyncFailed(StepFailure),
    /// The incremental session changed status.
    Incremental(IncrementalSyncStatus),
    /// The run ended on its own.
    Ended(RunEnd),
}

/// Why a run ended without being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The event stream lost connectivity. Transient.
    ConnectivityLost(String),
    /// Events were lost; the staleness flag has been set.
    GapDetected,
    /// Applying an event failed in a way local state cannot recover from.
    Unrecoverable(String),
    /// Sync bookkeeping could not be read or written.
    StoreFailed(String),
    /// The session finished cleanly under the disconnect connection policy.
    Completed,
}

/// Actions to be executed by the coordinator actor.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Hard-cancel the run and wait until it is gone.
    CancelRun(RunId),
    /// Spawn a new run.
    StartRun(RunId),
    /// Publish a new sync status.
    PublishStatus(SyncStatus),
    /// Publish a new incremental session status.
    PublishIncremental(IncrementalSyncStatus),
    /// Set the staleness flag so the next run performs slow sync.
    MarkStale,
    /// Stop the coordinator.
    Stop,
}
