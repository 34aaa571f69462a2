//! Simulate command - run a coordinator against scripted collaborators.
//!
//! The server is a [`MockEventStream`] delivering `evt-N` events, numbered
//! on from the cursor already in the store. Breakpoints split the delivery
//! into sessions that end in an event gap or a connectivity loss, and the
//! simulation recovers from each the way an application would.

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use sync_client::{
    CriteriaResolver, CursorStore, JsonFileStore, MockEventProcessor, MockEventStream,
    MockStepRunner, StreamError, StreamItem, SyncConfig, SyncCoordinator, SyncHandle,
};
use sync_types::{
    Cursor, DecodedEvent, EventPayload, IncrementalSyncStatus, SlowSyncStep, StepFailure,
    SyncStatus,
};
use tokio::sync::watch;

/// Options for a simulation run.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// TOML configuration file.
    pub config: Option<PathBuf>,
    /// State file overriding the configured one.
    pub store: Option<PathBuf>,
    /// Number of events the server delivers.
    pub events: usize,
    /// Report an event gap after this many events.
    pub gap_after: Option<usize>,
    /// Drop connectivity after this many events.
    pub offline_after: Option<usize>,
    /// Slow-sync step to fail.
    pub fail_step: Option<String>,
}

/// How a scripted session ends before the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Breakpoint {
    Gap,
    Offline,
}

/// Result of a finished simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Ids of the events applied, in order.
    pub applied: Vec<String>,
    /// Cursor left in the store.
    pub cursor: Option<Cursor>,
    /// Slow-sync steps that ran to completion.
    pub slow_sync_steps: usize,
    /// Final sync status.
    pub status: SyncStatus,
}

/// Run the simulate command and print its summary.
pub async fn run(options: Options) -> Result<()> {
    let summary = simulate(options).await?;

    println!("Applied {} events", summary.applied.len());
    match &summary.cursor {
        Some(cursor) => println!("Cursor: {}", cursor),
        None => println!("Cursor: none"),
    }
    println!("Slow sync steps: {}", summary.slow_sync_steps);
    println!("Status: {:?}", summary.status);

    Ok(())
}

/// Run a simulation and report what happened.
pub async fn simulate(options: Options) -> Result<Summary> {
    let mut config = match &options.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(path) = &options.store {
        config.store.path = path.clone();
    }

    let fail_step = match &options.fail_step {
        Some(name) => Some(
            SlowSyncStep::parse(name).with_context(|| format!("unknown slow sync step '{}'", name))?,
        ),
        None => None,
    };

    let store = Arc::new(
        JsonFileStore::open(&config.store.path)
            .await
            .with_context(|| format!("failed to open store {}", config.store.path.display()))?,
    );
    let first = next_event_number(store.get().await?.as_ref());
    let ids: Vec<String> = (first..first + options.events as u64)
        .map(|n| format!("evt-{}", n))
        .collect();
    tracing::info!(
        "Simulating {} events starting at evt-{} (store: {})",
        ids.len(),
        first,
        store.path().display()
    );

    let stream = MockEventStream::new();
    let breakpoints = script_sessions(&stream, &ids, options.gap_after, options.offline_after);

    let runner = MockStepRunner::new();
    if first > 1 {
        runner.set_cursor(SlowSyncStep::SelfUser, Cursor::new(format!("evt-{}", first - 1)));
    }
    if let Some(step) = fail_step {
        runner.fail_step(step, StepFailure::Network("simulated failure".into()));
    }
    let processor = MockEventProcessor::new();

    let coordinator = SyncCoordinator::builder()
        .event_stream(Arc::new(stream))
        .event_processor(Arc::new(processor.clone()))
        .step_runner(Arc::new(runner.clone()))
        .cursor_store(store.clone())
        .snapshot_store(store.clone())
        .config(config)
        .build()?;

    let (_session, session_rx) = watch::channel(true);
    let (_client, client_rx) = watch::channel(true);
    let (network, network_rx) = watch::channel(true);
    let handle = coordinator.start(CriteriaResolver::standard(session_rx, client_rx, network_rx));

    let driven = drive(&handle, &network, &runner, &processor, breakpoints, ids.len()).await;
    let status = handle.status();
    handle.shutdown().await;
    driven?;

    Ok(Summary {
        applied: processor.applied_ids(),
        cursor: store.get().await?,
        slow_sync_steps: runner.completed_steps().len(),
        status,
    })
}

/// Number of the first event after `cursor`.
fn next_event_number(cursor: Option<&Cursor>) -> u64 {
    cursor
        .and_then(|c| c.as_str().strip_prefix("evt-"))
        .and_then(|n| n.parse::<u64>().ok())
        .map_or(1, |n| n + 1)
}

/// Script one session per breakpoint plus a final one that catches up.
///
/// Returns the breakpoints in the order the sessions hit them.
fn script_sessions(
    stream: &MockEventStream,
    ids: &[String],
    gap_after: Option<usize>,
    offline_after: Option<usize>,
) -> VecDeque<Breakpoint> {
    let mut breakpoints: Vec<(usize, Breakpoint)> = [
        gap_after.map(|at| (at, Breakpoint::Gap)),
        offline_after.map(|at| (at, Breakpoint::Offline)),
    ]
    .into_iter()
    .flatten()
    .map(|(at, kind)| (at.min(ids.len()), kind))
    .collect();
    breakpoints.sort();

    let event =
        |id: &String| DecodedEvent::new(id.clone(), EventPayload::new("simulated", Vec::new()));

    let mut delivered = 0;
    for &(at, kind) in &breakpoints {
        let end = match kind {
            Breakpoint::Gap => StreamError::GapDetected,
            Breakpoint::Offline => StreamError::ConnectivityLost("simulated network loss".into()),
        };
        let items = ids[delivered..at]
            .iter()
            .map(|id| Ok(StreamItem::pending(event(id))))
            .chain(std::iter::once(Err(end)));
        stream.push_session(items);
        delivered = at;
    }
    stream.push_events(ids[delivered..].iter().map(event).collect(), Vec::new());

    breakpoints.into_iter().map(|(_, kind)| kind).collect()
}

/// Drive the coordinator until the last session caught up.
async fn drive(
    handle: &SyncHandle,
    network: &watch::Sender<bool>,
    runner: &MockStepRunner,
    processor: &MockEventProcessor,
    mut breakpoints: VecDeque<Breakpoint>,
    total: usize,
) -> Result<()> {
    let mut status = handle.subscribe_status();
    let mut incremental = handle.subscribe_incremental();

    loop {
        let current = status.borrow_and_update().clone();
        if let SyncStatus::Failed { cause, .. } = &current {
            bail!("sync failed: {}", cause);
        }

        let session = incremental.borrow_and_update().clone();
        match session {
            IncrementalSyncStatus::Live => return Ok(()),
            IncrementalSyncStatus::Interrupted(reason) => {
                let Some(breakpoint) = breakpoints.pop_front() else {
                    bail!("incremental sync interrupted: {}", reason);
                };
                tracing::info!("Session interrupted ({}), recovering", reason);
                recover(handle, network, runner, processor, breakpoint).await?;
                incremental
                    .wait_for(|s| !matches!(s, IncrementalSyncStatus::Interrupted(_)))
                    .await?;
                continue;
            }
            // Sessions that disconnect once caught up may pass Live unseen.
            IncrementalSyncStatus::Pending
                if breakpoints.is_empty()
                    && current == SyncStatus::SlowSyncCompleted
                    && processor.applied().len() >= total =>
            {
                return Ok(());
            }
            IncrementalSyncStatus::Pending | IncrementalSyncStatus::FetchingPendingEvents => {}
        }

        tokio::select! {
            changed = status.changed() => changed?,
            changed = incremental.changed() => changed?,
        }
    }
}

async fn recover(
    handle: &SyncHandle,
    network: &watch::Sender<bool>,
    runner: &MockStepRunner,
    processor: &MockEventProcessor,
    breakpoint: Breakpoint,
) -> Result<()> {
    match breakpoint {
        Breakpoint::Gap => {
            // The rebuilt snapshot is current up to the last delivered event.
            if let Some(last) = processor.applied().last() {
                runner.set_cursor(SlowSyncStep::SelfUser, Cursor::new(last.as_str()));
            }
            handle.retry().await?;
        }
        Breakpoint::Offline => {
            network.send_replace(false);
            handle
                .subscribe_incremental()
                .wait_for(|s| *s == IncrementalSyncStatus::Pending)
                .await?;
            network.send_replace(true);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sync_client::SnapshotStore;

    // Every step except Migration, which is not a data step.
    const DATA_STEPS: usize = SlowSyncStep::ALL.len() - 1;

    fn options(store: PathBuf, events: usize) -> Options {
        Options {
            store: Some(store),
            events,
            ..Options::default()
        }
    }

    async fn simulate_with_timeout(options: Options) -> Result<Summary> {
        tokio::time::timeout(Duration::from_secs(5), simulate(options))
            .await
            .expect("simulation should finish")
    }

    #[test]
    fn event_numbering_continues_from_cursor() {
        assert_eq!(next_event_number(None), 1);
        assert_eq!(next_event_number(Some(&Cursor::new("evt-41"))), 42);
        assert_eq!(next_event_number(Some(&Cursor::new("opaque"))), 1);
    }

    #[tokio::test]
    async fn cold_start_applies_all_events() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.json");

        let summary = simulate_with_timeout(options(path, 3)).await.unwrap();

        assert_eq!(summary.applied, vec!["evt-1", "evt-2", "evt-3"]);
        assert_eq!(summary.cursor, Some(Cursor::new("evt-3")));
        assert_eq!(summary.slow_sync_steps, DATA_STEPS);
        assert_eq!(summary.status, SyncStatus::SlowSyncCompleted);
    }

    #[tokio::test]
    async fn second_run_resumes_without_slow_sync() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.json");

        simulate_with_timeout(options(path.clone(), 2)).await.unwrap();
        let summary = simulate_with_timeout(options(path, 2)).await.unwrap();

        assert_eq!(summary.applied, vec!["evt-3", "evt-4"]);
        assert_eq!(summary.cursor, Some(Cursor::new("evt-4")));
        assert_eq!(summary.slow_sync_steps, 0);
    }

    #[tokio::test]
    async fn recovers_from_connectivity_loss() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.json");
        let mut opts = options(path, 5);
        opts.offline_after = Some(2);

        let summary = simulate_with_timeout(opts).await.unwrap();

        assert_eq!(
            summary.applied,
            vec!["evt-1", "evt-2", "evt-3", "evt-4", "evt-5"]
        );
        assert_eq!(summary.cursor, Some(Cursor::new("evt-5")));
        // Resuming after the outage does not rebuild the snapshot.
        assert_eq!(summary.slow_sync_steps, DATA_STEPS);
    }

    #[tokio::test]
    async fn recovers_from_gap_with_slow_sync() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.json");
        let mut opts = options(path.clone(), 4);
        opts.gap_after = Some(2);

        let summary = simulate_with_timeout(opts).await.unwrap();

        assert_eq!(summary.applied, vec!["evt-1", "evt-2", "evt-3", "evt-4"]);
        assert_eq!(summary.cursor, Some(Cursor::new("evt-4")));
        assert_eq!(summary.slow_sync_steps, 2 * DATA_STEPS);

        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(!store.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn failing_step_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.json");
        let mut opts = options(path, 2);
        opts.fail_step = Some("conversations".into());

        let err = simulate_with_timeout(opts).await.unwrap_err();
        assert!(err.to_string().contains("sync failed"));
    }

    #[tokio::test]
    async fn unknown_step_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let mut opts = options(temp.path().join("state.json"), 1);
        opts.fail_step = Some("everything".into());

        let err = simulate(opts).await.unwrap_err();
        assert!(err.to_string().contains("unknown slow sync step"));
    }
}
