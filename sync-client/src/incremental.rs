//! Incremental sync manager.
//!
//! Consumes the event stream from a cursor and applies events one at a
//! time:
//! - The next event is pulled only after the current one is applied and its
//!   cursor written
//! - Recoverable processing failures skip the event; the cursor still moves
//!   past it
//! - Unrecoverable failures, gaps and connectivity loss end the session
//!
//! The connection policy is read from a `watch` channel. Switching to
//! [`ConnectionPolicy::DisconnectAfterPendingEvents`] while live ends the
//! session as soon as the event being applied is done.
//!
//! The manager never decides the overall sync status. It reports how the
//! session ended and leaves the rest to the coordinator.

use crate::processor::EventProcessor;
use crate::store::{CursorStore, SnapshotStore};
use crate::transport::{EventStream, StreamError, StreamItem};
use std::sync::Arc;
use sync_core::{CursorTracker, LiveEventVerdict, OfflineEventBuffer, ResumePoint, RunEnd};
use sync_types::{
    ConnectionPolicy, Cursor, DecodedEvent, EventSource, IncrementalSyncStatus, ProcessingFailure,
};
use tokio::sync::watch;

/// Default number of replayed event ids remembered for de-duplication.
pub const DEFAULT_OFFLINE_BUFFER_CAPACITY: usize = 1000;

/// Applies the event stream for one account.
pub struct IncrementalSyncManager {
    stream: Arc<dyn EventStream>,
    processor: Arc<dyn EventProcessor>,
    cursors: Arc<dyn CursorStore>,
    snapshots: Arc<dyn SnapshotStore>,
    policy: watch::Receiver<ConnectionPolicy>,
    buffer_capacity: usize,
}

impl IncrementalSyncManager {
    /// Create a manager with the default connection policy.
    pub fn new(
        stream: Arc<dyn EventStream>,
        processor: Arc<dyn EventProcessor>,
        cursors: Arc<dyn CursorStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            stream,
            processor,
            cursors,
            snapshots,
            policy: watch::channel(ConnectionPolicy::default()).1,
            buffer_capacity: DEFAULT_OFFLINE_BUFFER_CAPACITY,
        }
    }

    /// Use a fixed connection policy.
    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = watch::channel(policy).1;
        self
    }

    /// Follow the connection policy published on `policy`.
    pub fn with_policy_updates(mut self, policy: watch::Receiver<ConnectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Set how many replayed event ids are remembered.
    pub fn with_offline_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// The connection policy in effect right now.
    pub fn policy(&self) -> ConnectionPolicy {
        *self.policy.borrow()
    }

    /// Run one session until it ends.
    ///
    /// `slow_sync_cursor` is the cursor handed over by a slow sync that just
    /// completed; it takes precedence over the stored cursor. Dropping the
    /// returned future closes the subscription without writing a cursor for
    /// the event being applied.
    pub async fn run<F>(&self, slow_sync_cursor: Option<Cursor>, mut on_status: F) -> RunEnd
    where
        F: FnMut(IncrementalSyncStatus) + Send,
    {
        let stored = match self.cursors.get().await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!("Failed to read stored cursor: {}", e);
                return RunEnd::StoreFailed(e.to_string());
            }
        };
        let mut tracker = CursorTracker::new(ResumePoint::choose(slow_sync_cursor, stored));

        on_status(IncrementalSyncStatus::FetchingPendingEvents);
        tracing::info!(
            "Incremental sync starting from {:?}",
            tracker.resume_point()
        );

        let mut subscription = match self.stream.subscribe(tracker.resume_point().cursor()).await {
            Ok(subscription) => subscription,
            Err(e) => return self.stream_ended(e).await,
        };

        let mut buffer = OfflineEventBuffer::new(self.buffer_capacity);
        let mut live = false;
        let mut policy = self.policy.clone();
        policy.borrow_and_update();
        let mut policy_open = true;

        loop {
            // `recv` is cancel-safe, so losing the race to a policy change
            // drops no item.
            let received = tokio::select! {
                biased;
                received = subscription.recv() => received,
                changed = policy.changed(), if live && policy_open => {
                    if changed.is_err() {
                        policy_open = false;
                    } else if *policy.borrow_and_update()
                        == ConnectionPolicy::DisconnectAfterPendingEvents
                    {
                        tracing::info!("Connection policy changed, disconnecting");
                        return RunEnd::Completed;
                    }
                    continue;
                }
            };
            let item = match received {
                Ok(item) => item,
                Err(e) => return self.stream_ended(e).await,
            };

            match item {
                StreamItem::CaughtUp => {
                    if !live {
                        live = true;
                        on_status(IncrementalSyncStatus::Live);
                    }
                    if *policy.borrow_and_update() == ConnectionPolicy::DisconnectAfterPendingEvents {
                        tracing::info!("Pending events applied, disconnecting");
                        return RunEnd::Completed;
                    }
                }
                StreamItem::Event { event, source } => {
                    match source {
                        EventSource::Pending => buffer.add(event.id.clone()),
                        EventSource::Live => {
                            if !live {
                                live = true;
                                on_status(IncrementalSyncStatus::Live);
                            }
                            if buffer.check_live(&event.id) == LiveEventVerdict::Duplicate {
                                tracing::debug!(
                                    "Skipping live duplicate of replayed event {}",
                                    event.id.obfuscated()
                                );
                                continue;
                            }
                        }
                    }
                    if let Err(end) = self.handle(&event, &mut tracker).await {
                        return end;
                    }
                }
            }
        }
    }

    async fn handle(&self, event: &DecodedEvent, tracker: &mut CursorTracker) -> Result<(), RunEnd> {
        if tracker.already_handled(&event.id) {
            tracing::debug!(
                "Skipping event {} already handled in this session",
                event.id.obfuscated()
            );
            return Ok(());
        }

        match self.processor.apply(event).await {
            Ok(()) => {}
            Err(ProcessingFailure::Recoverable(reason)) => {
                tracing::warn!("Skipping event {}: {}", event.id.obfuscated(), reason);
            }
            Err(ProcessingFailure::Unrecoverable(reason)) => {
                tracing::error!(
                    "Event {} left local state inconsistent: {}",
                    event.id.obfuscated(),
                    reason
                );
                return Err(RunEnd::Unrecoverable(reason));
            }
        }

        match tracker.advance(&event.id, &event.cursor) {
            Some(cursor) => self.cursors.set(&cursor).await.map_err(|e| {
                tracing::error!("Failed to persist cursor: {}", e);
                RunEnd::StoreFailed(e.to_string())
            }),
            None => {
                tracing::debug!("Cursor {} already persisted", event.cursor);
                Ok(())
            }
        }
    }

    async fn stream_ended(&self, error: StreamError) -> RunEnd {
        match error {
            StreamError::ConnectivityLost(reason) => {
                tracing::warn!("Event stream lost connectivity: {}", reason);
                RunEnd::ConnectivityLost(reason)
            }
            StreamError::Closed => {
                tracing::warn!("Event stream closed by server");
                RunEnd::ConnectivityLost("stream closed".into())
            }
            StreamError::GapDetected => {
                tracing::warn!("Event gap detected, marking local state stale");
                match self.snapshots.mark_stale().await {
                    Ok(()) => RunEnd::GapDetected,
                    Err(e) => RunEnd::StoreFailed(e.to_string()),
                }
            }
        }
    }
}
