//! Sync criteria resolver.
//!
//! Watches the precondition signals of one account and turns them into a
//! stream of [`SyncCriteriaResolution`]s. The current resolution is sent as
//! soon as the resolver starts; after that only changes are sent.
//!
//! A signal whose sender is dropped keeps its last value.

use futures_util::future::select_all;
use sync_core::{resolve, Criterion, DistinctUntilChanged};
use sync_types::{NotReadyReason, SyncCriteriaResolution};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Capacity of the resolution channel.
const RESOLUTION_BUFFER: usize = 16;

struct Signal {
    reason: NotReadyReason,
    rx: watch::Receiver<bool>,
    open: bool,
}

/// Combines precondition signals into sync criteria resolutions.
#[derive(Default)]
pub struct CriteriaResolver {
    signals: Vec<Signal>,
}

impl CriteriaResolver {
    /// A resolver with no signals; it resolves to `Ready`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The session, registered-client and network signals.
    pub fn standard(
        session: watch::Receiver<bool>,
        client: watch::Receiver<bool>,
        network: watch::Receiver<bool>,
    ) -> Self {
        Self::new()
            .with_signal(NotReadyReason::MissingCredentials, session)
            .with_signal(NotReadyReason::MissingRegisteredClient, client)
            .with_signal(NotReadyReason::NoNetwork, network)
    }

    /// Add a signal. `reason` is reported while the signal is `false`.
    pub fn with_signal(mut self, reason: NotReadyReason, rx: watch::Receiver<bool>) -> Self {
        self.signals.push(Signal {
            reason,
            rx,
            open: true,
        });
        self
    }

    /// Resolve the current signal values.
    pub fn current(&self) -> SyncCriteriaResolution {
        let criteria: Vec<Criterion> = self
            .signals
            .iter()
            .map(|s| Criterion::new(s.reason.clone(), *s.rx.borrow()))
            .collect();
        resolve(&criteria)
    }

    /// Start watching the signals.
    ///
    /// The task ends when the returned receiver is dropped.
    pub fn spawn(mut self) -> (mpsc::Receiver<SyncCriteriaResolution>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(RESOLUTION_BUFFER);

        let handle = tokio::spawn(async move {
            let mut distinct = DistinctUntilChanged::new();
            loop {
                for signal in &mut self.signals {
                    signal.rx.borrow_and_update();
                }
                if let Some(resolution) = distinct.observe(self.current()) {
                    tracing::debug!("Sync criteria resolved to {:?}", resolution);
                    if tx.send(resolution).await.is_err() {
                        return;
                    }
                }

                let open: Vec<usize> = (0..self.signals.len())
                    .filter(|&i| self.signals[i].open)
                    .collect();
                if open.is_empty() {
                    // Nothing can change any more.
                    tx.closed().await;
                    return;
                }

                let closed = {
                    let changes = self
                        .signals
                        .iter_mut()
                        .filter(|s| s.open)
                        .map(|s| Box::pin(s.rx.changed()));
                    tokio::select! {
                        (result, index, _) = select_all(changes) => result.is_err().then_some(open[index]),
                        _ = tx.closed() => return,
                    }
                };
                if let Some(i) = closed {
                    tracing::debug!("Criteria signal '{}' closed", self.signals[i].reason);
                    self.signals[i].open = false;
                }
            }
        });

        (rx, handle)
    }
}
