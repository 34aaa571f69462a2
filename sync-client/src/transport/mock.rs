//! Mock event stream for testing.
//!
//! Allows scripting subscription sessions and capturing the cursors
//! subscriptions were opened from.

use super::{EventStream, EventSubscription, StreamError, StreamItem};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use sync_types::{Cursor, DecodedEvent};

type Script = VecDeque<Result<StreamItem, StreamError>>;

/// Mock event stream for testing.
///
/// Each `subscribe()` consumes the next scripted session. A session that
/// runs out of items (or an unscripted one) stays open and silent, like a
/// live connection with no traffic.
#[derive(Debug, Default)]
pub struct MockEventStream {
    inner: Arc<Mutex<MockEventStreamInner>>,
}

#[derive(Debug, Default)]
struct MockEventStreamInner {
    sessions: VecDeque<Script>,
    subscribed_from: Vec<Option<Cursor>>,
    open_subscriptions: usize,
    fail_next_subscribe: Option<StreamError>,
}

impl MockEventStream {
    /// Create a new mock stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the items of the next session.
    pub fn push_session(&self, items: impl IntoIterator<Item = Result<StreamItem, StreamError>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.push_back(items.into_iter().collect());
    }

    /// Script a session that replays `pending`, catches up, then delivers
    /// `live`.
    pub fn push_events(&self, pending: Vec<DecodedEvent>, live: Vec<DecodedEvent>) {
        let items = pending
            .into_iter()
            .map(StreamItem::pending)
            .chain(std::iter::once(StreamItem::CaughtUp))
            .chain(live.into_iter().map(StreamItem::live))
            .map(Ok);
        self.push_session(items);
    }

    /// Cursors passed to every `subscribe()` call, in call order.
    pub fn subscribed_from(&self) -> Vec<Option<Cursor>> {
        let inner = self.inner.lock().unwrap();
        inner.subscribed_from.clone()
    }

    /// Number of `subscribe()` calls that succeeded.
    pub fn subscriptions(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.subscribed_from.len()
    }

    /// Number of subscriptions not dropped yet.
    pub fn open_subscriptions(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.open_subscriptions
    }

    /// Cause the next subscribe() to fail with the given error.
    pub fn fail_next_subscribe(&self, error: StreamError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_subscribe = Some(error);
    }
}

impl Clone for MockEventStream {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl EventStream for MockEventStream {
    async fn subscribe(
        &self,
        from: Option<&Cursor>,
    ) -> Result<Box<dyn EventSubscription>, StreamError> {
        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(error);
        }

        inner.subscribed_from.push(from.cloned());
        inner.open_subscriptions += 1;
        let script = inner.sessions.pop_front().unwrap_or_default();

        Ok(Box::new(MockSubscription {
            script,
            stream: Arc::clone(&self.inner),
        }))
    }
}

struct MockSubscription {
    script: Script,
    stream: Arc<Mutex<MockEventStreamInner>>,
}

#[async_trait]
impl EventSubscription for MockSubscription {
    async fn recv(&mut self) -> Result<StreamItem, StreamError> {
        match self.script.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }
}

impl Drop for MockSubscription {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.stream.lock() {
            inner.open_subscriptions = inner.open_subscriptions.saturating_sub(1);
        }
    }
}
