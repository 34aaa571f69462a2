//! Event stream abstraction for convo-sync.
//!
//! This module provides a pluggable event source that abstracts the
//! underlying connection mechanism (websocket, mock for testing).
//!
//! # Design
//!
//! The stream is subscription-oriented:
//! - `subscribe()` opens a session resuming after a cursor
//! - `recv()` yields the next item of that session
//! - dropping the subscription closes it
//!
//! A session first replays pending events, then sends [`StreamItem::CaughtUp`]
//! and switches to live delivery.
//!
//! # Example
//!
//! ```ignore
//! let stream = MockEventStream::new();
//! let mut subscription = stream.subscribe(Some(&cursor)).await?;
//! while let StreamItem::Event { event, .. } = subscription.recv().await? {
//!     processor.apply(&event).await?;
//! }
//! ```

mod mock;

pub use mock::MockEventStream;

use async_trait::async_trait;
use sync_types::{Cursor, DecodedEvent, EventSource};
use thiserror::Error;

/// Something received on an event subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A decoded server event.
    Event {
        /// The event.
        event: DecodedEvent,
        /// Whether it was replayed or delivered live.
        source: EventSource,
    },
    /// Every pending event has been delivered.
    CaughtUp,
}

impl StreamItem {
    /// A replayed event.
    pub fn pending(event: DecodedEvent) -> Self {
        Self::Event {
            event,
            source: EventSource::Pending,
        }
    }

    /// A live event.
    pub fn live(event: DecodedEvent) -> Self {
        Self::Event {
            event,
            source: EventSource::Live,
        }
    }
}

/// Why a subscription stopped producing items.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The connection dropped.
    #[error("connectivity lost: {0}")]
    ConnectivityLost(String),

    /// The server no longer holds events after the requested cursor.
    #[error("event gap detected")]
    GapDetected,

    /// The server closed the session.
    #[error("stream closed")]
    Closed,
}

/// Source of server events.
///
/// Implementations handle the underlying connection mechanism
/// (websocket, mock, etc).
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Open a session delivering events after `from`.
    ///
    /// With no cursor the server decides where the session starts.
    async fn subscribe(
        &self,
        from: Option<&Cursor>,
    ) -> Result<Box<dyn EventSubscription>, StreamError>;
}

/// One open session on an [`EventStream`].
#[async_trait]
pub trait EventSubscription: Send {
    /// Receive the next item.
    ///
    /// Waits until an item is available or the session ends. Must be
    /// cancel-safe: dropping the future before it completes loses no item.
    async fn recv(&mut self) -> Result<StreamItem, StreamError>;
}
