//! Decoded server events as seen by the sync core.

use serde::{Deserialize, Serialize};

use crate::ids::{Cursor, EventId};

/// A server event after transport-level decoding.
///
/// The payload is opaque to the sync core; only the event processor
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Server-assigned identifier.
    pub id: EventId,
    /// Cursor to persist once this event has been applied.
    pub cursor: Cursor,
    /// Opaque event body.
    pub payload: EventPayload,
}

impl DecodedEvent {
    /// Create an event whose cursor equals its id, which is how the
    /// notification API addresses events.
    pub fn new(id: impl Into<String>, payload: EventPayload) -> Self {
        let id = id.into();
        Self {
            cursor: Cursor::new(id.clone()),
            id: EventId::new(id),
            payload,
        }
    }

    /// Override the cursor carried by this event.
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Opaque body of an event.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event type tag, e.g. `conversation.member-join`.
    pub kind: String,
    /// Encoded body, possibly still end-to-end encrypted.
    pub data: Vec<u8>,
}

impl EventPayload {
    /// Create a payload.
    pub fn new(kind: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

impl std::fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPayload")
            .field("kind", &self.kind)
            .field("data", &format!("[{} bytes REDACTED]", self.data.len()))
            .finish()
    }
}

/// Where an event came from within one incremental session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Replayed from the server's backlog of events missed while offline.
    Pending,
    /// Pushed over the live connection.
    Live,
}
