//! Identity and ordering types for convo-sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque server-issued marker of the last event applied to local state.
///
/// The sync core never interprets the contents. Ordering is defined by the
/// event stream: a cursor is "newer" than another when the server delivered
/// its event later.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a server-issued marker.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw marker.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw marker.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", self.0)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Unique identifier of a server event.
///
/// Used to recognise the same event arriving through both the pending
/// (replay) source and the live source.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap a server event identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines. Event ids are user-correlated, so
    /// logs only ever carry the first few characters.
    pub fn obfuscated(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}***")
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A schema/protocol version used for migration selection.
pub type Version = u32;
