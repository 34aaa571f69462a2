//! Offline event buffer for convo-sync.
//!
//! When an incremental session opens, the server first replays the events
//! missed while offline and then switches to live delivery. Events that
//! arrive during the switch can be delivered through both paths. This
//! buffer remembers the ids of replayed events so their live duplicates
//! are dropped:
//! - A live event matching the most recent replayed one clears the buffer
//!   (everything older has necessarily been seen too)
//! - Any other match removes just that entry
//! - Capacity limits prevent unbounded growth on long replays

use std::collections::{HashSet, VecDeque};
use sync_types::EventId;

/// What the buffer said about a live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEventVerdict {
    /// Never replayed; apply it.
    New,
    /// Already applied through replay; skip it.
    Duplicate,
}

/// Remembers replayed event ids.
#[derive(Debug)]
pub struct OfflineEventBuffer {
    /// Maximum number of remembered ids.
    capacity: usize,
    /// Ids in replay order (oldest first).
    order: VecDeque<EventId>,
    /// Same ids, for lookups.
    ids: HashSet<EventId>,
}

impl OfflineEventBuffer {
    /// Create a buffer remembering at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Remember a replayed event. Evicts the oldest id when full.
    pub fn add(&mut self, id: EventId) {
        if self.capacity == 0 || self.ids.contains(&id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
    }

    /// Check a live event against the replayed ones.
    pub fn check_live(&mut self, id: &EventId) -> LiveEventVerdict {
        if !self.ids.contains(id) {
            return LiveEventVerdict::New;
        }
        if self.order.back() == Some(id) {
            self.clear();
        } else {
            self.ids.remove(id);
            self.order.retain(|entry| entry != id);
        }
        LiveEventVerdict::Duplicate
    }

    /// Check if an id is remembered.
    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EventId {
        EventId::new(s)
    }

    #[test]
    fn unknown_live_event_is_new() {
        let mut buffer = OfflineEventBuffer::new(10);
        buffer.add(id("a"));
        assert_eq!(buffer.check_live(&id("z")), LiveEventVerdict::New);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn live_duplicate_of_last_replayed_clears_buffer() {
        let mut buffer = OfflineEventBuffer::new(10);
        buffer.add(id("a"));
        buffer.add(id("b"));
        buffer.add(id("c"));

        assert_eq!(buffer.check_live(&id("c")), LiveEventVerdict::Duplicate);
        assert!(buffer.is_empty());
    }

    #[test]
    fn live_duplicate_of_older_replayed_removes_one() {
        let mut buffer = OfflineEventBuffer::new(10);
        buffer.add(id("a"));
        buffer.add(id("b"));

        assert_eq!(buffer.check_live(&id("a")), LiveEventVerdict::Duplicate);
        assert!(!buffer.contains(&id("a")));
        assert!(buffer.contains(&id("b")));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn duplicate_is_reported_only_once() {
        let mut buffer = OfflineEventBuffer::new(10);
        buffer.add(id("a"));
        buffer.add(id("b"));

        assert_eq!(buffer.check_live(&id("a")), LiveEventVerdict::Duplicate);
        assert_eq!(buffer.check_live(&id("a")), LiveEventVerdict::New);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut buffer = OfflineEventBuffer::new(2);
        buffer.add(id("a"));
        buffer.add(id("b"));
        buffer.add(id("c"));

        assert_eq!(buffer.len(), 2);
        assert!(!buffer.contains(&id("a")));
        assert!(buffer.contains(&id("c")));
    }

    #[test]
    fn re_adding_is_idempotent() {
        let mut buffer = OfflineEventBuffer::new(10);
        buffer.add(id("a"));
        buffer.add(id("a"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut buffer = OfflineEventBuffer::new(0);
        buffer.add(id("a"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.check_live(&id("a")), LiveEventVerdict::New);
    }
}
