//! Cursor tracking for convo-sync.
//!
//! This module decides where an incremental session resumes and which
//! cursor writes a session performs:
//! - A cursor supplied by a just-completed slow sync beats the stored one
//! - Cursors advance strictly in stream order, one write per handled event
//! - An event id handled once in a session is never handled again in it, so
//!   a late redelivery can neither re-apply the event nor move the cursor back
//! - Re-handling the event that produced the last write never writes again
//!
//! Cursors are opaque: the stream's delivery order is the only ordering.

use std::collections::HashSet;
use sync_types::{Cursor, EventId};

/// Where an incremental session starts reading the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// Fresh cursor handed over by the slow sync that just completed.
    SlowSync(Cursor),
    /// Cursor persisted by a previous session.
    Stored(Cursor),
    /// No cursor known; the server decides where the stream starts.
    Beginning,
}

impl ResumePoint {
    /// Choose the resume point. The slow-sync cursor takes precedence.
    pub fn choose(slow_sync: Option<Cursor>, stored: Option<Cursor>) -> Self {
        match (slow_sync, stored) {
            (Some(cursor), _) => Self::SlowSync(cursor),
            (None, Some(cursor)) => Self::Stored(cursor),
            (None, None) => Self::Beginning,
        }
    }

    /// The cursor to subscribe from, if any.
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            Self::SlowSync(cursor) | Self::Stored(cursor) => Some(cursor),
            Self::Beginning => None,
        }
    }
}

/// Tracks the cursor of one incremental session.
#[derive(Debug, Clone)]
pub struct CursorTracker {
    resume: ResumePoint,
    last_written: Option<Cursor>,
    handled: HashSet<EventId>,
    advances: u64,
}

impl CursorTracker {
    /// Start tracking from a resume point.
    pub fn new(resume: ResumePoint) -> Self {
        Self {
            resume,
            last_written: None,
            handled: HashSet::new(),
            advances: 0,
        }
    }

    /// Whether the event `id` was already handled in this session.
    pub fn already_handled(&self, id: &EventId) -> bool {
        self.handled.contains(id)
    }

    /// Record that event `id`, carrying `cursor`, has been handled.
    ///
    /// Returns the cursor to persist, or `None` when the event was handled
    /// before in this session or its cursor equals the last persisted one.
    pub fn advance(&mut self, id: &EventId, cursor: &Cursor) -> Option<Cursor> {
        if !self.handled.insert(id.clone()) {
            return None;
        }
        if self.last_cursor() == Some(cursor) {
            return None;
        }
        self.last_written = Some(cursor.clone());
        self.advances += 1;
        Some(cursor.clone())
    }

    /// The most recent cursor: last written in this session, else the
    /// resume cursor.
    pub fn last_cursor(&self) -> Option<&Cursor> {
        self.last_written.as_ref().or_else(|| self.resume.cursor())
    }

    /// Where this session started.
    pub fn resume_point(&self) -> &ResumePoint {
        &self.resume
    }

    /// Number of cursor writes performed in this session.
    pub fn advances(&self) -> u64 {
        self.advances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_sync_cursor_takes_precedence() {
        let point = ResumePoint::choose(Some(Cursor::new("evt-200")), Some(Cursor::new("evt-100")));
        assert_eq!(point, ResumePoint::SlowSync(Cursor::new("evt-200")));
    }

    #[test]
    fn stored_cursor_used_without_slow_sync() {
        let point = ResumePoint::choose(None, Some(Cursor::new("evt-100")));
        assert_eq!(point.cursor(), Some(&Cursor::new("evt-100")));
    }

    #[test]
    fn no_cursor_starts_at_beginning() {
        assert_eq!(ResumePoint::choose(None, None), ResumePoint::Beginning);
        assert_eq!(ResumePoint::Beginning.cursor(), None);
    }

    #[test]
    fn tracker_starts_at_resume_cursor() {
        let tracker = CursorTracker::new(ResumePoint::Stored(Cursor::new("evt-100")));
        assert_eq!(tracker.last_cursor(), Some(&Cursor::new("evt-100")));
        assert_eq!(tracker.advances(), 0);
    }

    #[test]
    fn tracker_advances_in_stream_order() {
        let mut tracker = CursorTracker::new(ResumePoint::Stored(Cursor::new("evt-100")));

        for n in 101..=105 {
            let id = format!("evt-{n}");
            let cursor = Cursor::new(id.clone());
            assert_eq!(tracker.advance(&EventId::new(id), &cursor), Some(cursor.clone()));
        }

        assert_eq!(tracker.last_cursor(), Some(&Cursor::new("evt-105")));
        assert_eq!(tracker.advances(), 5);
    }

    #[test]
    fn redelivered_event_does_not_rewrite() {
        let mut tracker = CursorTracker::new(ResumePoint::Stored(Cursor::new("evt-100")));

        // The server may redeliver the resume event itself.
        assert_eq!(tracker.advance(&"evt-100".into(), &Cursor::new("evt-100")), None);

        tracker.advance(&"evt-101".into(), &Cursor::new("evt-101"));
        assert_eq!(tracker.advance(&"evt-101".into(), &Cursor::new("evt-101")), None);
        assert_eq!(tracker.advances(), 1);
    }

    #[test]
    fn late_redelivery_never_moves_cursor_back() {
        let mut tracker = CursorTracker::new(ResumePoint::Stored(Cursor::new("evt-100")));
        tracker.advance(&"evt-101".into(), &Cursor::new("evt-101"));
        tracker.advance(&"evt-102".into(), &Cursor::new("evt-102"));

        assert!(tracker.already_handled(&"evt-101".into()));
        assert_eq!(tracker.advance(&"evt-101".into(), &Cursor::new("evt-101")), None);
        assert_eq!(tracker.last_cursor(), Some(&Cursor::new("evt-102")));
        assert_eq!(tracker.advances(), 2);
    }

    #[test]
    fn unseen_event_is_not_handled() {
        let tracker = CursorTracker::new(ResumePoint::Beginning);
        assert!(!tracker.already_handled(&"evt-1".into()));
    }
}
