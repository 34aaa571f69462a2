//! # sync-core
//!
//! Pure logic for convo-sync (no I/O, instant tests).
//!
//! This crate implements the state machine and decision rules of the
//! conversation synchronization engine without any network or disk I/O,
//! enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (event stream, stores, slow-sync fetches) is performed by
//! `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod criteria;
pub mod cursor;
pub mod freshness;
pub mod plan;
pub mod state;

pub use buffer::{LiveEventVerdict, OfflineEventBuffer};
pub use criteria::{resolve, Criterion, DistinctUntilChanged};
pub use cursor::{CursorTracker, ResumePoint};
pub use freshness::{FreshnessPolicy, SlowSyncReason, SnapshotRecord};
pub use plan::{select_migrations, SlowSyncPlan};
pub use state::{Action, CoordinatorState, Event, RunEnd, RunId, RunPhase, RunReport};
