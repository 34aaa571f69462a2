//! # sync-types
//!
//! Shared vocabulary for the convo-sync conversation synchronization engine.
//!
//! This crate provides the foundational types used across all convo-sync crates:
//! - [`Cursor`], [`EventId`] - Ordering and identity of server events
//! - [`DecodedEvent`] - An event as handed to the event processor
//! - [`SyncStatus`], [`IncrementalSyncStatus`], [`SlowSyncStep`] - Observable state
//! - [`SyncCriteriaResolution`] - Whether sync may run
//! - [`StepFailure`], [`ProcessingFailure`], [`SyncFailure`] - Error taxonomies

#![warn(missing_docs)]
#![warn(clippy::all)]

mod criteria;
mod error;
mod event;
mod ids;
mod status;

pub use criteria::{NotReadyReason, SyncCriteriaResolution};
pub use error::{ProcessingFailure, StepFailure, SyncFailure};
pub use event::{DecodedEvent, EventPayload, EventSource};
pub use ids::{Cursor, EventId, Version};
pub use status::{ConnectionPolicy, IncrementalSyncStatus, SlowSyncStep, SyncStatus};
