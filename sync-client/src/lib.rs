//! # sync-client
//!
//! Runtime of the convo-sync conversation synchronization engine.
//!
//! This is the library that messaging applications embed, one coordinator
//! per logged-in account.
//!
//! ## Features
//!
//! - **Criteria-driven**: sync runs exactly while session, client and network
//!   preconditions hold
//! - **Slow sync**: ordered snapshot rebuild with migrations, skipped while
//!   the local snapshot is fresh
//! - **Incremental sync**: serial event application with durable cursors and
//!   offline/live de-duplication
//! - **Pure State Machine**: Uses sync-core for side-effect-free decisions
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{CriteriaResolver, MemoryStore, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::builder()
//!     .event_stream(stream)
//!     .event_processor(processor)
//!     .step_runner(runner)
//!     .store(MemoryStore::new())
//!     .build()?;
//!
//! let handle = coordinator.start(CriteriaResolver::standard(session, client, network));
//! handle.wait_until_live_or_failure().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod criteria;
pub mod incremental;
pub mod processor;
pub mod slow;
pub mod store;
pub mod transport;

pub use config::{ConfigError, SyncConfig};
pub use coordinator::{BuildError, SyncCoordinator, SyncCoordinatorBuilder, SyncError, SyncHandle};
pub use criteria::CriteriaResolver;
pub use incremental::IncrementalSyncManager;
pub use processor::{EventProcessor, MockEventProcessor};
pub use slow::{
    Execution, Migration, MigrationError, MockMigration, MockStepRunner, SlowSyncEngine,
    SlowSyncOutcome, SlowSyncStepRunner, SLOW_SYNC_VERSION,
};
pub use store::{CursorStore, JsonFileStore, MemoryStore, SnapshotStore, StoreError};
pub use transport::{EventStream, EventSubscription, MockEventStream, StreamError, StreamItem};
pub use sync_types::ConnectionPolicy;
