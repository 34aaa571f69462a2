//! Event application.
//!
//! The sync core never interprets event payloads. It hands each decoded
//! event to an [`EventProcessor`] and waits for the result before pulling
//! the next one.

mod mock;

pub use mock::MockEventProcessor;

use async_trait::async_trait;
use sync_types::{DecodedEvent, ProcessingFailure};

/// Applies decoded events to local state.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Apply one event. Returns once local state reflects it.
    async fn apply(&self, event: &DecodedEvent) -> Result<(), ProcessingFailure>;
}
