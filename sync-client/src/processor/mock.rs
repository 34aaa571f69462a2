//! Mock event processor for testing.
//!
//! Records applied events in order and tracks how many applications run
//! at the same time.

use super::EventProcessor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{DecodedEvent, EventId, ProcessingFailure};

/// Mock event processor for testing.
#[derive(Debug, Default)]
pub struct MockEventProcessor {
    inner: Arc<Mutex<MockEventProcessorInner>>,
}

#[derive(Debug, Default)]
struct MockEventProcessorInner {
    applied: Vec<EventId>,
    failures: HashMap<EventId, ProcessingFailure>,
    delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

impl MockEventProcessor {
    /// Create a new mock processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every application take `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().delay = Some(delay);
        self
    }

    /// Fail the event with the given id every time it is applied.
    pub fn fail_on(&self, id: impl Into<String>, failure: ProcessingFailure) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.insert(EventId::new(id), failure);
    }

    /// Ids of successfully applied events, in apply order.
    pub fn applied(&self) -> Vec<EventId> {
        let inner = self.inner.lock().unwrap();
        inner.applied.clone()
    }

    /// Ids of successfully applied events as strings.
    pub fn applied_ids(&self) -> Vec<String> {
        self.applied()
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    /// Highest number of concurrent `apply()` calls observed.
    pub fn max_in_flight(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.max_in_flight
    }
}

impl Clone for MockEventProcessor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl EventProcessor for MockEventProcessor {
    async fn apply(&self, event: &DecodedEvent) -> Result<(), ProcessingFailure> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.in_flight -= 1;
        if let Some(failure) = inner.failures.get(&event.id) {
            return Err(failure.clone());
        }
        inner.applied.push(event.id.clone());
        Ok(())
    }
}
