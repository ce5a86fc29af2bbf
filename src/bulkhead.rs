//! Concurrency ceiling policy.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{ConfigError, Outcome, PolicyError};
use crate::events::{Emitter, EventSink, ExecutionEvent};

/// Default number of calls allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 1;

/// Caps the number of calls in flight through a pipeline.
///
/// A call arriving at capacity is rejected at once with
/// [`PolicyError::BulkheadRejected`]; nothing queues.
#[derive(Debug)]
pub struct BulkheadPolicy {
    permits: Semaphore,
    max_concurrent: usize,
    events: Emitter,
}

impl Default for BulkheadPolicy {
    fn default() -> Self {
        Self::build(DEFAULT_MAX_CONCURRENT)
    }
}

impl BulkheadPolicy {
    /// Creates a bulkhead admitting at most `max_concurrent` calls at once.
    pub fn new(max_concurrent: usize) -> Result<Self, ConfigError> {
        if max_concurrent == 0 || max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidMaxConcurrent(max_concurrent));
        }

        Ok(Self::build(max_concurrent))
    }

    fn build(max_concurrent: usize) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            events: Emitter::default(),
        }
    }

    /// Sets the sink receiving this policy's events.
    pub fn with_event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.events = Emitter::new(Arc::new(sink));
        self
    }

    pub(crate) fn attach_events(&mut self, events: &Emitter) {
        if !self.events.is_attached() {
            self.events = events.clone();
        }
    }

    /// Configured capacity.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `call` if a slot is free, holding the slot until `call` finishes or
    /// is dropped.
    pub async fn execute<V, E, Fut>(&self, call: Fut) -> Outcome<V, E>
    where
        Fut: Future<Output = Outcome<V, E>>,
    {
        let _permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    max_concurrent = self.max_concurrent,
                    "bulkhead at capacity, rejecting call"
                );
                self.events.emit(ExecutionEvent::BulkheadRejected {
                    max_concurrent: self.max_concurrent,
                });
                return Err(PolicyError::BulkheadRejected {
                    max_concurrent: self.max_concurrent,
                });
            }
        };

        call.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::oneshot;

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(
            BulkheadPolicy::new(0).unwrap_err(),
            ConfigError::InvalidMaxConcurrent(0)
        );
    }

    #[tokio::test]
    async fn rejects_while_full_and_releases_after() {
        let bulkhead = BulkheadPolicy::default();
        let (release, held) = oneshot::channel::<()>();

        let first = bulkhead.execute(async {
            let _ = held.await;
            Ok::<_, PolicyError<std::io::Error>>(1)
        });
        tokio::pin!(first);

        // Poll once so the first call takes the slot.
        assert!(first.as_mut().now_or_never().is_none());
        assert_eq!(bulkhead.in_flight(), 1);

        let second = bulkhead
            .execute(async { Ok::<_, PolicyError<std::io::Error>>(2) })
            .await;
        assert!(matches!(
            second,
            Err(PolicyError::BulkheadRejected { max_concurrent: 1 })
        ));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(bulkhead.in_flight(), 0);
        assert_eq!(bulkhead.available(), 1);
    }
}
