//! Per-attempt timeout policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, Outcome, PolicyError};
use crate::events::{Emitter, EventSink, ExecutionEvent};

/// Default limit for a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds the wall-clock duration of one attempt.
///
/// On expiry the attempt future is dropped and its [`CancellationToken`] is
/// cancelled. Work the operation moved onto other tasks keeps running unless it
/// watches the token; the caller gets [`PolicyError::Timeout`] either way.
#[derive(Clone, Debug)]
pub struct TimeoutPolicy {
    limit: Duration,
    events: Emitter,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_ATTEMPT_TIMEOUT,
            events: Emitter::default(),
        }
    }
}

impl TimeoutPolicy {
    /// Creates a policy limiting each attempt to `limit`.
    pub fn new(limit: Duration) -> Result<Self, ConfigError> {
        if limit.is_zero() {
            return Err(ConfigError::ZeroDuration("attempt timeout"));
        }

        Ok(Self {
            limit,
            events: Emitter::default(),
        })
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

    /// The per-attempt limit.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Awaits `attempt` for at most the limit, cancelling `token` on expiry.
    pub async fn execute<V, E, Fut>(&self, token: CancellationToken, attempt: Fut) -> Outcome<V, E>
    where
        Fut: Future<Output = Result<V, E>>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.limit, attempt).await {
            Ok(result) => result.map_err(|source| PolicyError::OperationFailed {
                source,
                elapsed: started.elapsed(),
            }),
            Err(_) => {
                token.cancel();
                tracing::warn!(
                    limit = ?self.limit,
                    "attempt timed out, cancelling"
                );
                self.events
                    .emit(ExecutionEvent::TimedOut { limit: self.limit });
                Err(PolicyError::Timeout { limit: self.limit })
            }
        }
    }

    /// Creates a fresh token, starts `operation` with it and bounds the result.
    pub async fn call<V, E, F, Fut>(&self, operation: F) -> Outcome<V, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let token = CancellationToken::new();
        let attempt = operation(token.clone());
        self.execute(token, attempt).await
    }
}

/// Runs one attempt with no deadline, classifying its error.
pub(crate) async fn unbounded<V, E, Fut>(attempt: Fut) -> Outcome<V, E>
where
    Fut: Future<Output = Result<V, E>>,
{
    let started = Instant::now();
    attempt
        .await
        .map_err(|source| PolicyError::OperationFailed {
            source,
            elapsed: started.elapsed(),
        })
}
