//! Configuration for resilience pipelines.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub use crate::breaker::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_DURATION};
pub use crate::bulkhead::DEFAULT_MAX_CONCURRENT;
pub use crate::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use crate::timeout::DEFAULT_ATTEMPT_TIMEOUT;

use crate::breaker::CircuitBreakerPolicy;
use crate::bulkhead::BulkheadPolicy;
use crate::error::ConfigError;
use crate::events::{Emitter, EventSink};
use crate::fallback::FallbackPolicy;
use crate::pipeline::{Pipeline, PipelineInner};
use crate::retry::{DelayStrategy, RetryPolicy};
use crate::timeout::TimeoutPolicy;

/// Builder for creating pipelines from individually configured policies.
///
/// Any subset of policies may be set, in any order; the pipeline always applies
/// them as `Fallback → Bulkhead → Breaker → Retry → Timeout`.
pub struct PipelineBuilder<V, E> {
    name: String,
    retry: Option<RetryPolicy>,
    breaker: Option<CircuitBreakerPolicy>,
    timeout: Option<TimeoutPolicy>,
    bulkhead: Option<BulkheadPolicy>,
    fallback: Option<FallbackPolicy<V, E>>,
    event_sink: Option<Arc<dyn EventSink>>,
    _types: PhantomData<fn() -> (V, E)>,
}

impl<V, E> Default for PipelineBuilder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> PipelineBuilder<V, E> {
    /// Creates a new builder with no policies.
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            retry: None,
            breaker: None,
            timeout: None,
            bulkhead: None,
            fallback: None,
            event_sink: None,
            _types: PhantomData,
        }
    }

    /// Creates a builder with retry, breaker, timeout and bulkhead at their
    /// default settings and no fallback.
    pub fn with_defaults() -> Self {
        Self::new()
            .retry(RetryPolicy::default())
            .breaker(CircuitBreakerPolicy::default())
            .timeout(TimeoutPolicy::default())
            .bulkhead(BulkheadPolicy::default())
    }

    /// Sets the name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the circuit breaker.
    pub fn breaker(mut self, breaker: CircuitBreakerPolicy) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the bulkhead.
    pub fn bulkhead(mut self, bulkhead: BulkheadPolicy) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Sets the fallback.
    pub fn fallback(mut self, fallback: FallbackPolicy<V, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets a fallback returning a clone of `value`.
    pub fn fallback_value(self, value: V) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.fallback(FallbackPolicy::value(value))
    }

    /// Sets the sink receiving events from every policy that has none of its own.
    pub fn event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.event_sink = Some(Arc::new(sink));
        self
    }

    /// Like [`PipelineBuilder::event_sink`] for a sink the caller keeps a handle to.
    pub fn shared_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline<V, E> {
        let mut inner = PipelineInner {
            name: self.name,
            fallback: self.fallback,
            bulkhead: self.bulkhead,
            breaker: self.breaker,
            retry: self.retry,
            timeout: self.timeout,
        };

        if let Some(sink) = self.event_sink {
            let events = Emitter::new(sink);
            if let Some(fallback) = inner.fallback.as_mut() {
                fallback.attach_events(&events);
            }
            if let Some(bulkhead) = inner.bulkhead.as_mut() {
                bulkhead.attach_events(&events);
            }
            if let Some(breaker) = inner.breaker.as_mut() {
                breaker.attach_events(&events);
            }
            if let Some(retry) = inner.retry.as_mut() {
                retry.attach_events(&events);
            }
            if let Some(timeout) = inner.timeout.as_mut() {
                timeout.attach_events(&events);
            }
        }

        tracing::debug!(
            pipeline = %inner.name,
            retry = inner.retry.is_some(),
            breaker = inner.breaker.is_some(),
            timeout = inner.timeout.is_some(),
            bulkhead = inner.bulkhead.is_some(),
            fallback = inner.fallback.is_some(),
            "pipeline built"
        );

        Pipeline::from_inner(inner)
    }
}

/// Numeric settings for the four stateful policies.
///
/// With the `serde` feature this deserializes from any serde format, durations
/// written in humantime form (`"1s"`, `"250ms"`) and missing fields defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResilienceConfig {
    /// Attempts per logical call, the first included.
    pub max_attempts: u32,

    /// Constant delay before each retry.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub retry_delay: Duration,

    /// Consecutive failed calls that open the breaker.
    pub failure_threshold: u64,

    /// How long the breaker stays open.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub open_duration: Duration,

    /// Limit for a single attempt.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub attempt_timeout: Duration,

    /// Calls allowed in flight at once.
    pub max_concurrent: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_duration: DEFAULT_OPEN_DURATION,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl ResilienceConfig {
    /// Validates the settings and returns a builder holding the retry, breaker,
    /// timeout and bulkhead policies they describe.
    pub fn pipeline_builder<V, E>(&self) -> Result<PipelineBuilder<V, E>, ConfigError> {
        Ok(PipelineBuilder::new()
            .retry(RetryPolicy::new(
                self.max_attempts,
                DelayStrategy::Constant(self.retry_delay),
            )?)
            .breaker(CircuitBreakerPolicy::new(
                self.failure_threshold,
                self.open_duration,
            )?)
            .timeout(TimeoutPolicy::new(self.attempt_timeout)?)
            .bulkhead(BulkheadPolicy::new(self.max_concurrent)?))
    }
}
