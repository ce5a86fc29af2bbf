//! Retry policy and delay strategies.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, Outcome};
use crate::events::{Emitter, EventSink, ExecutionEvent};

/// Default number of attempts, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default constant delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Computes the wait before an attempt from its number.
///
/// Attempt numbers start at 1; the first retry is attempt 2.
#[derive(Clone)]
pub enum DelayStrategy {
    /// Same delay before every retry.
    Constant(Duration),

    /// `step * (attempt - 1)`: the first retry waits `step`, the next `2 * step`.
    Linear(Duration),

    /// Doubles from `base` on the first retry, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound on any delay.
        max: Duration,
    },

    /// Arbitrary function of the upcoming attempt number.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayStrategy {
    /// Builds a [`DelayStrategy::Custom`] from a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        DelayStrategy::Custom(Arc::new(f))
    }

    /// Delay to wait before running `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let retry = attempt.saturating_sub(1).max(1);
        match self {
            DelayStrategy::Constant(delay) => *delay,
            DelayStrategy::Linear(step) => step.saturating_mul(retry),
            DelayStrategy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry - 1);
                base.saturating_mul(factor).min(*max)
            }
            DelayStrategy::Custom(f) => f(attempt),
        }
    }
}

impl Default for DelayStrategy {
    fn default() -> Self {
        DelayStrategy::Constant(DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for DelayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayStrategy::Constant(delay) => f.debug_tuple("Constant").field(delay).finish(),
            DelayStrategy::Linear(step) => f.debug_tuple("Linear").field(step).finish(),
            DelayStrategy::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            DelayStrategy::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Re-runs failed attempts up to a bound.
///
/// Only failures of real attempts (operation errors and timeouts) are retried;
/// policy rejections are returned as they are.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayStrategy,
    events: Emitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DelayStrategy::default(),
            events: Emitter::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy making at most `max_attempts` attempts.
    pub fn new(max_attempts: u32, delay: DelayStrategy) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(max_attempts));
        }

        Ok(Self {
            max_attempts,
            delay,
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

    /// Maximum number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay strategy.
    pub fn delay(&self) -> &DelayStrategy {
        &self.delay
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn execute<V, E, A, Fut>(&self, mut attempt: A) -> Outcome<V, E>
    where
        A: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome<V, E>>,
    {
        let mut number = 1;
        loop {
            let err = match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || number >= self.max_attempts {
                if number > 1 {
                    tracing::debug!(attempts = number, kind = ?err.kind(), "retries exhausted");
                }
                return Err(err);
            }

            number += 1;
            let delay = self.delay.delay_for(number);
            tracing::debug!(
                attempt = number,
                delay = ?delay,
                kind = ?err.kind(),
                "retrying after failed attempt"
            );
            self.events.emit(ExecutionEvent::Retrying {
                attempt: number,
                delay,
            });

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
