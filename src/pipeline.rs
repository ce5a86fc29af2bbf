//! The composed policy pipeline.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::breaker::CircuitBreakerPolicy;
use crate::bulkhead::BulkheadPolicy;
use crate::config::PipelineBuilder;
use crate::error::Outcome;
use crate::fallback::FallbackPolicy;
use crate::retry::RetryPolicy;
use crate::timeout::{self, TimeoutPolicy};

pub(crate) struct PipelineInner<V, E> {
    pub(crate) name: String,
    pub(crate) fallback: Option<FallbackPolicy<V, E>>,
    pub(crate) bulkhead: Option<BulkheadPolicy>,
    pub(crate) breaker: Option<CircuitBreakerPolicy>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) timeout: Option<TimeoutPolicy>,
}

/// A fixed-order stack of resilience policies around an async operation.
///
/// Calls flow `Fallback → Bulkhead → Breaker → Retry → Timeout → operation`,
/// whichever of those layers are configured. Breaker and bulkhead state belong to
/// the pipeline and are shared by every call and every clone.
pub struct Pipeline<V, E> {
    inner: Arc<PipelineInner<V, E>>,
}

impl<V, E> Pipeline<V, E> {
    pub(crate) fn from_inner(inner: PipelineInner<V, E>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a new builder with no policies configured.
    pub fn builder() -> PipelineBuilder<V, E> {
        PipelineBuilder::new()
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The circuit breaker, if configured.
    pub fn breaker(&self) -> Option<&CircuitBreakerPolicy> {
        self.inner.breaker.as_ref()
    }

    /// The bulkhead, if configured.
    pub fn bulkhead(&self) -> Option<&BulkheadPolicy> {
        self.inner.bulkhead.as_ref()
    }

    /// The retry policy, if configured.
    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.inner.retry.as_ref()
    }

    /// The timeout policy, if configured.
    pub fn timeout(&self) -> Option<&TimeoutPolicy> {
        self.inner.timeout.as_ref()
    }

    /// Whether failures are replaced by a fallback value.
    pub fn has_fallback(&self) -> bool {
        self.inner.fallback.is_some()
    }

    /// Runs `operation` through every configured policy.
    ///
    /// `operation` is invoked once per attempt with a fresh [`CancellationToken`],
    /// cancelled if that attempt times out.
    pub async fn execute<F, Fut>(&self, mut operation: F) -> Outcome<V, E>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let inner = &*self.inner;
        let span = tracing::debug_span!("resilience", pipeline = %inner.name);

        let timeout = inner.timeout.as_ref();
        let operation = &mut operation;
        let attempt = move |number: u32| {
            let token = CancellationToken::new();
            tracing::trace!(attempt = number, "starting attempt");
            let call = operation(token.clone());
            run_attempt(timeout, token, call)
        };

        let retry = inner.retry.as_ref();
        let retried = async move {
            match retry {
                Some(retry) => retry.execute(attempt).await,
                None => {
                    let mut attempt = attempt;
                    attempt(1).await
                }
            }
        };

        let breaker = inner.breaker.as_ref();
        let guarded = async move {
            match breaker {
                Some(breaker) => breaker.execute(retried).await,
                None => retried.await,
            }
        };

        let bulkhead = inner.bulkhead.as_ref();
        let isolated = async move {
            match bulkhead {
                Some(bulkhead) => bulkhead.execute(guarded).await,
                None => guarded.await,
            }
        };

        let outcome = async move {
            match &inner.fallback {
                Some(fallback) => fallback.execute(isolated).await,
                None => isolated.await,
            }
        };

        outcome.instrument(span).await
    }
}

async fn run_attempt<V, E, Fut>(
    timeout: Option<&TimeoutPolicy>,
    token: CancellationToken,
    call: Fut,
) -> Outcome<V, E>
where
    Fut: Future<Output = Result<V, E>>,
{
    match timeout {
        Some(timeout) => timeout.execute(token, call).await,
        None => timeout::unbounded(call).await,
    }
}

impl<V, E> Clone for Pipeline<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> std::fmt::Debug for Pipeline<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.inner.name)
            .field("fallback", &self.inner.fallback.is_some())
            .field("bulkhead", &self.inner.bulkhead)
            .field("breaker", &self.inner.breaker.as_ref().map(|b| b.current_state()))
            .field("retry", &self.inner.retry)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::retry::DelayStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn empty_pipeline_runs_operation_once() {
        let pipeline = Pipeline::<u32, std::io::Error>::builder().build();
        let calls = AtomicU32::new(0);

        let outcome = pipeline
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(std::io::Error::other("nope")) }
            })
            .await;

        assert!(matches!(outcome, Err(PolicyError::OperationFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_attempt_gets_a_fresh_token() {
        let pipeline = Pipeline::<(), std::io::Error>::builder()
            .retry(RetryPolicy::new(3, DelayStrategy::Constant(Duration::ZERO)).unwrap())
            .build();
        let mut tokens = Vec::new();

        let _ = pipeline
            .execute(|token| {
                tokens.push(token);
                async { Err(std::io::Error::other("nope")) }
            })
            .await;

        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|token| !token.is_cancelled()));
    }
}
