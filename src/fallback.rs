//! Fallback policy.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{Outcome, PolicyError};
use crate::events::{Emitter, EventSink, ExecutionEvent};

type Factory<V, E> = Arc<dyn Fn(&PolicyError<E>) -> V + Send + Sync>;

/// Replaces any failure with a substitute value.
///
/// Once a fallback is in place the caller never sees a failure; the original
/// error is only available to the factory given to [`FallbackPolicy::from_error`].
pub struct FallbackPolicy<V, E> {
    factory: Factory<V, E>,
    events: Emitter,
}

impl<V, E> Clone for FallbackPolicy<V, E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            events: self.events.clone(),
        }
    }
}

impl<V, E> fmt::Debug for FallbackPolicy<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<V, E> FallbackPolicy<V, E> {
    /// Substitutes the value produced by `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        Self::from_error(move |_| factory())
    }

    /// Substitutes a value computed from the failure being replaced.
    pub fn from_error<F>(factory: F) -> Self
    where
        F: Fn(&PolicyError<E>) -> V + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            events: Emitter::default(),
        }
    }

    /// Substitutes a clone of `value`.
    pub fn value(value: V) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        Self::new(move || value.clone())
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

    /// Runs `call`, turning any failure into the substitute value.
    pub async fn execute<Fut>(&self, call: Fut) -> Outcome<V, E>
    where
        Fut: Future<Output = Outcome<V, E>>,
    {
        match call.await {
            Ok(value) => Ok(value),
            Err(err) => {
                let cause = err.kind();
                tracing::debug!(cause = ?cause, "returning fallback value");
                self.events.emit(ExecutionEvent::FallbackInvoked { cause });
                Ok((self.factory)(&err))
            }
        }
    }
}
