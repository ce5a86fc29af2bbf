//! Execution events and the sinks that receive them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::FailureKind;

/// Something a policy did while handling a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Retry is about to re-invoke the operation.
    Retrying {
        /// Number of the upcoming attempt (the first retry is attempt 2).
        attempt: u32,
        /// Delay waited before that attempt.
        delay: Duration,
    },

    /// The circuit breaker opened.
    BreakerOpened,

    /// The circuit breaker admitted a trial call after its open duration.
    BreakerHalfOpened,

    /// The circuit breaker closed after a successful trial.
    BreakerClosed,

    /// The bulkhead rejected a call at capacity.
    BulkheadRejected {
        /// Capacity of the bulkhead.
        max_concurrent: usize,
    },

    /// An attempt exceeded its time limit.
    TimedOut {
        /// The limit that elapsed.
        limit: Duration,
    },

    /// The fallback replaced a failure with its substitute value.
    FallbackInvoked {
        /// Kind of the failure that was replaced.
        cause: FailureKind,
    },
}

/// Payload-free discriminant of an [`ExecutionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`ExecutionEvent::Retrying`].
    Retrying,
    /// See [`ExecutionEvent::BreakerOpened`].
    BreakerOpened,
    /// See [`ExecutionEvent::BreakerHalfOpened`].
    BreakerHalfOpened,
    /// See [`ExecutionEvent::BreakerClosed`].
    BreakerClosed,
    /// See [`ExecutionEvent::BulkheadRejected`].
    BulkheadRejected,
    /// See [`ExecutionEvent::TimedOut`].
    TimedOut,
    /// See [`ExecutionEvent::FallbackInvoked`].
    FallbackInvoked,
}

impl ExecutionEvent {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::Retrying { .. } => EventKind::Retrying,
            ExecutionEvent::BreakerOpened => EventKind::BreakerOpened,
            ExecutionEvent::BreakerHalfOpened => EventKind::BreakerHalfOpened,
            ExecutionEvent::BreakerClosed => EventKind::BreakerClosed,
            ExecutionEvent::BulkheadRejected { .. } => EventKind::BulkheadRejected,
            ExecutionEvent::TimedOut { .. } => EventKind::TimedOut,
            ExecutionEvent::FallbackInvoked { .. } => EventKind::FallbackInvoked,
        }
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEvent::Retrying { attempt, delay } => {
                write!(f, "Retrying: attempt {} in {:?}", attempt, delay)
            }
            ExecutionEvent::BreakerOpened => write!(f, "Breaker opened"),
            ExecutionEvent::BreakerHalfOpened => write!(f, "Breaker half-open"),
            ExecutionEvent::BreakerClosed => write!(f, "Breaker closed"),
            ExecutionEvent::BulkheadRejected { max_concurrent } => {
                write!(f, "Bulkhead rejected call ({} in flight)", max_concurrent)
            }
            ExecutionEvent::TimedOut { limit } => write!(f, "Attempt timed out after {:?}", limit),
            ExecutionEvent::FallbackInvoked { cause } => {
                write!(f, "Fallback invoked after {:?}", cause)
            }
        }
    }
}

/// Receiver for execution events.
///
/// Sinks are called synchronously on the task that produced the event, so they
/// should hand slow work off elsewhere (see [`ChannelEventSink`]).
pub trait EventSink: Send + Sync + 'static {
    /// Receives one event.
    fn emit(&self, event: &ExecutionEvent);
}

impl<F> EventSink for F
where
    F: Fn(&ExecutionEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: &ExecutionEvent) {
        self(event)
    }
}

/// A sink that discards all events.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &ExecutionEvent) {}
}

/// A sink that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::Retrying { attempt, delay } => tracing::info!(
                attempt = *attempt,
                delay = ?delay,
                "Retrying: {}",
                attempt.saturating_sub(1)
            ),
            ExecutionEvent::BreakerOpened => tracing::warn!("Breaker Hit"),
            ExecutionEvent::BreakerHalfOpened => tracing::info!("Breaker half-open, probing"),
            ExecutionEvent::BreakerClosed => tracing::info!("Breaker reset"),
            ExecutionEvent::BulkheadRejected { max_concurrent } => {
                tracing::warn!(max_concurrent = *max_concurrent, "Bulkhead rejected call")
            }
            ExecutionEvent::TimedOut { limit } => {
                tracing::warn!(limit = ?limit, "Attempt timed out")
            }
            ExecutionEvent::FallbackInvoked { cause } => {
                tracing::info!(cause = ?cause, "Fallback response returned")
            }
        }
    }
}

/// A sink that forwards events into an unbounded tokio channel.
///
/// Events emitted after the receiver is dropped are discarded.
pub struct ChannelEventSink {
    tx: UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    /// Creates a sink sending into `tx`.
    pub fn new(tx: UnboundedSender<ExecutionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &ExecutionEvent) {
        let _ = self.tx.send(event.clone());
    }
}

static NULL_SINK: Lazy<Arc<dyn EventSink>> = Lazy::new(|| Arc::new(NullEventSink));

/// Shared handle to the sink a policy emits into.
#[derive(Clone)]
pub(crate) struct Emitter {
    sink: Arc<dyn EventSink>,
    attached: bool,
}

impl Emitter {
    pub(crate) fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            attached: true,
        }
    }

    /// Whether a sink was explicitly installed.
    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn emit(&self, event: ExecutionEvent) {
        self.sink.emit(&event);
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("attached", &self.attached)
            .finish()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            sink: Arc::clone(&NULL_SINK),
            attached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let emitter = Emitter::new(Arc::new(move |event: &ExecutionEvent| {
            captured.lock().push(event.kind());
        }));

        emitter.emit(ExecutionEvent::BreakerOpened);
        emitter.emit(ExecutionEvent::TimedOut {
            limit: Duration::from_secs(5),
        });

        assert_eq!(
            *seen.lock(),
            vec![EventKind::BreakerOpened, EventKind::TimedOut]
        );
    }

    #[test]
    fn default_emitter_is_detached() {
        let emitter = Emitter::default();
        assert!(!emitter.is_attached());
        emitter.emit(ExecutionEvent::BreakerClosed);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(tx);

        sink.emit(&ExecutionEvent::Retrying {
            attempt: 2,
            delay: Duration::from_secs(1),
        });

        assert_eq!(
            rx.recv().await,
            Some(ExecutionEvent::Retrying {
                attempt: 2,
                delay: Duration::from_secs(1),
            })
        );
    }

    #[test]
    fn display_matches_console_wording() {
        let event = ExecutionEvent::Retrying {
            attempt: 3,
            delay: Duration::from_secs(1),
        };
        assert_eq!(event.to_string(), "Retrying: attempt 3 in 1s");
    }
}
