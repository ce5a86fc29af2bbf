//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use resilience_rs::prelude::*;
//!
//! let pipeline: Pipeline<String, std::io::Error> = PipelineBuilder::with_defaults()
//!     .fallback_value("Fallback response".to_string())
//!     .event_sink(TracingEventSink)
//!     .build();
//! ```

pub use crate::breaker::CircuitBreakerPolicy;
pub use crate::bulkhead::BulkheadPolicy;
pub use crate::config::{PipelineBuilder, ResilienceConfig};
pub use crate::error::{FailureKind, Outcome, PolicyError};
pub use crate::events::{EventSink, ExecutionEvent, TracingEventSink};
pub use crate::fallback::FallbackPolicy;
pub use crate::hook::HookRegistry;
pub use crate::pipeline::Pipeline;
pub use crate::retry::{DelayStrategy, RetryPolicy};
pub use crate::state::State;
pub use crate::timeout::TimeoutPolicy;
pub use tokio_util::sync::CancellationToken;
