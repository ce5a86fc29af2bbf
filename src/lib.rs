//! # resilience-rs
//!
//! Composable resilience policies for async calls to a remote dependency:
//! retry, circuit breaker, per-attempt timeout, bulkhead and fallback, layered
//! around an operation in one fixed order.
//!
//! ## Evaluation Order
//!
//! A [`Pipeline`] applies whichever policies it was built with as
//!
//! ```text
//! Fallback → Bulkhead → Circuit Breaker → Retry → Timeout → operation
//! ```
//!
//! - **Bulkhead** rejects a call outright when too many are already in flight.
//! - **Circuit Breaker** sees one outcome per logical call, after retries are
//!   exhausted, and rejects calls while open.
//! - **Retry** re-runs failed attempts; rejections from outer policies are never
//!   retried.
//! - **Timeout** bounds each attempt separately and cancels the attempt's
//!   [`CancellationToken`] on expiry.
//! - **Fallback** replaces any failure with a substitute value.
//!
//! The order does not depend on the order the builder methods are called in.
//!
//! ## Basic Usage
//!
//! ```rust
//! use resilience_rs::{DelayStrategy, Pipeline, RetryPolicy};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline = Pipeline::<String, std::io::Error>::builder()
//!     .retry(RetryPolicy::new(3, DelayStrategy::Constant(Duration::from_millis(10))).unwrap())
//!     .fallback_value("Fallback response".to_string())
//!     .build();
//!
//! let body = pipeline
//!     .execute(|_token| async { Err(std::io::Error::other("503")) })
//!     .await;
//!
//! assert_eq!(body.unwrap(), "Fallback response");
//! # }
//! ```
//!
//! ## Defaults
//!
//! [`PipelineBuilder::with_defaults`] gives 5 attempts one second apart, a
//! breaker opening after 2 consecutive failed calls for 10 seconds, a 5 second
//! attempt timeout and a bulkhead of 1. [`ResilienceConfig`] holds the same
//! numbers as plain data.
//!
//! ## Events
//!
//! Policies report what they do as [`ExecutionEvent`]s to an [`EventSink`].
//! [`TracingEventSink`] logs them, [`ChannelEventSink`] forwards them to a tokio
//! channel and [`HookRegistry`] dispatches them to callbacks by kind.
//!
//! ## Features
//!
//! - `serde` - `Serialize`/`Deserialize` for [`ResilienceConfig`], with
//!   humantime durations

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod bulkhead;
mod config;
mod error;
mod events;
mod fallback;
mod hook;
mod metrics;
mod pipeline;
mod policy;
pub mod prelude;
mod retry;
mod state;
mod timeout;

// Re-exports
pub use breaker::{CircuitBreakerPolicy, DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_DURATION};
pub use bulkhead::{BulkheadPolicy, DEFAULT_MAX_CONCURRENT};
pub use config::{PipelineBuilder, ResilienceConfig};
pub use error::{ConfigError, FailureKind, Outcome, PolicyError};
pub use events::{
    ChannelEventSink, EventKind, EventSink, ExecutionEvent, NullEventSink, TracingEventSink,
};
pub use fallback::FallbackPolicy;
pub use hook::HookRegistry;
pub use metrics::BreakerStats;
pub use pipeline::Pipeline;
pub use policy::{ConsecutiveFailures, FailureRate, TripCondition};
pub use retry::{DelayStrategy, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use state::State;
pub use timeout::{TimeoutPolicy, DEFAULT_ATTEMPT_TIMEOUT};
pub use tokio_util::sync::CancellationToken;
