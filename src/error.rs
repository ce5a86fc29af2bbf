//! Error types for the resilience pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result of one attempt or one logical call through a policy stack.
pub type Outcome<V, E> = Result<V, PolicyError<E>>;

/// Why a call through a policy did not produce a value.
#[derive(Debug, Error)]
pub enum PolicyError<E> {
    /// The wrapped operation returned an error.
    #[error("operation failed after {elapsed:?}: {source}")]
    OperationFailed {
        /// Error returned by the operation.
        source: E,
        /// How long the failing attempt ran.
        elapsed: Duration,
    },

    /// The attempt did not complete within the per-attempt limit.
    #[error("attempt timed out after {limit:?}")]
    Timeout {
        /// The limit that elapsed.
        limit: Duration,
    },

    /// The circuit breaker rejected the call without running it.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The bulkhead was at capacity and rejected the call without running it.
    #[error("bulkhead rejected the call: {max_concurrent} calls already in flight")]
    BulkheadRejected {
        /// Capacity of the bulkhead that rejected the call.
        max_concurrent: usize,
    },
}

/// Payload-free classification of a [`PolicyError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// See [`PolicyError::OperationFailed`].
    OperationFailed,
    /// See [`PolicyError::Timeout`].
    Timeout,
    /// See [`PolicyError::CircuitOpen`].
    CircuitOpen,
    /// See [`PolicyError::BulkheadRejected`].
    BulkheadRejected,
}

impl<E> PolicyError<E> {
    /// Returns the kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            PolicyError::OperationFailed { .. } => FailureKind::OperationFailed,
            PolicyError::Timeout { .. } => FailureKind::Timeout,
            PolicyError::CircuitOpen => FailureKind::CircuitOpen,
            PolicyError::BulkheadRejected { .. } => FailureKind::BulkheadRejected,
        }
    }

    /// Latency of the failed attempt, when one actually ran.
    pub fn latency(&self) -> Option<Duration> {
        match self {
            PolicyError::OperationFailed { elapsed, .. } => Some(*elapsed),
            PolicyError::Timeout { limit } => Some(*limit),
            PolicyError::CircuitOpen | PolicyError::BulkheadRejected { .. } => None,
        }
    }

    /// True for failures of a real attempt, which retry may re-run.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// True when a policy refused the call rather than an attempt failing.
    pub fn is_rejection(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns the operation's own error, if that is what failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            PolicyError::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consumes the failure and returns the operation's own error, if any.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            PolicyError::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl FailureKind {
    /// `Timeout` and `OperationFailed` are eligible for retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::OperationFailed | FailureKind::Timeout)
    }
}

/// Invalid policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Retry needs at least one attempt.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(u32),

    /// The breaker needs a positive failure threshold.
    #[error("failure_threshold must be > 0 (got {0})")]
    InvalidFailureThreshold(u64),

    /// The bulkhead needs at least one slot.
    #[error("max_concurrent must be > 0 (got {0})")]
    InvalidMaxConcurrent(usize),

    /// A duration that must be positive was zero.
    #[error("{0} must be a positive duration")]
    ZeroDuration(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::OperationFailed.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::CircuitOpen.is_retryable());
        assert!(!FailureKind::BulkheadRejected.is_retryable());
    }

    #[test]
    fn operation_failure_exposes_source_and_latency() {
        let err = PolicyError::OperationFailed {
            source: Boom,
            elapsed: Duration::from_millis(12),
        };

        assert_eq!(err.kind(), FailureKind::OperationFailed);
        assert_eq!(err.latency(), Some(Duration::from_millis(12)));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "operation failed after 12ms: boom");
    }

    #[test]
    fn rejections_carry_no_latency() {
        let err: PolicyError<Boom> = PolicyError::CircuitOpen;
        assert!(err.is_rejection());
        assert_eq!(err.latency(), None);
        assert!(err.operation_error().is_none());
    }
}
