//! Trip conditions deciding when a closed circuit opens.

use crate::metrics::BreakerStats;

/// Decides whether a closed circuit breaker should trip open.
///
/// Evaluated after every failure recorded while the breaker is closed.
pub trait TripCondition: Send + Sync + 'static {
    /// Determines if the circuit should trip open based on current stats.
    fn should_trip(&self, stats: &BreakerStats) -> bool;
}

/// Trips once a run of consecutive failures reaches the threshold.
#[derive(Debug, Clone, Copy)]
pub struct ConsecutiveFailures {
    threshold: u64,
}

impl ConsecutiveFailures {
    /// Creates a condition tripping after `threshold` consecutive failures.
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl TripCondition for ConsecutiveFailures {
    fn should_trip(&self, stats: &BreakerStats) -> bool {
        stats.consecutive_failures() >= self.threshold
    }
}

/// Trips when the failure rate reaches `failure_threshold` over at least
/// `min_throughput` calls.
///
/// Counts accumulate until the breaker next closes.
#[derive(Debug, Clone, Copy)]
pub struct FailureRate {
    failure_threshold: f64,
    min_throughput: u64,
}

impl FailureRate {
    /// Creates a new failure-rate condition.
    pub fn new(failure_threshold: f64, min_throughput: u64) -> Self {
        Self {
            failure_threshold,
            min_throughput,
        }
    }
}

impl TripCondition for FailureRate {
    fn should_trip(&self, stats: &BreakerStats) -> bool {
        stats.get_total_calls() >= self.min_throughput
            && stats.error_rate() >= self.failure_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failures_trips_at_threshold() {
        let condition = ConsecutiveFailures::new(2);
        let stats = BreakerStats::new();

        stats.record_failure();
        assert!(!condition.should_trip(&stats));
        stats.record_failure();
        assert!(condition.should_trip(&stats));
    }

    #[test]
    fn failure_rate_needs_minimum_throughput() {
        let condition = FailureRate::new(0.5, 4);
        let stats = BreakerStats::new();

        stats.record_failure();
        stats.record_failure();
        assert!(!condition.should_trip(&stats));

        stats.record_success();
        stats.record_failure();
        assert!(condition.should_trip(&stats));
    }
}
