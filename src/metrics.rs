//! Outcome counters for the circuit breaker.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Statistics for the circuit breaker.
#[derive(Debug)]
pub struct BreakerStats {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
    consecutive_failures: AtomicU64,
    last_failure_time: Mutex<Option<Instant>>,
}

impl Default for BreakerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self {
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            last_failure_time: Mutex::new(None),
        }
    }

    /// Gets the current success count.
    pub fn get_success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    /// Gets the current failure count.
    pub fn get_failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Gets the number of calls rejected while open.
    pub fn get_rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// Gets the number of calls that ran and produced a verdict.
    pub fn get_total_calls(&self) -> u64 {
        self.get_success_count() + self.get_failure_count()
    }

    /// Gets the last failure time.
    pub fn get_last_failure_time(&self) -> Option<Instant> {
        *self.last_failure_time.lock()
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Records a failed call and returns the new consecutive-failure count.
    pub fn record_failure(&self) -> u64 {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_failure_time.lock() = Some(Instant::now());
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Records a success from a call admitted before the last transition.
    ///
    /// Counted in the totals only; the consecutive run belongs to the current state.
    pub fn record_late_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failure from a call admitted before the last transition.
    ///
    /// Counted in the totals only; the consecutive run belongs to the current state.
    pub fn record_late_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_failure_time.lock() = Some(Instant::now());
    }

    /// Records a call rejected without running.
    pub fn record_rejection(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the current error rate.
    pub fn error_rate(&self) -> f64 {
        let failures = self.get_failure_count();
        let total = self.get_total_calls();

        if total == 0 {
            return 0.0;
        }

        failures as f64 / total as f64
    }

    /// Gets the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Restarts the consecutive-failure count, keeping the totals.
    pub fn reset_consecutive(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.rejected_count.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Release);
        *self.last_failure_time.lock() = None;
    }
}
