//! Circuit breaker policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ConfigError, Outcome, PolicyError};
use crate::events::{Emitter, EventSink, ExecutionEvent};
use crate::metrics::BreakerStats;
use crate::policy::{ConsecutiveFailures, TripCondition};
use crate::state::{State, StateManager};

/// Default number of consecutive failed calls that trips the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 2;

/// Default time the breaker stays open before admitting a trial call.
pub const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(10);

/// A circuit breaker that short-circuits calls to an unhealthy dependency.
///
/// Closed, it counts consecutive failures; once the trip condition holds it opens
/// and rejects every call with [`PolicyError::CircuitOpen`]. After `open_duration`
/// the next call becomes the single half-open trial: success closes the circuit,
/// failure reopens it.
pub struct CircuitBreakerPolicy {
    state_manager: StateManager,
    condition: Box<dyn TripCondition>,
    stats: BreakerStats,
    failure_threshold: u64,
    open_duration: Duration,
    events: Emitter,
}

/// How a call got past the breaker, with the state epoch it was admitted in.
#[derive(Debug, Clone, Copy)]
enum Admission {
    Normal { epoch: u64 },
    Trial { epoch: u64 },
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::build(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_DURATION)
    }
}

impl CircuitBreakerPolicy {
    /// Creates a breaker tripping after `failure_threshold` consecutive failures
    /// and staying open for `open_duration`.
    pub fn new(failure_threshold: u64, open_duration: Duration) -> Result<Self, ConfigError> {
        if failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(failure_threshold));
        }

        Ok(Self::build(failure_threshold, open_duration))
    }

    fn build(failure_threshold: u64, open_duration: Duration) -> Self {
        Self {
            state_manager: StateManager::new(),
            condition: Box::new(ConsecutiveFailures::new(failure_threshold)),
            stats: BreakerStats::new(),
            failure_threshold,
            open_duration,
            events: Emitter::default(),
        }
    }

    /// Replaces the default consecutive-failure rule.
    pub fn with_trip_condition<C: TripCondition>(mut self, condition: C) -> Self {
        self.condition = Box::new(condition);
        self
    }

    /// Sets the sink receiving this breaker's events.
    pub fn with_event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.events = Emitter::new(Arc::new(sink));
        self
    }

    pub(crate) fn attach_events(&mut self, events: &Emitter) {
        if !self.events.is_attached() {
            self.events = events.clone();
        }
    }

    /// Gets the current state of the circuit breaker.
    pub fn current_state(&self) -> State {
        self.state_manager.current()
    }

    /// When the breaker entered its current state.
    pub fn last_transition_time(&self) -> Instant {
        self.state_manager.last_transition_time()
    }

    /// Current run of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.stats.consecutive_failures()
    }

    /// Outcome counters since the breaker last closed.
    pub fn stats(&self) -> &BreakerStats {
        &self.stats
    }

    /// Configured consecutive-failure threshold.
    pub fn failure_threshold(&self) -> u64 {
        self.failure_threshold
    }

    /// Configured open duration.
    pub fn open_duration(&self) -> Duration {
        self.open_duration
    }

    /// Runs `call` unless the breaker rejects it.
    ///
    /// `call` is not polled when the circuit is open.
    pub async fn execute<V, E, Fut>(&self, call: Fut) -> Outcome<V, E>
    where
        Fut: Future<Output = Outcome<V, E>>,
    {
        let admission = match self.pre_call() {
            Some(admission) => admission,
            None => return Err(PolicyError::CircuitOpen),
        };

        let mut guard = TrialGuard {
            breaker: self,
            admission,
            settled: false,
        };

        let outcome = call.await;
        guard.settled = true;
        self.post_call(admission, &outcome);
        outcome
    }

    /// Checks if a call is allowed based on the current state.
    fn pre_call(&self) -> Option<Admission> {
        match self.state_manager.snapshot() {
            (State::Closed, epoch) => Some(Admission::Normal { epoch }),
            (State::Open, _) => match self.state_manager.attempt_half_open(self.open_duration) {
                Some(epoch) => {
                    tracing::debug!("circuit breaker half-open, admitting trial call");
                    self.events.emit(ExecutionEvent::BreakerHalfOpened);
                    Some(Admission::Trial { epoch })
                }
                None => {
                    self.stats.record_rejection();
                    None
                }
            },
            (State::HalfOpen, _) => {
                self.stats.record_rejection();
                None
            }
        }
    }

    /// Processes the result of a call to update stats and potentially change state.
    ///
    /// Outcomes of calls admitted before the last transition only update the
    /// totals.
    fn post_call<V, E>(&self, admission: Admission, outcome: &Outcome<V, E>) {
        match (admission, outcome) {
            (Admission::Trial { epoch }, Err(err)) if err.is_rejection() => {
                // Inner rejection: no verdict on health.
                self.abandon(epoch);
            }
            (Admission::Trial { epoch }, Ok(_)) => {
                if self.state_manager.reset_closed(epoch) {
                    self.stats.reset();
                    self.stats.record_success();
                    tracing::info!("circuit breaker closed after successful trial");
                    self.events.emit(ExecutionEvent::BreakerClosed);
                } else {
                    self.stats.record_late_success();
                }
            }
            (Admission::Trial { epoch }, Err(_)) => {
                if self.state_manager.revert_to_open(epoch) {
                    self.stats.record_failure();
                    tracing::warn!("circuit breaker trial failed, reopening");
                    self.events.emit(ExecutionEvent::BreakerOpened);
                } else {
                    self.stats.record_late_failure();
                }
            }
            (Admission::Normal { .. }, Err(err)) if err.is_rejection() => {}
            (Admission::Normal { epoch }, Ok(_)) => {
                if self.state_manager.is_current(epoch) {
                    self.stats.record_success();
                } else {
                    self.stats.record_late_success();
                }
            }
            (Admission::Normal { epoch }, Err(_)) => {
                if !self.state_manager.is_current(epoch) {
                    tracing::debug!("late failure from an earlier closed period");
                    self.stats.record_late_failure();
                    return;
                }

                let consecutive = self.stats.record_failure();
                if self.condition.should_trip(&self.stats)
                    && self
                        .state_manager
                        .transition_in_epoch(epoch, State::Closed, State::Open)
                {
                    tracing::warn!(
                        consecutive_failures = consecutive,
                        open_duration = ?self.open_duration,
                        "circuit breaker opened"
                    );
                    self.events.emit(ExecutionEvent::BreakerOpened);
                }
            }
        }
    }

    fn abandon(&self, epoch: u64) {
        if self.state_manager.abandon_trial(epoch) {
            tracing::debug!("circuit breaker trial abandoned, back to open");
        }
    }

    /// Forces the circuit breaker to the open state.
    pub fn force_open(&self) -> bool {
        match self.state_manager.trip_open() {
            Some(from) => {
                tracing::warn!(from = from.as_str(), "circuit breaker forced open");
                self.events.emit(ExecutionEvent::BreakerOpened);
                true
            }
            None => false,
        }
    }

    /// Forces the circuit breaker to the closed state.
    pub fn force_closed(&self) -> bool {
        let current = self.state_manager.current();
        if current == State::Closed {
            return false;
        }

        if self.state_manager.transition_from_to(current, State::Closed) {
            self.stats.reset();
            tracing::info!(from = current.as_str(), "circuit breaker forced closed");
            self.events.emit(ExecutionEvent::BreakerClosed);
            true
        } else {
            false
        }
    }

    /// Resets the circuit breaker's statistics.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

/// Returns an unfinished trial to Open if its future is dropped mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreakerPolicy,
    admission: Admission,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        if let Admission::Trial { epoch } = self.admission {
            self.breaker.abandon(epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use parking_lot::Mutex;
    use std::fmt;

    #[derive(Debug)]
    struct Down;

    impl fmt::Display for Down {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "down")
        }
    }

    impl std::error::Error for Down {}

    fn failed() -> Outcome<(), Down> {
        Err(PolicyError::OperationFailed {
            source: Down,
            elapsed: Duration::ZERO,
        })
    }

    #[test]
    fn rejects_zero_threshold() {
        assert!(matches!(
            CircuitBreakerPolicy::new(0, Duration::from_secs(1)),
            Err(ConfigError::InvalidFailureThreshold(0))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn trips_after_threshold_and_recovers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let breaker = CircuitBreakerPolicy::new(2, Duration::from_secs(10))
            .unwrap()
            .with_event_sink(move |event: &ExecutionEvent| sink.lock().push(event.kind()));

        assert!(breaker.execute(async { failed() }).await.is_err());
        assert_eq!(breaker.current_state(), State::Closed);
        assert!(breaker.execute(async { failed() }).await.is_err());
        assert_eq!(breaker.current_state(), State::Open);

        let rejected = breaker.execute(async { Ok::<_, PolicyError<Down>>(()) }).await;
        assert!(matches!(rejected, Err(PolicyError::CircuitOpen)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker
            .execute(async { Ok::<_, PolicyError<Down>>(()) })
            .await
            .is_ok());
        assert_eq!(breaker.current_state(), State::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);

        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::BreakerOpened,
                EventKind::BreakerHalfOpened,
                EventKind::BreakerClosed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_returns_to_open() {
        let breaker = CircuitBreakerPolicy::new(1, Duration::from_secs(10)).unwrap();
        let mut last = breaker.last_transition_time();

        let _ = breaker.execute(async { failed() }).await;
        assert_eq!(breaker.current_state(), State::Open);
        assert!(breaker.last_transition_time() >= last);
        last = breaker.last_transition_time();
        tokio::time::advance(Duration::from_secs(10)).await;

        // Start the trial and abandon it before it completes.
        let trial = breaker.execute(std::future::pending::<Outcome<(), Down>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(3), trial).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.current_state(), State::Open);
        // Abandoning is a transition of its own, stamped now.
        assert!(breaker.last_transition_time() > last);
        assert_eq!(breaker.last_transition_time(), Instant::now());
        // The open period is kept: next caller tries again without waiting.
        assert!(breaker
            .execute(async { Ok::<_, PolicyError<Down>>(()) })
            .await
            .is_ok());
        assert_eq!(breaker.current_state(), State::Closed);
    }

    #[tokio::test]
    async fn manual_control() {
        let breaker = CircuitBreakerPolicy::default();

        let before = breaker.last_transition_time();
        assert!(breaker.force_open());
        assert!(!breaker.force_open());
        assert_eq!(breaker.current_state(), State::Open);
        assert!(breaker.last_transition_time() >= before);

        assert!(breaker.force_closed());
        assert!(!breaker.force_closed());
        assert_eq!(breaker.current_state(), State::Closed);
    }
}
