//! Circuit breaker state machine implementation.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// Circuit is running its single trial call to test recovery.
    HalfOpen,
}

impl State {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct Cell {
    state: State,
    /// Time of the last transition; never moves backwards.
    since: Instant,
    /// Start of the current open period, measured against `open_duration`.
    opened_at: Instant,
    /// Bumped on every transition.
    epoch: u64,
}

impl Cell {
    fn enter(&mut self, to: State) {
        let now = Instant::now();
        if to == State::Open {
            self.opened_at = now;
        }
        self.state = to;
        self.since = now;
        self.epoch += 1;
    }
}

/// State transitions for the circuit breaker.
///
/// State, timestamps and epoch live behind one lock, so a reader never sees a
/// new state paired with the previous state's timestamp.
///
/// The epoch identifies one stay in a state. Calls remember the epoch they were
/// admitted in, and a transition requested on behalf of a call only happens
/// while that epoch is still current.
#[derive(Debug)]
pub(crate) struct StateManager {
    cell: Mutex<Cell>,
}

impl StateManager {
    /// Creates a new state manager with the default closed state.
    pub(crate) fn new() -> Self {
        let now = Instant::now();
        Self {
            cell: Mutex::new(Cell {
                state: State::Closed,
                since: now,
                opened_at: now,
                epoch: 0,
            }),
        }
    }

    /// Gets the current state.
    pub(crate) fn current(&self) -> State {
        self.cell.lock().state
    }

    /// Gets the current state together with its epoch.
    pub(crate) fn snapshot(&self) -> (State, u64) {
        let cell = self.cell.lock();
        (cell.state, cell.epoch)
    }

    /// True while no transition has happened since `epoch` was observed.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.cell.lock().epoch == epoch
    }

    /// Gets the time of the last state transition.
    pub(crate) fn last_transition_time(&self) -> Instant {
        self.cell.lock().since
    }

    /// Attempts to transition from one state to another.
    /// Returns true if the transition succeeded.
    pub(crate) fn transition_from_to(&self, from: State, to: State) -> bool {
        let mut cell = self.cell.lock();
        if cell.state != from {
            return false;
        }

        cell.enter(to);
        true
    }

    /// Like [`StateManager::transition_from_to`], but only within `epoch`.
    pub(crate) fn transition_in_epoch(&self, epoch: u64, from: State, to: State) -> bool {
        let mut cell = self.cell.lock();
        if cell.epoch != epoch || cell.state != from {
            return false;
        }

        cell.enter(to);
        true
    }

    /// Attempts to transition to open state from any other state.
    /// Returns the state it left.
    pub(crate) fn trip_open(&self) -> Option<State> {
        let mut cell = self.cell.lock();
        let previous = cell.state;
        if previous == State::Open {
            return None;
        }

        cell.enter(State::Open);
        Some(previous)
    }

    /// Moves Open to HalfOpen once `open_duration` has passed since `opened_at`.
    ///
    /// Returns the epoch of the half-open period, which identifies the trial.
    pub(crate) fn attempt_half_open(&self, open_duration: Duration) -> Option<u64> {
        let mut cell = self.cell.lock();
        if cell.state != State::Open {
            return None;
        }

        if Instant::now().saturating_duration_since(cell.opened_at) < open_duration {
            return None;
        }

        cell.enter(State::HalfOpen);
        Some(cell.epoch)
    }

    /// Closes the circuit after the trial of `epoch` succeeded.
    pub(crate) fn reset_closed(&self, epoch: u64) -> bool {
        self.transition_in_epoch(epoch, State::HalfOpen, State::Closed)
    }

    /// Reopens the circuit after the trial of `epoch` failed.
    pub(crate) fn revert_to_open(&self, epoch: u64) -> bool {
        self.transition_in_epoch(epoch, State::HalfOpen, State::Open)
    }

    /// Returns a trial that never produced a verdict to Open.
    ///
    /// `opened_at` is left alone, so the next caller may try again straight away.
    pub(crate) fn abandon_trial(&self, epoch: u64) -> bool {
        let mut cell = self.cell.lock();
        if cell.epoch != epoch || cell.state != State::HalfOpen {
            return false;
        }

        cell.state = State::Open;
        cell.since = Instant::now();
        cell.epoch += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn half_open_waits_for_open_duration() {
        let states = StateManager::new();
        assert_eq!(states.trip_open(), Some(State::Closed));
        assert_eq!(states.trip_open(), None);

        assert!(states.attempt_half_open(Duration::from_secs(10)).is_none());
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = states.attempt_half_open(Duration::from_secs(10));
        assert!(trial.is_some());
        assert_eq!(states.current(), State::HalfOpen);

        // Only one caller wins the transition.
        assert!(states.attempt_half_open(Duration::from_secs(10)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_keeps_open_period_but_not_timestamp() {
        let states = StateManager::new();
        states.trip_open();
        let opened = states.last_transition_time();

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = states
            .attempt_half_open(Duration::from_secs(1))
            .expect("open duration elapsed");
        let half_opened = states.last_transition_time();
        assert!(half_opened > opened);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(states.abandon_trial(trial));

        assert_eq!(states.current(), State::Open);
        assert_eq!(states.last_transition_time(), Instant::now());
        assert!(states.last_transition_time() > half_opened);
        assert!(states.attempt_half_open(Duration::from_secs(1)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_epoch_cannot_transition() {
        let states = StateManager::new();
        let (state, closed_epoch) = states.snapshot();
        assert_eq!(state, State::Closed);

        states.trip_open();
        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = states.attempt_half_open(Duration::from_secs(1)).unwrap();
        assert!(states.reset_closed(trial));

        // Closed again, but in a later epoch.
        assert_eq!(states.current(), State::Closed);
        assert!(!states.is_current(closed_epoch));
        assert!(!states.transition_in_epoch(closed_epoch, State::Closed, State::Open));
        assert!(!states.abandon_trial(trial));
        assert_eq!(states.current(), State::Closed);
    }

    #[test]
    fn transitions_require_expected_source_state() {
        let states = StateManager::new();
        let (_, epoch) = states.snapshot();
        assert!(!states.reset_closed(epoch));
        assert!(!states.revert_to_open(epoch));
        assert!(states.transition_from_to(State::Closed, State::Open));
        assert!(!states.transition_from_to(State::Closed, State::Open));
        assert_eq!(states.current().as_str(), "open");
    }
}
