//! Lifecycle status of background controllers.
//!
//! # States
//!
//! - `Stopped`: no loop thread exists
//! - `Starting`: thread spawned, first iteration not yet entered
//! - `Running`: loop body is being invoked
//! - `Stopping`: stop requested, waiting for the thread to exit
//!
//! # Valid Transitions
//!
//! - Stopped → Starting → Running → Stopping → Stopped
//! - Starting → Stopping (stop requested before the thread got going)
//! - Running → Stopped (the loop body failed)
//! - Starting → Stopped (the thread could not be spawned)

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle status of a [`BackgroundController`](crate::BackgroundController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    /// No loop thread exists.
    Stopped,

    /// Loop thread spawned but not yet running the body.
    Starting,

    /// Loop body is being invoked repeatedly.
    Running,

    /// Stop requested; the loop exits at its next iteration boundary.
    Stopping,
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            ControllerStatus::Stopped => "Stopped",
            ControllerStatus::Starting => "Starting",
            ControllerStatus::Running => "Running",
            ControllerStatus::Stopping => "Stopping",
        };
        write!(f, "{}", status_str)
    }
}

impl ControllerStatus {
    /// Check if transition to target status is valid from this status.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinboard_controllers::ControllerStatus;
    ///
    /// assert!(ControllerStatus::Stopped.can_transition_to(&ControllerStatus::Starting));
    /// assert!(!ControllerStatus::Stopped.can_transition_to(&ControllerStatus::Running));
    /// ```
    pub fn can_transition_to(&self, target: &ControllerStatus) -> bool {
        matches!(
            (self, target),
            (ControllerStatus::Stopped, ControllerStatus::Starting)
                | (
                    ControllerStatus::Starting,
                    ControllerStatus::Running | ControllerStatus::Stopping | ControllerStatus::Stopped
                )
                | (
                    ControllerStatus::Running,
                    ControllerStatus::Stopping | ControllerStatus::Stopped
                )
                | (ControllerStatus::Stopping, ControllerStatus::Stopped)
        )
    }

    /// Whether a loop thread may exist in this status.
    pub fn is_active(&self) -> bool {
        !matches!(self, ControllerStatus::Stopped)
    }
}

/// Status shared between a controller and its loop thread.
///
/// Every change wakes threads blocked in [`wait_for`](Self::wait_for) or
/// [`pause_while_running`](Self::pause_while_running).
#[derive(Debug)]
pub(crate) struct StatusCell {
    status: Mutex<ControllerStatus>,
    changed: Condvar,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(ControllerStatus::Stopped),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ControllerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> ControllerStatus {
        *self.lock()
    }

    /// Move to `target` under an already held guard.
    pub(crate) fn set(&self, guard: &mut MutexGuard<'_, ControllerStatus>, target: ControllerStatus) {
        debug_assert!(
            guard.can_transition_to(&target),
            "invalid status transition {} -> {}",
            **guard,
            target
        );
        debug!(from = %**guard, to = %target, "controller status changed");
        **guard = target;
        self.changed.notify_all();
    }

    /// Move from `from` to `to`; returns `false` and leaves the status
    /// untouched if it was not `from`.
    pub(crate) fn transition(&self, from: ControllerStatus, to: ControllerStatus) -> bool {
        let mut guard = self.lock();
        if *guard != from {
            return false;
        }
        self.set(&mut guard, to);
        true
    }

    /// Block until the status equals `target` or `timeout` elapses.
    pub(crate) fn wait_for(&self, target: ControllerStatus, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |status| *status != target)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == target
    }

    /// Sleep for `duration`, waking early if the status leaves `Running`.
    ///
    /// Returns whether the status is still `Running`.
    pub(crate) fn pause_while_running(&self, duration: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, duration, |status| {
                *status == ControllerStatus::Running
            })
            .unwrap_or_else(PoisonError::into_inner);
        *guard == ControllerStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use ControllerStatus::*;

    #[rstest]
    #[case(Stopped, Starting)]
    #[case(Starting, Running)]
    #[case(Starting, Stopping)]
    #[case(Starting, Stopped)]
    #[case(Running, Stopping)]
    #[case(Running, Stopped)]
    #[case(Stopping, Stopped)]
    fn test_valid_transitions(#[case] from: ControllerStatus, #[case] to: ControllerStatus) {
        assert!(from.can_transition_to(&to));
    }

    #[rstest]
    #[case(Stopped, Running)]
    #[case(Stopped, Stopping)]
    #[case(Stopped, Stopped)]
    #[case(Running, Starting)]
    #[case(Running, Running)]
    #[case(Stopping, Running)]
    #[case(Stopping, Starting)]
    fn test_invalid_transitions(#[case] from: ControllerStatus, #[case] to: ControllerStatus) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Stopped.to_string(), "Stopped");
        assert_eq!(Starting.to_string(), "Starting");
        assert_eq!(Running.to_string(), "Running");
        assert_eq!(Stopping.to_string(), "Stopping");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Running).unwrap();
        assert_eq!(json, "\"running\"");
        let status: ControllerStatus = serde_json::from_str("\"stopping\"").unwrap();
        assert_eq!(status, Stopping);
    }

    #[test]
    fn test_is_active() {
        assert!(!Stopped.is_active());
        assert!(Starting.is_active());
        assert!(Running.is_active());
        assert!(Stopping.is_active());
    }

    #[test]
    fn test_cell_transition() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), Stopped);

        assert!(!cell.transition(Starting, Running));
        assert_eq!(cell.get(), Stopped);

        assert!(cell.transition(Stopped, Starting));
        assert!(cell.transition(Starting, Running));
        assert_eq!(cell.get(), Running);
    }

    #[test]
    fn test_cell_wait_for_times_out() {
        let cell = StatusCell::new();
        assert!(!cell.wait_for(Running, Duration::from_millis(20)));
        assert!(cell.wait_for(Stopped, Duration::from_millis(20)));
    }

    #[test]
    fn test_cell_wait_for_wakes_on_change() {
        let cell = Arc::new(StatusCell::new());
        let other = Arc::clone(&cell);

        let waiter = thread::spawn(move || other.wait_for(Starting, Duration::from_secs(5)));
        cell.transition(Stopped, Starting);

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_pause_returns_early_when_stopping() {
        let cell = Arc::new(StatusCell::new());
        cell.transition(Stopped, Starting);
        cell.transition(Starting, Running);

        let other = Arc::clone(&cell);
        let sleeper = thread::spawn(move || {
            let begin = Instant::now();
            let still_running = other.pause_while_running(Duration::from_secs(10));
            (still_running, begin.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        cell.transition(Running, Stopping);

        let (still_running, elapsed) = sleeper.join().unwrap();
        assert!(!still_running);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_pause_full_duration_while_running() {
        let cell = StatusCell::new();
        cell.transition(Stopped, Starting);
        cell.transition(Starting, Running);

        let begin = Instant::now();
        assert!(cell.pause_while_running(Duration::from_millis(30)));
        assert!(begin.elapsed() >= Duration::from_millis(30));
    }
}
