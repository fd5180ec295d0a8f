//! Edge detection with rising-edge gating.
//!
//! A [`DebounceFilter`] watches one bit of the raw input register and turns
//! a noisy stream of snapshots into clean level changes. Only rising edges
//! (false to true) are gated: one is accepted when at least the gate window
//! has passed since the previously accepted rising edge, or when there has
//! been none yet. Falling edges always pass, so a suppressed bounce can never
//! leave the filter stuck in the on state.
//!
//! The filter keeps no clock of its own; callers pass the time each snapshot
//! arrived, which keeps it deterministic under test.

use std::fmt;
use std::time::Instant;

use pinboard_core::{GateDuration, InputSnapshot, PinIndex};
use tracing::trace;

/// Outcome of evaluating one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeDecision {
    /// False to true, accepted.
    Rising,

    /// True to false, accepted.
    Falling,

    /// False to true inside the gate window; state unchanged.
    Suppressed,

    /// Level equals the current clean state.
    Unchanged,
}

impl EdgeDecision {
    /// The clean state to publish, if this decision changed anything.
    #[must_use]
    pub fn emitted(&self) -> Option<bool> {
        match self {
            EdgeDecision::Rising => Some(true),
            EdgeDecision::Falling => Some(false),
            EdgeDecision::Suppressed | EdgeDecision::Unchanged => None,
        }
    }
}

impl fmt::Display for EdgeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decision_str = match self {
            EdgeDecision::Rising => "rising",
            EdgeDecision::Falling => "falling",
            EdgeDecision::Suppressed => "suppressed",
            EdgeDecision::Unchanged => "unchanged",
        };
        write!(f, "{}", decision_str)
    }
}

/// Debounce state for a single input pin.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use pinboard_controllers::{DebounceFilter, EdgeDecision};
/// use pinboard_core::{GateDuration, InputSnapshot, PinIndex};
///
/// let pin = PinIndex::new(0).unwrap();
/// let mut filter = DebounceFilter::new(pin, GateDuration::from_millis(20).unwrap(), false);
/// let t0 = Instant::now();
///
/// let pressed = InputSnapshot::from_raw(0b1111_1110);
/// let released = InputSnapshot::from_raw(0b1111_1111);
///
/// assert_eq!(filter.evaluate(pressed, t0), EdgeDecision::Rising);
/// assert_eq!(filter.evaluate(released, t0 + Duration::from_millis(5)), EdgeDecision::Falling);
/// assert_eq!(filter.evaluate(pressed, t0 + Duration::from_millis(10)), EdgeDecision::Suppressed);
/// assert_eq!(filter.evaluate(pressed, t0 + Duration::from_millis(25)), EdgeDecision::Rising);
/// ```
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    pin: PinIndex,
    gate: GateDuration,
    state: bool,
    last_rising_edge_at: Option<Instant>,
}

impl DebounceFilter {
    /// Create a filter whose clean state starts at `initial_state`.
    ///
    /// No rising edge has been seen yet, so the first one is always
    /// accepted.
    pub fn new(pin: PinIndex, gate: GateDuration, initial_state: bool) -> Self {
        Self {
            pin,
            gate,
            state: initial_state,
            last_rising_edge_at: None,
        }
    }

    pub fn pin(&self) -> PinIndex {
        self.pin
    }

    /// Last clean state.
    pub fn state(&self) -> bool {
        self.state
    }

    pub fn gate(&self) -> GateDuration {
        self.gate
    }

    /// Replace the gate window. Takes effect from the next evaluation.
    pub fn set_gate(&mut self, gate: GateDuration) {
        self.gate = gate;
    }

    /// When the last rising edge was accepted, if ever.
    pub fn last_rising_edge_at(&self) -> Option<Instant> {
        self.last_rising_edge_at
    }

    /// Evaluate a snapshot that arrived at `now` and update the clean state.
    ///
    /// Bits belonging to other pins are ignored.
    pub fn evaluate(&mut self, snapshot: InputSnapshot, now: Instant) -> EdgeDecision {
        let level = snapshot.is_active(self.pin);

        match (self.state, level) {
            (false, true) => {
                if !self.gate_open(now) {
                    trace!(pin = %self.pin, gate = %self.gate, "rising edge suppressed");
                    return EdgeDecision::Suppressed;
                }
                self.state = true;
                self.last_rising_edge_at = Some(now);
                EdgeDecision::Rising
            }
            (true, false) => {
                self.state = false;
                EdgeDecision::Falling
            }
            _ => EdgeDecision::Unchanged,
        }
    }

    fn gate_open(&self, now: Instant) -> bool {
        match self.last_rising_edge_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.gate.as_duration(),
        }
    }
}
