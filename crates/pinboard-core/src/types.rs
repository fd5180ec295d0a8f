use crate::{
    Result,
    constants::{DEFAULT_GATE_DURATION_MS, MAX_PIN_INDEX, MIN_BLINK_INTERVAL_MS},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Index of an input or output pin (0-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PinIndex(u8);

impl PinIndex {
    /// Create a new pin index with validation.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` if the index is greater than 7.
    pub fn new(index: u8) -> Result<Self> {
        if index > MAX_PIN_INDEX {
            return Err(Error::out_of_range(
                "pin",
                index,
                format!("must be 0-{MAX_PIN_INDEX}"),
            ));
        }
        Ok(PinIndex(index))
    }

    /// Get the raw pin index as u8.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Bit selecting this pin in a register byte.
    #[must_use]
    pub fn mask(&self) -> u8 {
        1 << self.0
    }

    /// Iterate over all eight pins in ascending order.
    pub fn all() -> impl Iterator<Item = PinIndex> {
        (0..=MAX_PIN_INDEX).map(PinIndex)
    }
}

impl fmt::Display for PinIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for PinIndex {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        PinIndex::new(index)
    }
}

impl From<PinIndex> for u8 {
    fn from(pin: PinIndex) -> u8 {
        pin.0
    }
}

/// Debounce gate window.
///
/// Minimum time that must pass between two accepted rising edges of an
/// input. Built from a signed millisecond count so that values coming
/// from configuration or callers can be rejected when negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u64")]
pub struct GateDuration(u64);

impl GateDuration {
    /// Create a gate duration from milliseconds.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` if `millis` is negative.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinboard_core::GateDuration;
    ///
    /// let gate = GateDuration::from_millis(20).unwrap();
    /// assert_eq!(gate.as_millis(), 20);
    ///
    /// assert!(GateDuration::from_millis(-1).is_err());
    /// ```
    pub fn from_millis(millis: i64) -> Result<Self> {
        u64::try_from(millis)
            .map(GateDuration)
            .map_err(|_| Error::out_of_range("gate duration", millis, "must not be negative"))
    }

    /// A zero-length window, which accepts every rising edge.
    #[must_use]
    pub const fn zero() -> Self {
        GateDuration(0)
    }

    #[must_use]
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for GateDuration {
    fn default() -> Self {
        GateDuration(DEFAULT_GATE_DURATION_MS)
    }
}

impl fmt::Display for GateDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl TryFrom<i64> for GateDuration {
    type Error = Error;

    fn try_from(millis: i64) -> Result<Self> {
        GateDuration::from_millis(millis)
    }
}

impl From<GateDuration> for u64 {
    fn from(gate: GateDuration) -> u64 {
        gate.0
    }
}

/// Pause between two writes of a blinking output (at least 10ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct BlinkInterval(u64);

impl BlinkInterval {
    /// Create a blink interval from milliseconds.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` if `millis` is below
    /// [`MIN_BLINK_INTERVAL_MS`].
    pub fn from_millis(millis: u64) -> Result<Self> {
        if millis < MIN_BLINK_INTERVAL_MS {
            return Err(Error::out_of_range(
                "interval",
                millis,
                format!("must be at least {MIN_BLINK_INTERVAL_MS}ms"),
            ));
        }
        Ok(BlinkInterval(millis))
    }

    #[must_use]
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl fmt::Display for BlinkInterval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl TryFrom<u64> for BlinkInterval {
    type Error = Error;

    fn try_from(millis: u64) -> Result<Self> {
        BlinkInterval::from_millis(millis)
    }
}

impl From<BlinkInterval> for u64 {
    fn from(interval: BlinkInterval) -> u64 {
        interval.0
    }
}

/// Raw snapshot of the input register, one bit per pin.
///
/// Inputs are active-low: a clear bit means the pin is logically on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSnapshot(u8);

impl InputSnapshot {
    #[must_use]
    pub const fn from_raw(bits: u8) -> Self {
        InputSnapshot(bits)
    }

    #[must_use]
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Logical state of `pin`: `true` when its bit is clear.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinboard_core::{InputSnapshot, PinIndex};
    ///
    /// let pin = PinIndex::new(2).unwrap();
    /// assert!(InputSnapshot::from_raw(0b1111_1011).is_active(pin));
    /// assert!(!InputSnapshot::from_raw(0b0000_0100).is_active(pin));
    /// ```
    #[must_use]
    pub fn is_active(&self, pin: PinIndex) -> bool {
        self.0 & pin.mask() == 0
    }

    /// Copy of this snapshot with `pin` driven to the given logical state.
    #[must_use]
    pub fn with_active(self, pin: PinIndex, active: bool) -> Self {
        if active {
            InputSnapshot(self.0 & !pin.mask())
        } else {
            InputSnapshot(self.0 | pin.mask())
        }
    }
}

impl fmt::Display for InputSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}

impl From<u8> for InputSnapshot {
    fn from(bits: u8) -> Self {
        InputSnapshot(bits)
    }
}

/// Clean, debounced state change of an input pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinChanged {
    /// Pin whose logical state changed.
    pub pin: PinIndex,

    /// New logical state.
    pub state: bool,

    /// Wall-clock time the change was accepted.
    pub timestamp: DateTime<Utc>,
}

impl PinChanged {
    pub fn new(pin: PinIndex, state: bool) -> Self {
        Self {
            pin,
            state,
            timestamp: Utc::now(),
        }
    }

    /// Check if this is a false to true transition.
    #[must_use]
    pub fn is_rising(&self) -> bool {
        self.state
    }
}
