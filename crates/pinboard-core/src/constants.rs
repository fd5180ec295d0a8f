//! Board-level constants.
//!
//! The expansion board exposes one byte-wide input register and one
//! byte-wide output latch. Every pin index, timing floor and default used
//! by the controllers is defined here so validation stays consistent
//! across crates.
//!
//! # Usage
//!
//! ```
//! use pinboard_core::constants::*;
//!
//! fn is_valid_pin(pin: u8) -> bool {
//!     pin <= MAX_PIN_INDEX
//! }
//!
//! assert!(is_valid_pin(7));
//! assert!(!is_valid_pin(PIN_COUNT));
//! ```

// ============================================================================
// Pins
// ============================================================================

/// Number of input pins, and of output pins, on the board.
pub const PIN_COUNT: u8 = 8;

/// Highest valid pin index.
pub const MAX_PIN_INDEX: u8 = PIN_COUNT - 1;

/// Input register value with every input released.
///
/// Inputs are active-low, so a set bit reads as logical `false`.
pub const ALL_INPUTS_RELEASED: u8 = 0xFF;

// ============================================================================
// Timing
// ============================================================================

/// Shortest interval, in milliseconds, between two writes of a blinking
/// output.
///
/// The board cannot usefully update its output latch faster than this.
pub const MIN_BLINK_INTERVAL_MS: u64 = 10;

/// Default blink interval in milliseconds.
pub const DEFAULT_BLINK_INTERVAL_MS: u64 = 500;

/// Default debounce gate window in milliseconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pinboard_core::constants::DEFAULT_GATE_DURATION_MS;
///
/// let gate = Duration::from_millis(DEFAULT_GATE_DURATION_MS);
/// assert_eq!(gate.as_millis(), 20);
/// ```
pub const DEFAULT_GATE_DURATION_MS: u64 = 20;
