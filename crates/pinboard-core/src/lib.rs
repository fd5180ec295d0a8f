//! Core types shared by the pinboard crates.
//!
//! Holds the error taxonomy, board constants, and the validated value
//! types (pin indices, gate durations, blink intervals, input snapshots)
//! that the hardware and controller crates exchange.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{DeviceError, Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
