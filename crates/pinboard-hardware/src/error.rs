//! Error types for device operations.
//!
//! The error enum itself lives in `pinboard-core` so that controller errors
//! can wrap it; this module re-exports it together with the device-level
//! `Result` alias.

pub use pinboard_core::DeviceError;

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
