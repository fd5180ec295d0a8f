//! Error types for pin controllers and the devices they drive.
//!
//! [`Error`] covers argument validation, lifecycle misuse and capability
//! mismatches. [`DeviceError`] is the opaque fault a device reports from a
//! read or write; it converts into [`Error::Device`] so controller code can
//! propagate it with `?`.

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    // Validation errors
    #[error("{name} out of range: {value} ({reason})")]
    OutOfRange {
        name: &'static str,
        value: String,
        reason: String,
    },

    // Lifecycle errors
    #[error("Cannot {operation} while controller is {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    // Capability errors
    #[error("Device lacks required capability: {0}")]
    InvalidCapability(String),

    // Device errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Control loop panicked: {0}")]
    LoopPanicked(String),

    #[error("Failed to spawn {thread} thread: {message}")]
    Spawn {
        thread: String,
        message: String,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new out-of-range error.
    pub fn out_of_range(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid state error.
    pub fn invalid_state(operation: &'static str, status: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            status: status.to_string(),
        }
    }

    /// Create a new invalid capability error.
    pub fn invalid_capability(message: impl Into<String>) -> Self {
        Self::InvalidCapability(message.into())
    }

    /// Create a new thread spawn error.
    pub fn spawn(thread: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            thread: thread.into(),
            message: source.to_string(),
        }
    }

    /// Check if this is a validation error.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }

    /// Check if this is a lifecycle error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

/// Errors reported by a pin device during a read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation is not supported by this device.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Bus communication error.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl DeviceError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
