//! Common types shared across pin device implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic device information.
///
/// Contains metadata about a board such as its name, model and bus
/// address. Controllers include it in their log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "board0", "Mock Pin Board").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Optional bus address (e.g. SPI chip select or I2C address).
    pub address: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            address: None,
        }
    }

    /// Set the bus address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{} ({} @ {})", self.name, self.model, address),
            None => write!(f, "{} ({})", self.name, self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_builder() {
        let info = DeviceInfo::new("board0", "MCP23S17").with_address("spi0.0");

        assert_eq!(info.name, "board0");
        assert_eq!(info.model, "MCP23S17");
        assert_eq!(info.address, Some("spi0.0".to_string()));
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo::new("board0", "MCP23S17");
        assert_eq!(info.to_string(), "board0 (MCP23S17)");

        let info = info.with_address("spi0.1");
        assert_eq!(info.to_string(), "board0 (MCP23S17 @ spi0.1)");
    }

    #[test]
    fn test_device_info_serialization() {
        let info = DeviceInfo::new("board0", "MCP23S17");
        let json = serde_json::to_string(&info).unwrap();
        let deserialized: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, deserialized);
    }
}
