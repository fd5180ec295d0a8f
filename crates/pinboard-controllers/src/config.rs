//! Controller configuration.
//!
//! A [`BoardConfig`] describes every controller attached to one board. It
//! is usually loaded from JSON:
//!
//! ```json
//! {
//!   "outputs": [{ "pin": 0, "interval_ms": 250 }],
//!   "inputs": [{ "pin": 3, "gate_duration_ms": 20 }]
//! }
//! ```
//!
//! Omitted fields fall back to their defaults.

use std::collections::HashSet;
use std::sync::Arc;

use pinboard_core::constants::{DEFAULT_BLINK_INTERVAL_MS, DEFAULT_GATE_DURATION_MS};
use pinboard_core::{BlinkInterval, Error, GateDuration, PinIndex, Result};
use pinboard_hardware::PinDevice;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blinking::BlinkingController;
use crate::input::InputPinController;

/// Configuration of one blinking output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Output pin index (0-7).
    pub pin: u8,

    /// Time between toggles, in milliseconds.
    pub interval_ms: u64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            pin: 0,
            interval_ms: DEFAULT_BLINK_INTERVAL_MS,
        }
    }
}

impl BlinkConfig {
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` for an invalid pin or interval.
    pub fn validate(&self) -> Result<()> {
        PinIndex::new(self.pin)?;
        BlinkInterval::from_millis(self.interval_ms)?;
        Ok(())
    }
}

/// Configuration of one debounced input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Input pin index (0-7).
    pub pin: u8,

    /// Debounce gate window, in milliseconds.
    pub gate_duration_ms: i64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pin: 0,
            gate_duration_ms: DEFAULT_GATE_DURATION_MS as i64,
        }
    }
}

impl InputConfig {
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` for an invalid pin or a negative gate.
    pub fn validate(&self) -> Result<()> {
        PinIndex::new(self.pin)?;
        GateDuration::from_millis(self.gate_duration_ms)?;
        Ok(())
    }
}

/// Every controller attached to one board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Blinking outputs.
    pub outputs: Vec<BlinkConfig>,

    /// Debounced inputs.
    pub inputs: Vec<InputConfig>,
}

impl BoardConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is malformed, plus anything
    /// [`validate`](Self::validate) rejects.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinboard_controllers::BoardConfig;
    ///
    /// let config = BoardConfig::from_json_str(r#"{ "inputs": [{ "pin": 2 }] }"#).unwrap();
    /// assert!(config.outputs.is_empty());
    /// assert_eq!(config.inputs[0].gate_duration_ms, 20);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BoardConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check every entry against the constructor rules.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` for the first invalid entry, or
    /// `Error::Config` if two outputs drive the same pin.
    pub fn validate(&self) -> Result<()> {
        let mut driven = HashSet::new();
        for output in &self.outputs {
            output.validate()?;
            if !driven.insert(output.pin) {
                return Err(Error::Config(format!(
                    "output pin {} configured more than once",
                    output.pin
                )));
            }
        }

        for input in &self.inputs {
            input.validate()?;
        }

        debug!(
            outputs = self.outputs.len(),
            inputs = self.inputs.len(),
            "board configuration valid"
        );
        Ok(())
    }

    /// Create a stopped blinker for every configured output.
    ///
    /// # Errors
    ///
    /// Fails on the first entry the blinker constructor rejects.
    pub fn build_blinkers<D>(&self, device: &Arc<D>) -> Result<Vec<BlinkingController<D>>>
    where
        D: PinDevice + ?Sized + 'static,
    {
        self.outputs
            .iter()
            .map(|output| BlinkingController::from_config(Arc::clone(device), output))
            .collect()
    }

    /// Attach an input controller for every configured input.
    ///
    /// # Errors
    ///
    /// Fails on the first entry the input constructor rejects; controllers
    /// already attached are dropped and detach again.
    pub fn build_inputs<D>(&self, device: &Arc<D>) -> Result<Vec<InputPinController<D>>>
    where
        D: PinDevice + ?Sized + 'static,
    {
        self.inputs
            .iter()
            .map(|input| InputPinController::from_config(Arc::clone(device), input))
            .collect()
    }
}
