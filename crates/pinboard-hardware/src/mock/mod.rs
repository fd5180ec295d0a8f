//! Mock device implementations for testing and development.
//!
//! This module provides a simulated expansion board that can be controlled
//! programmatically without requiring physical hardware.

pub mod board;

// Re-export commonly used types
pub use board::{MockPinBoard, MockPinBoardBuilder, MockPinBoardHandle};
