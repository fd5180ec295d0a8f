//! Pin controllers for the eight-in/eight-out expansion board.
//!
//! Two kinds of controller share one [`PinDevice`](pinboard_hardware::PinDevice):
//!
//! - **Output behaviours** run on a [`BackgroundController`], which owns the
//!   start/stop lifecycle of a loop thread. [`BlinkingController`] is the
//!   stock behaviour: it toggles one output at a fixed interval.
//! - **Debounced inputs** are [`InputPinController`]s. Each one subscribes to
//!   the board's input snapshots, filters one pin through a
//!   [`DebounceFilter`], and publishes clean level changes.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use pinboard_controllers::{BoardConfig, ControllerStatus};
//! use pinboard_hardware::MockPinBoard;
//!
//! let config = BoardConfig::from_json_str(r#"{
//!     "outputs": [{ "pin": 0, "interval_ms": 50 }],
//!     "inputs": [{ "pin": 1 }]
//! }"#).unwrap();
//!
//! let (board, _handle) = MockPinBoard::new();
//! let board = Arc::new(board);
//!
//! let mut blinkers = config.build_blinkers(&board).unwrap();
//! let inputs = config.build_inputs(&board).unwrap();
//!
//! blinkers[0].start().unwrap();
//! blinkers[0].stop().unwrap();
//! assert_eq!(blinkers[0].status(), ControllerStatus::Stopped);
//! assert!(!inputs[0].state());
//! ```

pub mod background;
pub mod blinking;
pub mod config;
pub mod debounce;
pub mod input;
pub mod status;

pub use background::{BackgroundController, ControlLoop, LoopContext, StatusHandle};
pub use blinking::{BlinkingController, PeriodicToggle};
pub use config::{BlinkConfig, BoardConfig, InputConfig};
pub use debounce::{DebounceFilter, EdgeDecision};
pub use input::InputPinController;
pub use status::ControllerStatus;
