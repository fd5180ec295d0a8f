//! Pin device abstraction layer for the eight-in/eight-out expansion board.
//!
//! Controllers never talk to the bus directly. They drive a [`PinDevice`],
//! which writes output latches, reads input levels and, on boards wired for
//! interrupts, publishes a snapshot of the whole input register every time
//! any input changes.
//!
//! # Design Philosophy
//!
//! - **Blocking**: Every operation is a short synchronous register access.
//!   Controllers call them from their own threads.
//! - **Object-safe**: `Arc<dyn PinDevice>` works wherever a concrete device
//!   does.
//! - **Thread-safe**: `PinDevice` requires `Send + Sync`; one board is shared
//!   by many controllers.
//! - **Error-aware**: Reads and writes return [`Result<T>`][error::Result]
//!   carrying a [`DeviceError`].
//!
//! # Input Notifications
//!
//! ```
//! use pinboard_core::PinIndex;
//! use pinboard_hardware::{MockPinBoard, PinDevice};
//!
//! let (board, handle) = MockPinBoard::new();
//! let mut subscription = board.subscribe_inputs().unwrap();
//!
//! handle.press(PinIndex::new(3).unwrap());
//!
//! let notification = subscription.try_recv().unwrap();
//! assert!(notification.snapshot.is_active(PinIndex::new(3).unwrap()));
//! ```
//!
//! # Mock Implementations
//!
//! [`MockPinBoard`] keeps the board in memory so controllers can be developed
//! and tested without hardware.

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DeviceError, Result};
pub use mock::{MockPinBoard, MockPinBoardBuilder, MockPinBoardHandle};
pub use traits::{
    InputNotification, InputSubscription, PinDevice, SnapshotSender, SubscriptionCloser,
    SubscriptionId,
};
pub use types::DeviceInfo;
