//! Common test utilities for controller integration tests.
//!
//! Each test binary pulls this module in with `mod common;`, so not every
//! helper is used by every binary.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use pinboard_core::PinIndex;
use pinboard_hardware::{MockPinBoard, MockPinBoardHandle};
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Route controller logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Interrupt-capable mock board, shared.
pub fn board() -> (Arc<MockPinBoard>, MockPinBoardHandle) {
    init_tracing();
    let (board, handle) = MockPinBoard::new();
    (Arc::new(board), handle)
}

pub fn pin(index: u8) -> PinIndex {
    PinIndex::new(index).unwrap()
}

/// Poll `condition` until it holds; panics after [`TIMEOUT`].
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}
