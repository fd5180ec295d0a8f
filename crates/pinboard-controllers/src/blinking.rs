//! Blinking output controller.
//!
//! Toggles one output pin at a fixed interval for as long as the controller
//! runs: write `false`, pause, write `true`, pause, and so on. Every run
//! starts from `false`.

use std::sync::Arc;
use std::time::Duration;

use pinboard_core::{BlinkInterval, Error, PinIndex, Result};
use pinboard_hardware::PinDevice;

use crate::background::{BackgroundController, ControlLoop, LoopContext, StatusHandle};
use crate::config::BlinkConfig;
use crate::status::ControllerStatus;

/// Loop body alternating one output between off and on.
#[derive(Debug, Clone)]
pub struct PeriodicToggle {
    pin: PinIndex,
    interval: BlinkInterval,
    level: bool,
    name: String,
}

impl PeriodicToggle {
    pub fn new(pin: PinIndex, interval: BlinkInterval) -> Self {
        Self {
            pin,
            interval,
            level: false,
            name: format!("blink-{pin}"),
        }
    }

    pub fn pin(&self) -> PinIndex {
        self.pin
    }

    pub fn interval(&self) -> BlinkInterval {
        self.interval
    }
}

impl<D: PinDevice + ?Sized> ControlLoop<D> for PeriodicToggle {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, _device: &D) -> Result<()> {
        self.level = false;
        Ok(())
    }

    fn step(&mut self, device: &D, ctx: &LoopContext) -> Result<()> {
        device.write_output(self.pin, self.level)?;
        ctx.pause(self.interval.as_duration());
        self.level = !self.level;
        Ok(())
    }
}

/// Blinks an output pin on a background thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use pinboard_controllers::{BlinkingController, ControllerStatus};
/// use pinboard_hardware::MockPinBoard;
///
/// let (board, handle) = MockPinBoard::new();
/// let mut blinker = BlinkingController::new(Arc::new(board), 2, 10).unwrap();
///
/// blinker.start().unwrap();
/// while handle.writes_to(blinker.output_pin()).len() < 2 {
///     std::thread::sleep(Duration::from_millis(5));
/// }
/// blinker.stop().unwrap();
///
/// assert_eq!(blinker.status(), ControllerStatus::Stopped);
/// assert_eq!(handle.writes_to(blinker.output_pin())[..2], [false, true]);
/// ```
pub struct BlinkingController<D: PinDevice + ?Sized + 'static> {
    pin: PinIndex,
    interval: BlinkInterval,
    controller: BackgroundController<D, PeriodicToggle>,
}

impl<D: PinDevice + ?Sized + 'static> BlinkingController<D> {
    /// Create a stopped blinker for `pin`, toggling every `interval_ms`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `pin` is greater than 7 or
    /// `interval_ms` is below 10.
    pub fn new(device: Arc<D>, pin: u8, interval_ms: u64) -> Result<Self> {
        let pin = PinIndex::new(pin)?;
        let interval = BlinkInterval::from_millis(interval_ms)?;
        Ok(Self {
            pin,
            interval,
            controller: BackgroundController::new(device, PeriodicToggle::new(pin, interval)),
        })
    }

    /// Create a stopped blinker from configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(device: Arc<D>, config: &BlinkConfig) -> Result<Self> {
        Self::new(device, config.pin, config.interval_ms)
    }

    pub fn output_pin(&self) -> PinIndex {
        self.pin
    }

    pub fn interval(&self) -> BlinkInterval {
        self.interval
    }

    /// See [`BackgroundController::start`].
    pub fn start(&mut self) -> Result<()> {
        self.controller.start()
    }

    /// See [`BackgroundController::stop`].
    pub fn stop(&mut self) -> Result<()> {
        self.controller.stop()
    }

    pub fn status(&self) -> ControllerStatus {
        self.controller.status()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.controller.status_handle()
    }

    pub fn wait_for_status(&self, status: ControllerStatus, timeout: Duration) -> bool {
        self.controller.wait_for_status(status, timeout)
    }

    pub fn last_error(&self) -> Option<Error> {
        self.controller.last_error()
    }

    pub fn device(&self) -> &Arc<D> {
        self.controller.device()
    }
}

impl<D: PinDevice + ?Sized + 'static> std::fmt::Debug for BlinkingController<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlinkingController")
            .field("pin", &self.pin)
            .field("interval", &self.interval)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinboard_core::DeviceError;
    use pinboard_hardware::{MockPinBoard, MockPinBoardHandle};
    use rstest::rstest;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn board() -> (Arc<MockPinBoard>, MockPinBoardHandle) {
        let (board, handle) = MockPinBoard::new();
        (Arc::new(board), handle)
    }

    fn wait_for_writes(handle: &MockPinBoardHandle, pin: PinIndex, count: usize) {
        while handle.writes_to(pin).len() < count {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[rstest]
    #[case(0, 10)]
    #[case(7, 10)]
    #[case(3, 250)]
    fn test_new_valid(#[case] pin: u8, #[case] interval_ms: u64) {
        let (board, _handle) = board();
        let blinker = BlinkingController::new(board, pin, interval_ms).unwrap();

        assert_eq!(blinker.output_pin().as_u8(), pin);
        assert_eq!(blinker.interval().as_millis(), interval_ms);
        assert_eq!(blinker.status(), ControllerStatus::Stopped);
    }

    #[rstest]
    #[case(8, 100)]
    #[case(0, 9)]
    #[case(0, 0)]
    fn test_new_out_of_range(#[case] pin: u8, #[case] interval_ms: u64) {
        let (board, _handle) = board();
        let result = BlinkingController::new(board, pin, interval_ms);
        assert!(matches!(result, Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_from_config() {
        let (board, _handle) = board();
        let config = BlinkConfig {
            pin: 4,
            interval_ms: 40,
        };

        let blinker = BlinkingController::from_config(board, &config).unwrap();
        assert_eq!(blinker.output_pin().as_u8(), 4);
        assert_eq!(blinker.interval().as_millis(), 40);
    }

    #[test]
    fn test_toggle_alternates_starting_from_false() {
        let (board, handle) = board();
        let mut blinker = BlinkingController::new(board, 1, 10).unwrap();
        let pin = blinker.output_pin();

        blinker.start().unwrap();
        wait_for_writes(&handle, pin, 4);
        blinker.stop().unwrap();

        let writes = handle.writes_to(pin);
        for (i, value) in writes.iter().enumerate() {
            assert_eq!(*value, i % 2 == 1, "write {} was {}", i, value);
        }
    }

    #[test]
    fn test_restart_begins_from_false_again() {
        let (board, handle) = board();
        let mut blinker = BlinkingController::new(board, 0, 10).unwrap();
        let pin = blinker.output_pin();

        blinker.start().unwrap();
        wait_for_writes(&handle, pin, 2);
        blinker.stop().unwrap();

        handle.clear_writes();
        blinker.start().unwrap();
        wait_for_writes(&handle, pin, 1);
        blinker.stop().unwrap();

        assert_eq!(handle.writes_to(pin).first(), Some(&false));
    }

    #[test]
    fn test_only_touches_own_pin() {
        let (board, handle) = board();
        let mut blinker = BlinkingController::new(board, 6, 10).unwrap();

        blinker.start().unwrap();
        wait_for_writes(&handle, blinker.output_pin(), 3);
        blinker.stop().unwrap();

        assert!(
            handle
                .writes()
                .iter()
                .all(|(pin, _)| *pin == blinker.output_pin())
        );
    }

    #[test]
    fn test_write_fault_stops_blinker() {
        let (board, handle) = board();
        handle.fail_writes(DeviceError::disconnected("board0"));

        let mut blinker = BlinkingController::new(board, 0, 10).unwrap();
        blinker.start().unwrap();

        assert!(blinker.wait_for_status(ControllerStatus::Stopped, TIMEOUT));
        assert!(matches!(
            blinker.last_error(),
            Some(Error::Device(DeviceError::Disconnected { .. }))
        ));
    }

    #[test]
    fn test_periodic_toggle_name() {
        let toggle = PeriodicToggle::new(
            PinIndex::new(5).unwrap(),
            BlinkInterval::from_millis(10).unwrap(),
        );
        assert_eq!(ControlLoop::<MockPinBoard>::name(&toggle), "blink-5");
        assert_eq!(toggle.pin().as_u8(), 5);
        assert_eq!(toggle.interval().as_millis(), 10);
    }
}
