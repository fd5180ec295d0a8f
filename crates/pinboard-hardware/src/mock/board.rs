//! Mock expansion board for testing and development.
//!
//! The board keeps its output latch, input register, write history and
//! subscriber list in memory. A [`MockPinBoardHandle`] plays the part of
//! the outside world: it moves inputs, watches outputs and injects faults.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pinboard_core::constants::ALL_INPUTS_RELEASED;
use pinboard_core::{InputSnapshot, PinIndex};
use tracing::{debug, trace};

use crate::error::{DeviceError, Result};
use crate::traits::{InputSubscription, PinDevice, SnapshotSender, SubscriptionId};
use crate::types::DeviceInfo;

const MOCK_MODEL: &str = "Mock Pin Board v1.0";

#[derive(Debug)]
struct BoardState {
    outputs: u8,
    inputs: u8,
    writes: Vec<(PinIndex, bool)>,
    write_fault: Option<DeviceError>,
    connected: bool,
    subscribers: HashMap<SubscriptionId, SnapshotSender>,
    next_subscription: u64,
}

impl BoardState {
    fn new(inputs: u8) -> Self {
        Self {
            outputs: 0,
            inputs,
            writes: Vec::new(),
            write_fault: None,
            connected: true,
            subscribers: HashMap::new(),
            next_subscription: 0,
        }
    }

    fn ensure_connected(&self, name: &str) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::disconnected(name))
        }
    }

    /// Push the current input register to every live subscriber.
    fn notify(&mut self) {
        let snapshot = InputSnapshot::from_raw(self.inputs);
        self.subscribers
            .retain(|_, sender| sender.send(snapshot).is_ok());
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    interrupt_capable: bool,
    state: Mutex<BoardState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock expansion board.
///
/// # Examples
///
/// ```
/// use pinboard_core::PinIndex;
/// use pinboard_hardware::{MockPinBoard, PinDevice};
///
/// let (board, handle) = MockPinBoard::new();
/// let pin = PinIndex::new(2).unwrap();
///
/// board.write_output(pin, true).unwrap();
/// assert!(handle.output(pin));
///
/// handle.press(pin);
/// assert!(board.read_input(pin).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct MockPinBoard {
    shared: Arc<Shared>,
}

impl MockPinBoard {
    /// Create an interrupt-capable board with all inputs released.
    ///
    /// Returns a tuple of (MockPinBoard, MockPinBoardHandle) where the
    /// handle drives inputs and observes outputs.
    pub fn new() -> (Self, MockPinBoardHandle) {
        Self::builder().build()
    }

    /// Create an interrupt-capable board with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockPinBoardHandle) {
        Self::builder().name(name).build()
    }

    pub fn builder() -> MockPinBoardBuilder {
        MockPinBoardBuilder::default()
    }
}

impl Default for MockPinBoard {
    fn default() -> Self {
        Self::new().0
    }
}

impl PinDevice for MockPinBoard {
    fn write_output(&self, pin: PinIndex, value: bool) -> Result<()> {
        let mut state = self.shared.lock();
        state.ensure_connected(&self.shared.name)?;

        if let Some(fault) = &state.write_fault {
            return Err(fault.clone());
        }

        if value {
            state.outputs |= pin.mask();
        } else {
            state.outputs &= !pin.mask();
        }
        state.writes.push((pin, value));
        trace!(board = %self.shared.name, %pin, value, "output written");
        Ok(())
    }

    fn read_input(&self, pin: PinIndex) -> Result<bool> {
        let state = self.shared.lock();
        state.ensure_connected(&self.shared.name)?;
        Ok(InputSnapshot::from_raw(state.inputs).is_active(pin))
    }

    fn is_interrupt_capable(&self) -> bool {
        self.shared.interrupt_capable
    }

    fn subscribe_inputs(&self) -> Result<InputSubscription> {
        if !self.shared.interrupt_capable {
            return Err(DeviceError::unsupported("subscribe_inputs"));
        }

        let mut state = self.shared.lock();
        state.ensure_connected(&self.shared.name)?;

        let id = SubscriptionId::new(state.next_subscription);
        state.next_subscription += 1;

        let (subscription, sender) = InputSubscription::channel(id);
        state.subscribers.insert(id, sender);
        debug!(board = %self.shared.name, %id, "input subscription opened");
        Ok(subscription)
    }

    fn unsubscribe_inputs(&self, id: SubscriptionId) {
        if self.shared.lock().subscribers.remove(&id).is_some() {
            debug!(board = %self.shared.name, %id, "input subscription closed");
        }
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::new(self.shared.name.clone(), MOCK_MODEL)
    }
}

/// Builder for [`MockPinBoard`].
#[derive(Debug, Clone)]
pub struct MockPinBoardBuilder {
    name: String,
    interrupt_capable: bool,
    inputs: u8,
}

impl Default for MockPinBoardBuilder {
    fn default() -> Self {
        Self {
            name: "Mock Pin Board".to_string(),
            interrupt_capable: true,
            inputs: ALL_INPUTS_RELEASED,
        }
    }
}

impl MockPinBoardBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether the board pushes input-changed snapshots (default `true`).
    pub fn interrupt_capable(mut self, enabled: bool) -> Self {
        self.interrupt_capable = enabled;
        self
    }

    /// Raw input register at power-up (default all released, `0xFF`).
    pub fn initial_inputs(mut self, raw: u8) -> Self {
        self.inputs = raw;
        self
    }

    pub fn build(self) -> (MockPinBoard, MockPinBoardHandle) {
        let shared = Arc::new(Shared {
            name: self.name,
            interrupt_capable: self.interrupt_capable,
            state: Mutex::new(BoardState::new(self.inputs)),
        });

        let board = MockPinBoard {
            shared: Arc::clone(&shared),
        };
        (board, MockPinBoardHandle { shared })
    }
}

/// Handle for controlling a mock board.
///
/// Cloneable; every clone drives the same board.
#[derive(Debug, Clone)]
pub struct MockPinBoardHandle {
    shared: Arc<Shared>,
}

impl MockPinBoardHandle {
    /// Replace the raw input register and notify subscribers.
    ///
    /// Subscribers are notified even when the value did not change, the way
    /// a bouncing contact can raise an interrupt without a visible change.
    pub fn set_inputs(&self, raw: u8) {
        let mut state = self.shared.lock();
        state.inputs = raw;
        state.notify();
    }

    /// Drive one input to a logical level and notify subscribers.
    pub fn set_input(&self, pin: PinIndex, active: bool) {
        let mut state = self.shared.lock();
        state.inputs = InputSnapshot::from_raw(state.inputs)
            .with_active(pin, active)
            .raw();
        state.notify();
    }

    /// Close the contact on `pin` (pull its bit low).
    pub fn press(&self, pin: PinIndex) {
        self.set_input(pin, true);
    }

    /// Open the contact on `pin` (let its bit float high).
    pub fn release(&self, pin: PinIndex) {
        self.set_input(pin, false);
    }

    /// Raw input register.
    pub fn inputs(&self) -> u8 {
        self.shared.lock().inputs
    }

    /// Current output latch byte.
    pub fn outputs(&self) -> u8 {
        self.shared.lock().outputs
    }

    /// Current level of one output latch.
    pub fn output(&self, pin: PinIndex) -> bool {
        self.outputs() & pin.mask() != 0
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<(PinIndex, bool)> {
        self.shared.lock().writes.clone()
    }

    /// Successful writes to one pin, oldest first.
    pub fn writes_to(&self, pin: PinIndex) -> Vec<bool> {
        self.shared
            .lock()
            .writes
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|(_, value)| *value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.shared.lock().writes.clear();
    }

    /// Make every following write fail with `fault`.
    pub fn fail_writes(&self, fault: DeviceError) {
        self.shared.lock().write_fault = Some(fault);
    }

    pub fn clear_fault(&self) {
        self.shared.lock().write_fault = None;
    }

    /// Simulate the board dropping off the bus.
    ///
    /// Reads and writes fail and every input subscription is closed.
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        state.connected = false;
        state.subscribers.clear();
    }

    /// Number of open input subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}
