//! Debounced input pin controller.
//!
//! An [`InputPinController`] subscribes to a device's raw input snapshots
//! and feeds them through a [`DebounceFilter`] for one pin. Accepted edges
//! are published as [`PinChanged`] events on a broadcast channel.
//!
//! Snapshots are consumed on a dispatcher thread owned by the controller.
//! Each one is judged at the instant the device sent it, not when the
//! dispatcher got to it, and is evaluated and published while the filter
//! lock is held, so events leave in the order their snapshots were decided.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use pinboard_core::{DeviceError, Error, GateDuration, InputSnapshot, PinChanged, PinIndex, Result};
use pinboard_hardware::{InputSubscription, PinDevice, SubscriptionCloser, SubscriptionId};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::config::InputConfig;
use crate::debounce::DebounceFilter;

/// Events buffered per receiver before slow receivers start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State shared with the dispatcher thread.
#[derive(Debug)]
struct InputShared {
    filter: Mutex<DebounceFilter>,
    events: broadcast::Sender<PinChanged>,
}

impl InputShared {
    fn filter(&self) -> MutexGuard<'_, DebounceFilter> {
        self.filter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process(&self, snapshot: InputSnapshot, now: Instant) -> Option<PinChanged> {
        let mut filter = self.filter();
        let decision = filter.evaluate(snapshot, now);
        let state = decision.emitted()?;

        let change = PinChanged::new(filter.pin(), state);
        debug!(pin = %change.pin, state, %decision, "input changed");
        if self.events.send(change.clone()).is_err() {
            trace!(pin = %change.pin, "no receivers for input change");
        }
        Some(change)
    }
}

/// Publishes debounced level changes of one input pin.
///
/// The initial clean state is read from the device during construction,
/// after the subscription is open, so the first snapshot is judged against
/// the real level and no change is lost in between. Dropping the controller
/// closes its device subscription, ends the stream on its own side and joins
/// the dispatcher thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pinboard_controllers::InputPinController;
/// use pinboard_core::PinIndex;
/// use pinboard_hardware::MockPinBoard;
///
/// let (board, handle) = MockPinBoard::new();
/// let input = InputPinController::new(Arc::new(board), 4, 0).unwrap();
/// let mut events = input.subscribe();
///
/// handle.press(PinIndex::new(4).unwrap());
///
/// let change = events.blocking_recv().unwrap();
/// assert_eq!(change.pin.as_u8(), 4);
/// assert!(change.state);
/// ```
pub struct InputPinController<D: PinDevice + ?Sized + 'static> {
    device: Arc<D>,
    pin: PinIndex,
    shared: Arc<InputShared>,
    subscription_id: SubscriptionId,
    closer: SubscriptionCloser,
    dispatcher: Option<JoinHandle<()>>,
}

impl<D: PinDevice + ?Sized + 'static> InputPinController<D> {
    /// Attach a debounced input to `pin` of `device`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `pin` is greater than 7 or `gate_ms`
    /// is negative, `Error::InvalidCapability` if the device cannot push
    /// input snapshots, `Error::Device` if the subscription or the initial
    /// read fails, and `Error::Spawn` if the dispatcher thread cannot be
    /// created.
    pub fn new(device: Arc<D>, pin: u8, gate_ms: i64) -> Result<Self> {
        let pin = PinIndex::new(pin)?;
        let gate = GateDuration::from_millis(gate_ms)?;
        Self::attach(device, pin, gate)
    }

    /// Attach with the default 20 ms gate.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_default_gate(device: Arc<D>, pin: u8) -> Result<Self> {
        Self::attach(device, PinIndex::new(pin)?, GateDuration::default())
    }

    /// Attach from configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(device: Arc<D>, config: &InputConfig) -> Result<Self> {
        Self::new(device, config.pin, config.gate_duration_ms)
    }

    fn attach(device: Arc<D>, pin: PinIndex, gate: GateDuration) -> Result<Self> {
        if !device.is_interrupt_capable() {
            return Err(Error::invalid_capability(format!(
                "{} does not push input changes",
                device.info()
            )));
        }

        let subscription = device.subscribe_inputs().map_err(|e| match e {
            DeviceError::Unsupported { .. } => Error::invalid_capability(format!(
                "{} refused an input subscription",
                device.info()
            )),
            other => Error::Device(other),
        })?;
        let subscription_id = subscription.id();
        let closer = subscription.closer();

        // Snapshots queued before this read are judged against it
        let initial_state = match device.read_input(pin) {
            Ok(state) => state,
            Err(e) => {
                device.unsubscribe_inputs(subscription_id);
                return Err(e.into());
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(InputShared {
            filter: Mutex::new(DebounceFilter::new(pin, gate, initial_state)),
            events,
        });

        let thread_name = format!("input-pin-{pin}");
        let dispatcher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || dispatch(subscription, &shared))
        };
        let dispatcher = match dispatcher {
            Ok(handle) => handle,
            Err(e) => {
                device.unsubscribe_inputs(subscription_id);
                return Err(Error::spawn(thread_name, e));
            }
        };

        info!(
            pin = %pin,
            gate = %gate,
            initial_state,
            subscription = %subscription_id,
            "input controller attached"
        );

        Ok(Self {
            device,
            pin,
            shared,
            subscription_id,
            closer,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn input_pin(&self) -> PinIndex {
        self.pin
    }

    /// Last clean state.
    pub fn state(&self) -> bool {
        self.shared.filter().state()
    }

    pub fn gate_duration(&self) -> GateDuration {
        self.shared.filter().gate()
    }

    /// Change the gate window for future rising edges.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `gate_ms` is negative; the previous
    /// window stays in effect.
    pub fn set_gate_duration_ms(&self, gate_ms: i64) -> Result<()> {
        let gate = GateDuration::from_millis(gate_ms)?;
        self.set_gate_duration(gate);
        Ok(())
    }

    pub fn set_gate_duration(&self, gate: GateDuration) {
        self.shared.filter().set_gate(gate);
        debug!(pin = %self.pin, gate = %gate, "gate duration changed");
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Receive every change published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PinChanged> {
        self.shared.events.subscribe()
    }

    /// Evaluate a snapshot as if it had just arrived from the device.
    pub fn process_snapshot(&self, snapshot: InputSnapshot) -> Option<PinChanged> {
        self.process_snapshot_at(snapshot, Instant::now())
    }

    /// Evaluate a snapshot that arrived at `now`.
    ///
    /// Publishes and returns the change, if the snapshot produced one.
    pub fn process_snapshot_at(&self, snapshot: InputSnapshot, now: Instant) -> Option<PinChanged> {
        self.shared.process(snapshot, now)
    }
}

impl<D: PinDevice + ?Sized + 'static> Drop for InputPinController<D> {
    fn drop(&mut self) {
        self.device.unsubscribe_inputs(self.subscription_id);
        self.closer.close();
        if let Some(dispatcher) = self.dispatcher.take()
            && dispatcher.join().is_err()
        {
            warn!(pin = %self.pin, "input dispatcher panicked");
        }
        info!(pin = %self.pin, subscription = %self.subscription_id, "input controller detached");
    }
}

impl<D: PinDevice + ?Sized + 'static> std::fmt::Debug for InputPinController<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPinController")
            .field("pin", &self.pin)
            .field("subscription_id", &self.subscription_id)
            .field("filter", &*self.shared.filter())
            .finish()
    }
}

/// Dispatcher thread body; returns once the subscription is closed.
fn dispatch(mut subscription: InputSubscription, shared: &InputShared) {
    while let Some(notification) = subscription.blocking_recv() {
        trace!(snapshot = %notification.snapshot, "input snapshot received");
        shared.process(notification.snapshot, notification.sent_at);
    }
    debug!(subscription = %subscription.id(), "input subscription closed");
}
