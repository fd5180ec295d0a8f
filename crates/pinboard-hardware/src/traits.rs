//! Pin device trait definitions.
//!
//! This module defines the contract between pin controllers and whatever
//! stands in for the expansion board: a real bus driver or the in-memory
//! [`MockPinBoard`](crate::mock::MockPinBoard).

use std::fmt;
use std::time::Instant;

use pinboard_core::{InputSnapshot, PinIndex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use crate::error::{DeviceError, Result};
use crate::types::DeviceInfo;

/// Identifier of one input subscription on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One input register snapshot, stamped when the device pushed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputNotification {
    pub snapshot: InputSnapshot,
    pub sent_at: Instant,
}

#[derive(Debug)]
enum Message {
    Snapshot(InputNotification),
    Close,
}

/// Sending half of an [`InputSubscription`], kept by the device.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    sender: mpsc::UnboundedSender<Message>,
}

impl SnapshotSender {
    /// Push a snapshot stamped with the current instant.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Disconnected` once the subscriber has closed
    /// or dropped its side.
    pub fn send(&self, snapshot: InputSnapshot) -> Result<()> {
        let notification = InputNotification {
            snapshot,
            sent_at: Instant::now(),
        };
        self.sender
            .send(Message::Snapshot(notification))
            .map_err(|_| DeviceError::disconnected("input subscription"))
    }

    /// Whether the subscriber is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Ends an [`InputSubscription`] from the subscriber's side.
///
/// Works whether or not the device still holds its [`SnapshotSender`].
/// Snapshots queued before the close are still delivered.
#[derive(Debug, Clone)]
pub struct SubscriptionCloser {
    sender: Option<mpsc::UnboundedSender<Message>>,
}

impl SubscriptionCloser {
    pub fn close(&self) {
        // Nothing to do when every sender is already gone
        if let Some(sender) = &self.sender
            && sender.send(Message::Close).is_err()
        {
            trace!("input subscription already closed");
        }
    }
}

/// Stream of raw input register snapshots from one device.
///
/// The device keeps the [`SnapshotSender`] and pushes a snapshot every time
/// any input changes. The stream ends when a [`SubscriptionCloser`] fires,
/// or once every sender is dropped, which happens on
/// [`PinDevice::unsubscribe_inputs`] or when the device itself is dropped.
#[derive(Debug)]
pub struct InputSubscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<Message>,
    weak_sender: mpsc::WeakUnboundedSender<Message>,
    closed: bool,
}

impl InputSubscription {
    /// Create a subscription and the sender the device keeps for it.
    pub fn channel(id: SubscriptionId) -> (Self, SnapshotSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = Self {
            id,
            receiver,
            weak_sender: sender.downgrade(),
            closed: false,
        };
        (subscription, SnapshotSender { sender })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Get a handle that ends this stream without the device's help.
    pub fn closer(&self) -> SubscriptionCloser {
        SubscriptionCloser {
            sender: self.weak_sender.upgrade(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the subscription is closed, by either side.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// call it from a dedicated thread.
    pub fn blocking_recv(&mut self) -> Option<InputNotification> {
        if self.closed {
            return None;
        }
        match self.receiver.blocking_recv() {
            Some(Message::Snapshot(notification)) => Some(notification),
            Some(Message::Close) | None => {
                self.shut();
                None
            }
        }
    }

    /// Take the next snapshot if one is already queued.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Disconnected` once the subscription is closed,
    /// or `DeviceError::InvalidData` if nothing is queued.
    pub fn try_recv(&mut self) -> Result<InputNotification> {
        if self.closed {
            return Err(DeviceError::disconnected(self.id.to_string()));
        }
        match self.receiver.try_recv() {
            Ok(Message::Snapshot(notification)) => Ok(notification),
            Err(TryRecvError::Empty) => Err(DeviceError::invalid_data("no input snapshot queued")),
            Ok(Message::Close) | Err(TryRecvError::Disconnected) => {
                self.shut();
                Err(DeviceError::disconnected(self.id.to_string()))
            }
        }
    }

    /// Refuse further snapshots so the device sees its sender as closed.
    fn shut(&mut self) {
        self.closed = true;
        self.receiver.close();
    }
}

/// Digital I/O expansion board.
///
/// Pin numbering is shared by inputs and outputs: eight of each, indexed
/// 0-7. Inputs are active-low on the wire, but [`read_input`] already
/// reports the logical level; raw snapshots delivered to subscribers are
/// left untouched.
///
/// All methods take `&self` so that one board can be shared through an
/// `Arc` by any number of controllers running on their own threads.
///
/// # Examples
///
/// ```
/// use pinboard_core::PinIndex;
/// use pinboard_hardware::{MockPinBoard, PinDevice, Result};
///
/// fn light_all<D: PinDevice + ?Sized>(board: &D) -> Result<()> {
///     for pin in PinIndex::all() {
///         board.write_output(pin, true)?;
///     }
///     Ok(())
/// }
///
/// let (board, handle) = MockPinBoard::new();
/// light_all(&board).unwrap();
/// assert_eq!(handle.outputs(), 0xFF);
/// ```
///
/// [`read_input`]: PinDevice::read_input
pub trait PinDevice: Send + Sync {
    /// Drive an output latch.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is disconnected or the bus write
    /// fails.
    fn write_output(&self, pin: PinIndex, value: bool) -> Result<()>;

    /// Read the logical level of an input pin.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is disconnected or the bus read
    /// fails.
    fn read_input(&self, pin: PinIndex) -> Result<bool>;

    /// Whether this device pushes input-changed snapshots.
    fn is_interrupt_capable(&self) -> bool {
        false
    }

    /// Open a stream of input register snapshots.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` on devices without interrupt
    /// support.
    fn subscribe_inputs(&self) -> Result<InputSubscription> {
        Err(DeviceError::unsupported("subscribe_inputs"))
    }

    /// Close a stream opened by [`subscribe_inputs`](Self::subscribe_inputs).
    ///
    /// Implementations must drop the [`SnapshotSender`] kept for `id`, so
    /// the subscriber sees the end of its stream. Unknown identifiers are
    /// ignored.
    fn unsubscribe_inputs(&self, id: SubscriptionId);

    /// Get device information.
    fn info(&self) -> DeviceInfo;
}
