//! Background controller lifecycle.
//!
//! A [`BackgroundController`] runs a [`ControlLoop`] on its own thread
//! against a shared [`PinDevice`]. It does not touch the device itself; it
//! only decides when the loop body runs.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                thread up
//! Stopped ───────────► Starting ───────────────► Running
//!    ▲                    │                         │
//!    │                    │ stop()                  │ stop()
//!    │                    ▼                         ▼
//!    └──────────────── Stopping ◄───────────────────┘
//!       thread joined
//! ```
//!
//! A loop body error ends the run directly in `Stopped`, with the error kept
//! for [`BackgroundController::last_error`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pinboard_controllers::{BackgroundController, ControllerStatus, LoopContext};
//! use pinboard_core::PinIndex;
//! use pinboard_hardware::{MockPinBoard, PinDevice};
//!
//! let (board, handle) = MockPinBoard::new();
//! let pin = PinIndex::new(0).unwrap();
//!
//! let mut controller = BackgroundController::new(
//!     Arc::new(board),
//!     move |board: &MockPinBoard, ctx: &LoopContext| -> pinboard_core::Result<()> {
//!         board.write_output(pin, true)?;
//!         ctx.pause(Duration::from_millis(10));
//!         Ok(())
//!     },
//! );
//!
//! controller.start().unwrap();
//! assert!(controller.wait_for_status(ControllerStatus::Running, Duration::from_secs(1)));
//!
//! controller.stop().unwrap();
//! assert_eq!(controller.status(), ControllerStatus::Stopped);
//! assert!(handle.output(pin));
//! ```

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pinboard_core::{Error, Result};
use pinboard_hardware::PinDevice;
use tracing::{debug, error, info, warn};

use crate::status::{ControllerStatus, StatusCell};

/// Thread name used by loop bodies that do not provide one.
const DEFAULT_LOOP_NAME: &str = "control-loop";

/// Body of an autonomous output behaviour.
///
/// The controller calls [`step`](Self::step) repeatedly while its status is
/// `Running`. One call is one iteration; the stop request is observed
/// between iterations, and during [`LoopContext::pause`].
///
/// Closures taking `(&D, &LoopContext)` implement this trait.
pub trait ControlLoop<D: ?Sized>: Send + 'static {
    /// Name of the loop thread.
    fn name(&self) -> &str {
        DEFAULT_LOOP_NAME
    }

    /// Called on the loop thread before the first iteration of every run.
    ///
    /// # Errors
    ///
    /// An error ends the run before any iteration executes.
    fn on_start(&mut self, _device: &D) -> Result<()> {
        Ok(())
    }

    /// Run one iteration.
    ///
    /// # Errors
    ///
    /// An error ends the run; the controller does not retry.
    fn step(&mut self, device: &D, ctx: &LoopContext) -> Result<()>;
}

impl<D, F> ControlLoop<D> for F
where
    D: ?Sized,
    F: FnMut(&D, &LoopContext) -> Result<()> + Send + 'static,
{
    fn step(&mut self, device: &D, ctx: &LoopContext) -> Result<()> {
        self(device, ctx)
    }
}

/// State shared between a controller and its loop thread.
#[derive(Debug)]
struct LoopShared {
    status: StatusCell,
    last_error: Mutex<Option<Error>>,
}

impl LoopShared {
    fn record_error(&self, err: Error) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn last_error(&self) -> Option<Error> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// End a run that failed on its own.
    ///
    /// A run that is already being stopped is left for `stop()` to finish.
    fn fail(&self, err: Error) {
        self.record_error(err);
        let mut status = self.status.lock();
        if matches!(
            *status,
            ControllerStatus::Running | ControllerStatus::Starting
        ) {
            self.status.set(&mut status, ControllerStatus::Stopped);
        }
    }
}

/// Handed to every loop iteration.
#[derive(Debug, Clone)]
pub struct LoopContext {
    shared: Arc<LoopShared>,
}

impl LoopContext {
    /// Whether the controller still wants iterations.
    pub fn is_running(&self) -> bool {
        self.shared.status.get() == ControllerStatus::Running
    }

    /// Block the loop thread for `duration`.
    ///
    /// Returns early, with `false`, as soon as a stop is requested.
    pub fn pause(&self, duration: Duration) -> bool {
        self.shared.status.pause_while_running(duration)
    }
}

/// Read-only view of a controller's status, usable from other threads.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    shared: Arc<LoopShared>,
}

impl StatusHandle {
    pub fn status(&self) -> ControllerStatus {
        self.shared.status.get()
    }

    /// Block until the controller reaches `status` or `timeout` elapses.
    pub fn wait_for(&self, status: ControllerStatus, timeout: Duration) -> bool {
        self.shared.status.wait_for(status, timeout)
    }

    pub fn last_error(&self) -> Option<Error> {
        self.shared.last_error()
    }
}

/// Ends a run whose loop body panicked.
struct PanicGuard<'a> {
    shared: &'a LoopShared,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("control loop panicked");
            self.shared
                .fail(Error::LoopPanicked("loop body panicked".to_string()));
        }
    }
}

/// Runs a [`ControlLoop`] on a dedicated thread.
///
/// At most one loop thread exists per controller. [`start`](Self::start)
/// returns immediately; [`stop`](Self::stop) blocks until the thread has
/// exited, so once it returns no iteration is running. Dropping a running
/// controller stops it.
pub struct BackgroundController<D, L>
where
    D: PinDevice + ?Sized + 'static,
    L: ControlLoop<D>,
{
    /// Device driven by the loop body.
    device: Arc<D>,

    /// Loop body while no thread owns it.
    body: Option<L>,

    /// Thread name, cached from the body.
    name: String,

    /// Status and last error, shared with the loop thread.
    shared: Arc<LoopShared>,

    /// Loop thread; hands the body back when it exits.
    worker: Option<JoinHandle<L>>,
}

impl<D, L> BackgroundController<D, L>
where
    D: PinDevice + ?Sized + 'static,
    L: ControlLoop<D>,
{
    /// Create a stopped controller.
    pub fn new(device: Arc<D>, body: L) -> Self {
        Self {
            device,
            name: body.name().to_string(),
            body: Some(body),
            shared: Arc::new(LoopShared {
                status: StatusCell::new(),
                last_error: Mutex::new(None),
            }),
            worker: None,
        }
    }

    /// Name of the loop, also used for its thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current status.
    pub fn status(&self) -> ControllerStatus {
        self.shared.status.get()
    }

    /// Status view for other threads.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until the controller reaches `status` or `timeout` elapses.
    ///
    /// Returns whether the status was reached.
    pub fn wait_for_status(&self, status: ControllerStatus, timeout: Duration) -> bool {
        self.shared.status.wait_for(status, timeout)
    }

    /// Error that ended the most recent run, if it ended on its own.
    pub fn last_error(&self) -> Option<Error> {
        self.shared.last_error()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Loop body, while the controller is stopped.
    pub fn body(&self) -> Option<&L> {
        self.body.as_ref()
    }

    /// Spawn the loop thread.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the controller is stopped,
    /// `Error::LoopPanicked` if a previous run panicked and took the loop
    /// body with it, and `Error::Spawn` if the thread cannot be created.
    pub fn start(&mut self) -> Result<()> {
        let status = self.status();
        if status != ControllerStatus::Stopped {
            return Err(Error::invalid_state("start", status));
        }

        self.reclaim_body()?;
        let body = self
            .body
            .take()
            .ok_or_else(|| Error::LoopPanicked("loop body lost".to_string()))?;

        if !self
            .shared
            .status
            .transition(ControllerStatus::Stopped, ControllerStatus::Starting)
        {
            self.body = Some(body);
            return Err(Error::invalid_state("start", self.status()));
        }
        self.shared.clear_error();

        let device = Arc::clone(&self.device);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_loop(device, shared, body));

        match spawned {
            Ok(worker) => {
                info!(controller = %self.name, "controller started");
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                let err = Error::spawn(self.name.clone(), e);
                error!(controller = %self.name, error = %err, "failed to start controller");
                self.shared.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Ask the loop to exit and wait for its thread.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the controller is starting or
    /// running, and `Error::LoopPanicked` if the loop thread panicked while
    /// stopping. The controller is stopped afterwards in both cases.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut status = self.shared.status.lock();
            match *status {
                ControllerStatus::Running | ControllerStatus::Starting => {
                    self.shared.status.set(&mut status, ControllerStatus::Stopping);
                }
                other => return Err(Error::invalid_state("stop", other)),
            }
        }

        debug!(controller = %self.name, "waiting for control loop to exit");
        let outcome = match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(body) => {
                    self.body = Some(body);
                    Ok(())
                }
                Err(payload) => {
                    let err = Error::LoopPanicked(panic_message(payload.as_ref()));
                    self.shared.record_error(err.clone());
                    Err(err)
                }
            },
            None => {
                warn!(controller = %self.name, "no control loop thread to join");
                Ok(())
            }
        };

        self.shared
            .status
            .transition(ControllerStatus::Stopping, ControllerStatus::Stopped);
        info!(controller = %self.name, "controller stopped");
        outcome
    }

    /// Join the thread of a run that ended on its own.
    fn reclaim_body(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        match worker.join() {
            Ok(body) => {
                self.body = Some(body);
                Ok(())
            }
            Err(payload) => Err(Error::LoopPanicked(panic_message(payload.as_ref()))),
        }
    }
}

impl<D, L> Drop for BackgroundController<D, L>
where
    D: PinDevice + ?Sized + 'static,
    L: ControlLoop<D>,
{
    fn drop(&mut self) {
        if self.status().is_active()
            && let Err(e) = self.stop()
        {
            warn!(controller = %self.name, error = %e, "error while stopping dropped controller");
        }
        if let Some(worker) = self.worker.take()
            && let Err(payload) = worker.join()
        {
            warn!(
                controller = %self.name,
                panic = %panic_message(payload.as_ref()),
                "control loop thread panicked"
            );
        }
    }
}

impl<D, L> std::fmt::Debug for BackgroundController<D, L>
where
    D: PinDevice + ?Sized + 'static,
    L: ControlLoop<D>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundController")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Loop thread entry point. Returns the body so the next run can reuse it.
fn run_loop<D, L>(device: Arc<D>, shared: Arc<LoopShared>, mut body: L) -> L
where
    D: PinDevice + ?Sized,
    L: ControlLoop<D>,
{
    let _guard = PanicGuard { shared: &shared };

    if !shared
        .status
        .transition(ControllerStatus::Starting, ControllerStatus::Running)
    {
        // stop() got in first
        return body;
    }

    let ctx = LoopContext {
        shared: Arc::clone(&shared),
    };
    if let Err(err) = drive(&mut body, device.as_ref(), &ctx) {
        error!(controller = %body.name(), error = %err, "control loop failed");
        shared.fail(err);
    }
    body
}

fn drive<D, L>(body: &mut L, device: &D, ctx: &LoopContext) -> Result<()>
where
    D: ?Sized,
    L: ControlLoop<D>,
{
    body.on_start(device)?;
    while ctx.is_running() {
        body.step(device, ctx)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinboard_core::{DeviceError, PinIndex};
    use pinboard_hardware::{MockPinBoard, MockPinBoardHandle};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn board() -> (Arc<MockPinBoard>, MockPinBoardHandle) {
        let (board, handle) = MockPinBoard::new();
        (Arc::new(board), handle)
    }

    fn pin(index: u8) -> PinIndex {
        PinIndex::new(index).unwrap()
    }

    /// Writes `true` to pin 0 and pauses briefly, counting iterations.
    struct Counter {
        iterations: Arc<AtomicUsize>,
    }

    impl ControlLoop<MockPinBoard> for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn step(&mut self, device: &MockPinBoard, ctx: &LoopContext) -> Result<()> {
            device.write_output(pin(0), true)?;
            self.iterations.fetch_add(1, Ordering::SeqCst);
            ctx.pause(Duration::from_millis(1));
            Ok(())
        }
    }

    fn counter() -> (Counter, Arc<AtomicUsize>) {
        let iterations = Arc::new(AtomicUsize::new(0));
        (
            Counter {
                iterations: Arc::clone(&iterations),
            },
            iterations,
        )
    }

    #[test]
    fn test_new_controller_is_stopped() {
        let (board, _handle) = board();
        let (body, _) = counter();
        let controller = BackgroundController::new(board, body);

        assert_eq!(controller.status(), ControllerStatus::Stopped);
        assert_eq!(controller.name(), "counter");
        assert!(controller.last_error().is_none());
        assert!(controller.body().is_some());
    }

    #[test]
    fn test_start_and_stop() {
        let (board, handle) = board();
        let (body, iterations) = counter();
        let mut controller = BackgroundController::new(board, body);

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Running, TIMEOUT));

        while iterations.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        controller.stop().unwrap();
        assert_eq!(controller.status(), ControllerStatus::Stopped);
        assert!(handle.output(pin(0)));
        assert!(controller.body().is_some());
    }

    #[test]
    fn test_start_twice_fails() {
        let (board, _handle) = board();
        let (body, _) = counter();
        let mut controller = BackgroundController::new(board, body);

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Running, TIMEOUT));

        let result = controller.start();
        assert!(matches!(result, Err(Error::InvalidState { .. })));

        controller.stop().unwrap();
    }

    #[test]
    fn test_stop_when_stopped_fails() {
        let (board, _handle) = board();
        let (body, _) = counter();
        let mut controller = BackgroundController::new(board, body);

        let result = controller.stop();
        assert!(matches!(result, Err(Error::InvalidState { .. })));
        assert_eq!(controller.status(), ControllerStatus::Stopped);
    }

    #[test]
    fn test_stop_waits_for_iteration_to_finish() {
        let (board, _handle) = board();
        let in_iteration = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&in_iteration);

        let mut controller = BackgroundController::new(
            board,
            move |_board: &MockPinBoard, _ctx: &LoopContext| -> Result<()> {
                flag.store(true, Ordering::SeqCst);
                // Uninterruptible work
                thread::sleep(Duration::from_millis(20));
                flag.store(false, Ordering::SeqCst);
                Ok(())
            },
        );

        controller.start().unwrap();
        while !in_iteration.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        controller.stop().unwrap();
        assert_eq!(controller.status(), ControllerStatus::Stopped);
        assert!(!in_iteration.load(Ordering::SeqCst));
    }

    #[test]
    fn test_restart_after_stop() {
        let (board, _handle) = board();
        let (body, iterations) = counter();
        let mut controller = BackgroundController::new(board, body);

        controller.start().unwrap();
        controller.stop().unwrap();

        let before = iterations.load(Ordering::SeqCst);
        controller.start().unwrap();
        while iterations.load(Ordering::SeqCst) == before {
            thread::sleep(Duration::from_millis(1));
        }
        controller.stop().unwrap();
    }

    #[test]
    fn test_device_fault_stops_controller() {
        let (board, handle) = board();
        handle.fail_writes(DeviceError::communication("bus stalled"));

        let (body, iterations) = counter();
        let mut controller = BackgroundController::new(board, body);

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Stopped, TIMEOUT));

        assert_eq!(iterations.load(Ordering::SeqCst), 0);
        assert!(matches!(
            controller.last_error(),
            Some(Error::Device(DeviceError::Communication { .. }))
        ));

        // No run in progress, so there is nothing to stop
        assert!(matches!(controller.stop(), Err(Error::InvalidState { .. })));

        // Restart reclaims the body and clears the fault
        handle.clear_fault();
        controller.start().unwrap();
        assert!(controller.last_error().is_none());
        controller.stop().unwrap();
    }

    #[test]
    fn test_on_start_failure_ends_run() {
        struct Refuses;

        impl ControlLoop<MockPinBoard> for Refuses {
            fn on_start(&mut self, _device: &MockPinBoard) -> Result<()> {
                Err(DeviceError::other("not ready").into())
            }

            fn step(&mut self, _device: &MockPinBoard, _ctx: &LoopContext) -> Result<()> {
                panic!("step must not run");
            }
        }

        let (board, _handle) = board();
        let mut controller = BackgroundController::new(board, Refuses);
        assert_eq!(controller.name(), DEFAULT_LOOP_NAME);

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Stopped, TIMEOUT));
        assert!(controller.last_error().is_some());
    }

    #[test]
    fn test_panicking_body_stops_controller() {
        let (board, _handle) = board();
        let mut controller = BackgroundController::new(
            board,
            |_board: &MockPinBoard, _ctx: &LoopContext| -> Result<()> { panic!("boom") },
        );

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Stopped, TIMEOUT));
        assert!(matches!(
            controller.last_error(),
            Some(Error::LoopPanicked(_))
        ));

        // The body went down with the thread
        assert!(matches!(controller.start(), Err(Error::LoopPanicked(_))));
        assert_eq!(controller.status(), ControllerStatus::Stopped);
    }

    #[test]
    fn test_drop_after_panicked_run() {
        let (board, handle) = board();
        let mut controller = BackgroundController::new(
            board,
            |board: &MockPinBoard, _ctx: &LoopContext| -> Result<()> {
                board.write_output(PinIndex::new(0)?, true)?;
                panic!("boom")
            },
        );

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Stopped, TIMEOUT));
        let status = controller.status_handle();

        // The dead thread is joined without re-raising its panic
        drop(controller);
        assert_eq!(status.status(), ControllerStatus::Stopped);
        assert_eq!(handle.writes_to(pin(0)), vec![true]);
    }

    #[test]
    fn test_status_handle_from_other_thread() {
        let (board, _handle) = board();
        let (body, _) = counter();
        let mut controller = BackgroundController::new(board, body);
        let status = controller.status_handle();

        let watcher = thread::spawn(move || status.wait_for(ControllerStatus::Running, TIMEOUT));
        controller.start().unwrap();
        assert!(watcher.join().unwrap());

        controller.stop().unwrap();
        assert_eq!(controller.status_handle().status(), ControllerStatus::Stopped);
    }

    #[test]
    fn test_drop_stops_running_controller() {
        let (board, _handle) = board();
        let (body, iterations) = counter();
        let mut controller = BackgroundController::new(board, body);

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Running, TIMEOUT));
        let status = controller.status_handle();
        drop(controller);

        assert_eq!(status.status(), ControllerStatus::Stopped);
        let after_drop = iterations.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(iterations.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn test_pause_is_cut_short_by_stop() {
        let (board, _handle) = board();
        let mut controller = BackgroundController::new(
            board,
            |_board: &MockPinBoard, ctx: &LoopContext| -> Result<()> {
                ctx.pause(Duration::from_secs(60));
                Ok(())
            },
        );

        controller.start().unwrap();
        assert!(controller.wait_for_status(ControllerStatus::Running, TIMEOUT));

        let begin = std::time::Instant::now();
        controller.stop().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_dyn_device() {
        let (board, handle) = MockPinBoard::new();
        let device: Arc<dyn PinDevice> = Arc::new(board);

        let mut controller = BackgroundController::new(
            device,
            |board: &(dyn PinDevice + 'static), ctx: &LoopContext| -> Result<()> {
                board.write_output(PinIndex::new(3)?, true)?;
                ctx.pause(Duration::from_millis(1));
                Ok(())
            },
        );

        controller.start().unwrap();
        while !handle.output(pin(3)) {
            thread::sleep(Duration::from_millis(1));
        }
        controller.stop().unwrap();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
