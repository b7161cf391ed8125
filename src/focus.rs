//! Repeating auto-focus cycle.
//!
//! While a session is previewing with a focus mode that needs explicit
//! focus calls, this controller issues one hardware focus cycle, waits for
//! completion, sleeps, and repeats. At most one cycle is ever outstanding.

use crate::error::CameraError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Seam through which focus cycles reach the hardware; implemented by the
/// session so the camera handle never escapes it.
pub trait FocusDriver: Send + Sync {
    /// Begin one focus cycle. `done` receives the hardware's completion
    /// signal.
    fn begin_focus(&self, done: oneshot::Sender<bool>) -> Result<(), CameraError>;

    /// Best-effort cancel of an in-flight cycle; must tolerate hardware
    /// errors internally.
    fn cancel_focus(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    Focusing,
    Stopped,
}

/// Drives the repeating focus cycle for one preview session.
pub struct AutoFocusController {
    driver: Arc<dyn FocusDriver>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    state: Arc<Mutex<FocusState>>,
}

impl AutoFocusController {
    /// Start cycling immediately. One background task per controller;
    /// the cycle schedule lives entirely inside it.
    pub fn start(driver: Arc<dyn FocusDriver>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(FocusState::Idle));
        let task = tokio::spawn(run_focus_loop(
            Arc::clone(&driver),
            interval,
            cancel.clone(),
            Arc::clone(&state),
        ));
        Self {
            driver,
            cancel,
            task: Some(task),
            state,
        }
    }

    pub fn state(&self) -> FocusState {
        *self.state.lock()
    }

    /// Cancel the pending cycle and any in-flight hardware focus, then wait
    /// for the loop to wind down.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.driver.cancel_focus();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        *self.state.lock() = FocusState::Stopped;
    }
}

async fn run_focus_loop(
    driver: Arc<dyn FocusDriver>,
    interval: Duration,
    cancel: CancellationToken,
    state: Arc<Mutex<FocusState>>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let (done_tx, done_rx) = oneshot::channel();
        *state.lock() = FocusState::Focusing;
        match driver.begin_focus(done_tx) {
            Ok(()) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = done_rx => match result {
                        Ok(focused) => debug!("focus cycle completed (focused: {})", focused),
                        Err(_) => debug!("focus completion dropped by hardware"),
                    },
                }
            }
            Err(e) => {
                // Seen in the wild on flaky drivers; keep the cycle alive.
                warn!("unexpected exception while focusing: {}", e);
            }
        }
        *state.lock() = FocusState::Idle;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    *state.lock() = FocusState::Stopped;
    debug!("auto-focus loop ended");
}
