//! Preview controller: the PREVIEW / SUCCESS / DONE state machine.
//!
//! One event-loop task owns the session state and is its only writer.
//! Frame outcomes from the decode worker and commands from the embedding
//! application are both marshaled onto this task's queues; nothing mutates
//! state from another thread.

use crate::config::ScancamConfig;
use crate::decode::{DecodeOutcome, DecodeSuccess, Decoder};
use crate::error::Result;
use crate::session::CameraDeviceSession;
use crate::worker::DecodeWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capture flow state. PREVIEW is the busy scanning loop; SUCCESS gates
/// frame requests until an explicit restart; DONE is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Preview,
    Success,
    Done,
}

/// Where decoded results go. Implemented by the embedding application
/// (result display, routing, beeps); called only from the controller task
/// and never after shutdown.
pub trait ResultSink: Send + Sync {
    /// A symbol was decoded. The pipeline is now gated in SUCCESS until
    /// [`PreviewController::restart_preview_and_decode`] is called.
    fn decode_succeeded(&self, success: DecodeSuccess);

    /// The live viewfinder should redraw (preview restarted).
    fn viewfinder_refresh(&self) {}
}

enum Command {
    RestartPreviewAndDecode,
    SetTorch(bool),
    Quit(oneshot::Sender<()>),
}

/// Handle to a running capture flow.
pub struct PreviewController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl PreviewController {
    /// Spawn the decode worker, start the camera preview and begin the
    /// first decode cycle.
    ///
    /// The session must already be configured. Errors here are fatal to the
    /// capture flow; the caller reports them and tears down.
    pub async fn start(
        mut session: CameraDeviceSession,
        decoder: Box<dyn Decoder + Send>,
        sink: Arc<dyn ResultSink>,
        config: &ScancamConfig,
    ) -> Result<Self> {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            decoder,
            session.geometry(),
            outcome_tx,
            config.ready_timeout(),
        )
        .await?;

        session.start_preview();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_event_loop(
            session,
            worker,
            sink,
            cmd_rx,
            outcome_rx,
            config.quit_timeout(),
        ));

        let controller = Self {
            cmd_tx,
            task: Some(task),
        };
        // The loop starts gated in SUCCESS; kick off the first cycle.
        controller.restart_preview_and_decode();
        Ok(controller)
    }

    /// Leave SUCCESS and request the next frame. No-op in any other state.
    pub fn restart_preview_and_decode(&self) {
        let _ = self.cmd_tx.send(Command::RestartPreviewAndDecode);
    }

    /// Toggle the torch on the underlying session.
    pub fn set_torch(&self, on: bool) {
        let _ = self.cmd_tx.send(Command::SetTorch(on));
    }

    /// Shut the capture flow down: stop the preview, quit the worker
    /// (bounded wait), purge undelivered outcomes and close the session.
    /// No sink callback fires after this returns.
    pub async fn quit(mut self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Quit(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn run_event_loop(
    mut session: CameraDeviceSession,
    worker: DecodeWorker,
    sink: Arc<dyn ResultSink>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut outcome_rx: mpsc::UnboundedReceiver<DecodeOutcome>,
    quit_timeout: Duration,
) {
    // Parity with the capture flow contract: the loop is born gated and the
    // caller's initial restart command opens it.
    let mut state = SessionState::Success;
    let mut worker = Some(worker);
    info!("preview controller started");

    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                Some(Command::RestartPreviewAndDecode) => {
                    if state == SessionState::Success {
                        state = SessionState::Preview;
                        request_next_frame(&session, worker.as_ref());
                        sink.viewfinder_refresh();
                    } else {
                        debug!("restart requested in {:?}; ignoring", state);
                    }
                }
                Some(Command::SetTorch(on)) => {
                    if let Err(e) = session.set_torch(on).await {
                        warn!("torch toggle failed: {}", e);
                    }
                }
                Some(Command::Quit(ack)) => {
                    state = SessionState::Done;
                    debug!("capture flow entering {:?}", state);
                    session.stop_preview().await;
                    if let Some(worker) = worker.take() {
                        worker.quit(quit_timeout).await;
                    }
                    // Make absolutely sure any queued outcome is dropped
                    // before acknowledging: no callback fires after DONE.
                    while outcome_rx.try_recv().is_ok() {}
                    let _ = ack.send(());
                    break;
                }
                None => {
                    // Controller handle dropped without quit; wind down the
                    // same way, minus the acknowledgment.
                    state = SessionState::Done;
                    debug!("capture flow entering {:?}", state);
                    session.stop_preview().await;
                    if let Some(worker) = worker.take() {
                        worker.quit(quit_timeout).await;
                    }
                    break;
                }
            },
            Some(outcome) = outcome_rx.recv() => {
                if state == SessionState::Done {
                    continue;
                }
                match outcome {
                    DecodeOutcome::Success(success) => {
                        state = SessionState::Success;
                        sink.decode_succeeded(*success);
                    }
                    DecodeOutcome::Failure { .. } => {
                        // Decode as fast as possible: when one attempt
                        // fails, immediately start another.
                        state = SessionState::Preview;
                        request_next_frame(&session, worker.as_ref());
                    }
                }
            }
        }
    }

    session.close().await;
    info!("preview controller stopped");
}

/// Issue one single-shot frame request toward the decode worker. The
/// controller only calls this when no request is outstanding, so frames
/// are strictly one-at-a-time.
fn request_next_frame(session: &CameraDeviceSession, worker: Option<&DecodeWorker>) {
    if let Some(worker) = worker {
        session.request_preview_frame(worker.frame_sink());
    }
}
