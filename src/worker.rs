//! Decode worker thread.
//!
//! One long-lived OS thread does all the heavy lifting of decoding frames.
//! It blocks on a message channel, handles exactly one frame per message,
//! reports exactly one outcome per frame, and exits only on a quit message.

use crate::decode::{DecodeOutcome, DecodeSuccess, Decoder};
use crate::error::{Result, ScancamError};
use crate::frame::{build_luminance_source, PreviewFrame};
use crate::hardware::FrameSink;
use crate::session::FramingGeometry;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Outcomes flow back to the controller queue through this sender. The
/// unbounded flavor is deliberate: the worker thread must never block on
/// reporting.
pub type OutcomeSender = mpsc::UnboundedSender<DecodeOutcome>;

enum WorkerMessage {
    Frame(PreviewFrame),
    Quit,
}

/// Handle to the decode worker thread.
pub struct DecodeWorker {
    frame_tx: Sender<WorkerMessage>,
    in_flight: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl DecodeWorker {
    /// Spawn the worker thread and wait (bounded) for it to signal
    /// readiness.
    pub async fn spawn(
        decoder: Box<dyn Decoder + Send>,
        geometry: Arc<FramingGeometry>,
        outcome_tx: OutcomeSender,
        ready_timeout: Duration,
    ) -> Result<Self> {
        let (frame_tx, frame_rx) = unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let in_flight_worker = Arc::clone(&in_flight);

        let join = std::thread::Builder::new()
            .name("scancam-decode".to_string())
            .spawn(move || {
                run_decode_loop(
                    decoder,
                    geometry,
                    frame_rx,
                    outcome_tx,
                    ready_tx,
                    done_tx,
                    in_flight_worker,
                )
            })
            .map_err(|e| ScancamError::worker(format!("failed to spawn decode thread: {e}")))?;

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(Self {
                frame_tx,
                in_flight,
                join: Some(join),
                done_rx: Some(done_rx),
            }),
            Ok(Err(_)) => Err(ScancamError::worker("decode thread died before readiness")),
            Err(_) => Err(ScancamError::worker(
                "decode thread did not become ready in time",
            )),
        }
    }

    /// Submit one frame for decoding. A submission racing an unconsumed
    /// frame is dropped; the controller never legitimately double-arms.
    pub fn submit_frame(&self, frame: PreviewFrame) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("frame submitted while another is pending; dropping");
            return;
        }
        if self.frame_tx.send(WorkerMessage::Frame(frame)).is_err() {
            debug!("decode worker gone; frame dropped");
        }
    }

    /// One-shot delivery sink for a camera frame request, with the same
    /// single-slot semantics as [`Self::submit_frame`].
    pub fn frame_sink(&self) -> FrameSink {
        let frame_tx = self.frame_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        Box::new(move |frame| {
            if in_flight.swap(true, Ordering::SeqCst) {
                warn!("frame delivered while another is pending; dropping");
                return;
            }
            if frame_tx.send(WorkerMessage::Frame(frame)).is_err() {
                debug!("decode worker gone; frame dropped");
            }
        })
    }

    /// Post the quit message and wait up to `timeout` for the thread to
    /// exit. Elapsing the bound is not an error: the thread is detached
    /// and the caller proceeds.
    pub async fn quit(mut self, timeout: Duration) {
        let _ = self.frame_tx.send(WorkerMessage::Quit);

        let done_rx = match self.done_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        match tokio::time::timeout(timeout, done_rx).await {
            Ok(_) => {
                if let Some(join) = self.join.take() {
                    let _ = join.join();
                }
                debug!("decode worker exited cleanly");
            }
            Err(_) => {
                warn!(
                    "decode worker did not exit within {:?}; detaching",
                    timeout
                );
                self.join.take();
            }
        }
    }
}

fn run_decode_loop(
    mut decoder: Box<dyn Decoder + Send>,
    geometry: Arc<FramingGeometry>,
    frame_rx: Receiver<WorkerMessage>,
    outcome_tx: OutcomeSender,
    ready_tx: oneshot::Sender<()>,
    done_tx: oneshot::Sender<()>,
    in_flight: Arc<AtomicBool>,
) {
    debug!("decode worker started");
    let _ = ready_tx.send(());

    while let Ok(message) = frame_rx.recv() {
        match message {
            WorkerMessage::Frame(frame) => {
                in_flight.store(false, Ordering::SeqCst);
                let outcome = decode_frame(decoder.as_mut(), &geometry, frame);
                if outcome_tx.send(outcome).is_err() {
                    debug!("controller gone; outcome dropped");
                }
            }
            WorkerMessage::Quit => break,
        }
    }

    debug!("decode worker exiting");
    let _ = done_tx.send(());
}

/// One decode attempt: crop, decode, reset, report.
fn decode_frame(
    decoder: &mut dyn Decoder,
    geometry: &FramingGeometry,
    frame: PreviewFrame,
) -> DecodeOutcome {
    let start = Instant::now();

    let source = build_luminance_source(&frame, geometry.framing_rect_in_preview());
    let source = match source {
        Some(source) => source,
        // Malformed frame or missing geometry: fail without touching the
        // decoder.
        None => {
            return DecodeOutcome::Failure {
                elapsed: start.elapsed(),
            }
        }
    };

    let symbol = decoder.decode(&source);
    // Scratch state never leaks into the next attempt.
    decoder.reset();

    match symbol {
        Some(symbol) => {
            let elapsed = start.elapsed();
            // Deliberately not logging the payload itself.
            debug!("found barcode in {} ms", elapsed.as_millis());
            let thumbnail = source.render_thumbnail();
            let scale_factor = source.thumbnail_scale_factor();
            DecodeOutcome::Success(Box::new(DecodeSuccess {
                symbol,
                thumbnail,
                scale_factor,
                elapsed,
            }))
        }
        None => DecodeOutcome::Failure {
            elapsed: start.elapsed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodedSymbol, SymbolFormat};
    use crate::frame::LuminanceSource;
    use crate::geometry::Size;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ScriptState {
        results: Vec<Option<DecodedSymbol>>,
        decode_calls: u32,
        resets: u32,
    }

    /// Decoder returning scripted results, recording calls and resets.
    struct ScriptedDecoder {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedDecoder {
        fn new(results: Vec<Option<DecodedSymbol>>) -> (Self, Arc<Mutex<ScriptState>>) {
            let state = Arc::new(Mutex::new(ScriptState {
                results,
                ..ScriptState::default()
            }));
            (
                Self {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    impl Decoder for ScriptedDecoder {
        fn decode(&mut self, _source: &LuminanceSource) -> Option<DecodedSymbol> {
            let mut state = self.state.lock();
            state.decode_calls += 1;
            if state.results.is_empty() {
                None
            } else {
                state.results.remove(0)
            }
        }

        fn reset(&mut self) {
            self.state.lock().resets += 1;
        }
    }

    fn geometry_with_rect() -> Arc<FramingGeometry> {
        let geometry = FramingGeometry::new();
        geometry.set_negotiated(Size::new(640, 480), Size::new(640, 480), Size::new(640, 480));
        geometry
    }

    fn test_frame() -> PreviewFrame {
        PreviewFrame::new(vec![100u8; 640 * 480], 640, 480)
    }

    #[tokio::test]
    async fn test_failure_outcome_and_reset() {
        let (decoder, state) = ScriptedDecoder::new(vec![None]);
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            Box::new(decoder),
            geometry_with_rect(),
            outcome_tx,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        worker.submit_frame(test_frame());
        let outcome = outcome_rx.recv().await.unwrap();
        assert!(matches!(outcome, DecodeOutcome::Failure { .. }));
        {
            let state = state.lock();
            assert_eq!(state.decode_calls, 1);
            assert_eq!(state.resets, 1);
        }

        worker.quit(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_success_outcome_carries_thumbnail() {
        let symbol = DecodedSymbol::new("hello", SymbolFormat::QrCode);
        let (decoder, state) = ScriptedDecoder::new(vec![Some(symbol)]);
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            Box::new(decoder),
            geometry_with_rect(),
            outcome_tx,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        worker.submit_frame(test_frame());
        let outcome = outcome_rx.recv().await.unwrap();
        match outcome {
            DecodeOutcome::Success(success) => {
                assert_eq!(success.symbol.text, "hello");
                // Framing rect of a 640x480 screen is 400x300; thumbnail
                // halves it.
                assert_eq!(success.thumbnail.width, 200);
                assert_eq!(success.thumbnail.height, 150);
                assert!((success.scale_factor - 0.5).abs() < f32::EPSILON);
            }
            other => panic!("expected success, got {:?}", other),
        }
        // Reset fires after successes too.
        assert_eq!(state.lock().resets, 1);

        worker.quit(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_missing_geometry_short_circuits() {
        let (decoder, state) = ScriptedDecoder::new(vec![]);
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            Box::new(decoder),
            FramingGeometry::new(),
            outcome_tx,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        worker.submit_frame(test_frame());
        let outcome = outcome_rx.recv().await.unwrap();
        assert!(matches!(outcome, DecodeOutcome::Failure { .. }));
        // The decoder is never invoked on a malformed attempt.
        assert_eq!(state.lock().decode_calls, 0);

        worker.quit(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_sequential_frames_produce_sequential_outcomes() {
        let (decoder, state) = ScriptedDecoder::new(vec![None, None]);
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            Box::new(decoder),
            geometry_with_rect(),
            outcome_tx,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        worker.submit_frame(test_frame());
        assert!(matches!(
            outcome_rx.recv().await.unwrap(),
            DecodeOutcome::Failure { .. }
        ));
        worker.submit_frame(test_frame());
        assert!(matches!(
            outcome_rx.recv().await.unwrap(),
            DecodeOutcome::Failure { .. }
        ));
        assert_eq!(state.lock().decode_calls, 2);

        worker.quit(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_quit_within_bound() {
        let (decoder, _state) = ScriptedDecoder::new(vec![]);
        let (outcome_tx, _outcome_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(
            Box::new(decoder),
            geometry_with_rect(),
            outcome_tx,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let start = Instant::now();
        worker.quit(Duration::from_millis(500)).await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
