//! Exclusive camera session lifecycle.
//!
//! One `CameraDeviceSession` wraps one open hardware handle and is the only
//! thing allowed to touch it: preview start/stop, parameter changes, frame
//! requests and focus calls are all serialized here. At most one session is
//! open per process.

use crate::config::ScancamConfig;
use crate::error::CameraError;
use crate::focus::{AutoFocusController, FocusDriver};
use crate::geometry::{CameraFacing, DisplayRotation, Rect, Size};
use crate::hardware::params::{DeviceCapabilities, DeviceParameters, FocusMode};
use crate::hardware::{CameraBackend, CameraHandle, DeviceInfo, FrameSink};
use crate::negotiate;
use crate::tuning;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// One camera session open per process, enforced here.
static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

/// Releases the process-wide open flag when the session goes away, even on
/// early error returns.
struct OpenGuard;

impl Drop for OpenGuard {
    fn drop(&mut self) {
        SESSION_OPEN.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct GeometryState {
    screen_resolution: Option<Size>,
    /// Preview size in the driver's native orientation.
    preview_size: Option<Size>,
    /// Preview size transposed to match the screen's orientation.
    preview_size_on_screen: Option<Size>,
    manual_size: Option<(u32, u32)>,
    framing_rect: Option<Rect>,
    rect_in_preview: Option<Rect>,
}

/// Cached framing geometry, shared read-only with the decode worker.
///
/// Rects are computed lazily on first request and cleared when the session
/// closes, so a later session never inherits stale geometry.
pub struct FramingGeometry {
    state: RwLock<GeometryState>,
}

impl FramingGeometry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(GeometryState::default()),
        })
    }

    /// Record the negotiated resolutions. Invalidates derived rects.
    pub fn set_negotiated(&self, screen: Size, preview: Size, preview_on_screen: Size) {
        let mut state = self.state.write();
        state.screen_resolution = Some(screen);
        state.preview_size = Some(preview);
        state.preview_size_on_screen = Some(preview_on_screen);
        state.framing_rect = None;
        state.rect_in_preview = None;
    }

    /// Request a caller-specified framing rect instead of the derived one.
    pub fn set_manual_size(&self, width: u32, height: u32) {
        let mut state = self.state.write();
        state.manual_size = Some((width, height));
        state.framing_rect = None;
        state.rect_in_preview = None;
    }

    pub fn screen_resolution(&self) -> Option<Size> {
        self.state.read().screen_resolution
    }

    pub fn preview_size(&self) -> Option<Size> {
        self.state.read().preview_size
    }

    /// Screen-space framing rect; `None` before configuration.
    pub fn framing_rect(&self) -> Option<Rect> {
        if let Some(rect) = self.state.read().framing_rect {
            return Some(rect);
        }
        let mut state = self.state.write();
        if state.framing_rect.is_none() {
            let screen = state.screen_resolution?;
            let rect = match state.manual_size {
                Some((width, height)) => negotiate::manual_framing_rect(screen, width, height),
                None => negotiate::framing_rect(screen),
            };
            state.framing_rect = Some(rect);
        }
        state.framing_rect
    }

    /// Framing rect remapped into preview-buffer coordinates.
    ///
    /// The remap targets the preview size in the driver's native
    /// orientation, because that is the coordinate space captured frames
    /// arrive in.
    pub fn framing_rect_in_preview(&self) -> Option<Rect> {
        if let Some(rect) = self.state.read().rect_in_preview {
            return Some(rect);
        }
        let rect = self.framing_rect()?;
        let mut state = self.state.write();
        if state.rect_in_preview.is_none() {
            let screen = state.screen_resolution?;
            let preview = state.preview_size?;
            state.rect_in_preview = Some(negotiate::framing_rect_in_preview(rect, screen, preview));
        }
        state.rect_in_preview
    }

    /// Preview size transposed to the screen's orientation, for viewfinder
    /// scaling.
    pub fn preview_size_on_screen(&self) -> Option<Size> {
        self.state.read().preview_size_on_screen
    }

    /// Forget everything; a fresh session starts from nothing.
    pub fn clear(&self) {
        *self.state.write() = GeometryState::default();
    }
}

struct SessionInner {
    handle: Box<dyn CameraHandle>,
    previewing: bool,
}

/// Focus seam handed to the [`AutoFocusController`]; keeps all hardware
/// access behind the session lock.
struct SessionFocusDriver {
    inner: Arc<Mutex<SessionInner>>,
}

impl FocusDriver for SessionFocusDriver {
    fn begin_focus(&self, done: oneshot::Sender<bool>) -> Result<(), CameraError> {
        self.inner.lock().handle.auto_focus(done)
    }

    fn cancel_focus(&self) {
        self.inner.lock().handle.cancel_auto_focus();
    }
}

/// One open camera, from `open` to `close`.
pub struct CameraDeviceSession {
    inner: Arc<Mutex<SessionInner>>,
    geometry: Arc<FramingGeometry>,
    config: ScancamConfig,
    info: DeviceInfo,
    focus: Option<AutoFocusController>,
    active_focus_mode: Option<FocusMode>,
    display_to_camera_rotation: u32,
    needed_rotation: u32,
    configured: bool,
    _open_guard: OpenGuard,
}

impl CameraDeviceSession {
    /// Open a camera device.
    ///
    /// Without an explicit index the first back-facing device is chosen,
    /// falling back to device 0. An explicit index must exist. Only one
    /// session may be open in the process at a time.
    pub fn open(
        backend: &dyn CameraBackend,
        config: &ScancamConfig,
    ) -> Result<Self, CameraError> {
        if SESSION_OPEN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CameraError::busy("another camera session is already open"));
        }
        let open_guard = OpenGuard;

        let device_count = backend.device_count();
        if device_count == 0 {
            warn!("no cameras!");
            return Err(CameraError::NoCameraAvailable);
        }

        let index = match config.camera.requested_index {
            Some(index) => {
                if index >= device_count {
                    warn!("requested camera does not exist: {}", index);
                    return Err(CameraError::NoSuchDevice { index });
                }
                index
            }
            None => {
                let back_facing = (0..device_count).find(|&i| {
                    matches!(
                        backend.device_info(i),
                        Ok(DeviceInfo {
                            facing: CameraFacing::Back,
                            ..
                        })
                    )
                });
                back_facing.unwrap_or_else(|| {
                    info!("no camera facing back; returning camera #0");
                    0
                })
            }
        };

        info!("opening camera #{}", index);
        let handle = backend.open(index)?;
        let info = handle.info();

        let geometry = FramingGeometry::new();
        if let Some((width, height)) = config.manual_framing() {
            geometry.set_manual_size(width, height);
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(SessionInner {
                handle,
                previewing: false,
            })),
            geometry,
            config: config.clone(),
            info,
            focus: None,
            active_focus_mode: None,
            display_to_camera_rotation: 0,
            needed_rotation: 0,
            configured: false,
            _open_guard: open_guard,
        })
    }

    /// Negotiate geometry and apply the desired parameter set.
    ///
    /// A rejected configuration is retried once in safe mode from the saved
    /// flattened parameters; a second rejection degrades silently.
    pub fn configure(
        &mut self,
        screen: Size,
        display_rotation: DisplayRotation,
    ) -> Result<(), CameraError> {
        let mut inner = self.inner.lock();

        self.display_to_camera_rotation = negotiate::rotation_from_display_to_camera(
            display_rotation,
            self.info.orientation,
            self.info.facing,
        );
        self.needed_rotation =
            negotiate::needed_rotation(display_rotation, self.info.orientation, self.info.facing);
        info!(
            "clockwise rotation from display to camera: {} (needed: {})",
            self.display_to_camera_rotation, self.needed_rotation
        );

        let capabilities = inner.handle.capabilities();
        let current = inner.handle.parameters();
        let best_preview_size = negotiate::find_best_preview_size(
            &capabilities.supported_preview_sizes,
            current.preview_size,
            screen,
        )?;
        info!("camera resolution: {}", best_preview_size);
        self.geometry.set_negotiated(
            screen,
            best_preview_size,
            orient_like(best_preview_size, screen),
        );

        let saved_parameters = current.flatten();
        if let Err(e) = apply_desired_parameters(
            inner.handle.as_mut(),
            &self.config,
            &capabilities,
            best_preview_size,
            false,
        ) {
            // Driver failed; fall back to the saved baseline and minimal
            // safe-mode parameters.
            warn!(
                "camera rejected parameters, only setting minimal safe-mode values: {}",
                e
            );
            info!("resetting to saved camera parameters: {}", saved_parameters);
            match DeviceParameters::unflatten(&saved_parameters) {
                Ok(restored) => {
                    if let Err(e) = inner.handle.set_parameters(&restored) {
                        warn!("could not restore saved parameters: {}", e);
                    }
                    if let Err(e) = apply_desired_parameters(
                        inner.handle.as_mut(),
                        &self.config,
                        &capabilities,
                        best_preview_size,
                        true,
                    ) {
                        // Well, darn. No configuration.
                        warn!("camera rejected even safe-mode parameters: {}", e);
                    }
                }
                Err(e) => warn!("saved parameters unusable: {}", e),
            }
        }

        inner
            .handle
            .set_display_orientation(self.display_to_camera_rotation);

        // The driver has the last word on the preview size; adopt whatever
        // it actually kept.
        let after = inner.handle.parameters();
        if let Some(actual) = after.preview_size {
            if actual != best_preview_size {
                warn!(
                    "camera said it supported preview size {}, but after setting it, preview size is {}",
                    best_preview_size, actual
                );
                self.geometry
                    .set_negotiated(screen, actual, orient_like(actual, screen));
            }
        }
        self.active_focus_mode = after.focus_mode;
        self.configured = true;
        Ok(())
    }

    /// Ask the hardware to start drawing preview frames. Idempotent.
    pub fn start_preview(&mut self) {
        {
            let mut inner = self.inner.lock();
            if inner.previewing {
                return;
            }
            inner.handle.start_preview();
            inner.previewing = true;
        }
        self.start_focus_controller();
    }

    /// Tell the hardware to stop drawing preview frames. Idempotent.
    pub async fn stop_preview(&mut self) {
        if let Some(mut focus) = self.focus.take() {
            focus.stop().await;
        }
        let mut inner = self.inner.lock();
        if inner.previewing {
            inner.handle.stop_preview();
            inner.previewing = false;
        }
    }

    /// Toggle the torch, bouncing the focus controller around the hardware
    /// parameter change so a focus cycle never races the reconfiguration.
    pub async fn set_torch(&mut self, on: bool) -> Result<(), CameraError> {
        let currently_on = self.inner.lock().handle.parameters().torch_enabled();
        if currently_on == on {
            return Ok(());
        }

        let had_focus_controller = self.focus.is_some();
        if let Some(mut focus) = self.focus.take() {
            focus.stop().await;
        }

        let result = {
            let mut inner = self.inner.lock();
            let capabilities = inner.handle.capabilities();
            let mut params = inner.handle.parameters();
            tuning::apply_torch(&mut params, &capabilities, on);
            if self.config.camera.exposure {
                tuning::apply_best_exposure(&mut params, &capabilities, on);
            }
            inner.handle.set_parameters(&params)
        };

        if had_focus_controller {
            self.start_focus_controller();
        }
        result
    }

    /// Forward a single-shot frame request while previewing; silently
    /// dropped otherwise.
    pub fn request_preview_frame(&self, sink: FrameSink) {
        let mut inner = self.inner.lock();
        if inner.previewing {
            inner.handle.request_one_shot_frame(sink);
        } else {
            debug!("preview frame requested, but preview is not running");
        }
    }

    pub fn torch_enabled(&self) -> bool {
        self.inner.lock().handle.parameters().torch_enabled()
    }

    pub fn is_previewing(&self) -> bool {
        self.inner.lock().previewing
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.info
    }

    /// Clockwise rotation to apply to frames to present them upright.
    pub fn needed_rotation(&self) -> u32 {
        self.needed_rotation
    }

    /// Shared framing geometry, consumed by the decode worker.
    pub fn geometry(&self) -> Arc<FramingGeometry> {
        Arc::clone(&self.geometry)
    }

    pub fn framing_rect(&self) -> Option<Rect> {
        if !self.configured {
            return None;
        }
        self.geometry.framing_rect()
    }

    pub fn framing_rect_in_preview(&self) -> Option<Rect> {
        if !self.configured {
            return None;
        }
        self.geometry.framing_rect_in_preview()
    }

    /// Release the hardware and clear cached geometry.
    pub async fn close(mut self) {
        self.stop_preview().await;
        self.inner.lock().handle.release();
        self.geometry.clear();
        info!("camera session closed");
        // _open_guard drops here, releasing the process-wide flag.
    }

    fn start_focus_controller(&mut self) {
        if self.focus.is_some() {
            return;
        }
        let use_auto_focus = self.config.focus.auto_focus
            && self
                .active_focus_mode
                .map(|mode| mode.requires_focus_calls())
                .unwrap_or(false);
        info!(
            "current focus mode {:?}; using auto focus? {}",
            self.active_focus_mode, use_auto_focus
        );
        if use_auto_focus {
            let driver = Arc::new(SessionFocusDriver {
                inner: Arc::clone(&self.inner),
            });
            self.focus = Some(AutoFocusController::start(
                driver,
                self.config.focus_interval(),
            ));
        }
    }
}

/// Preview size transposed to match the screen's orientation.
fn orient_like(preview: Size, screen: Size) -> Size {
    if preview.is_portrait() == screen.is_portrait() {
        preview
    } else {
        preview.transposed()
    }
}

/// Build and apply the full desired parameter set.
fn apply_desired_parameters(
    handle: &mut dyn CameraHandle,
    config: &ScancamConfig,
    capabilities: &DeviceCapabilities,
    preview_size: Size,
    safe_mode: bool,
) -> Result<(), CameraError> {
    let mut params = handle.parameters();
    info!("initial camera parameters: {}", params.flatten());

    if safe_mode {
        warn!("in camera config safe-mode -- most settings will not be honored");
    }

    tuning::apply_torch(&mut params, capabilities, config.camera.torch_on_start);
    if !safe_mode && config.camera.exposure {
        tuning::apply_best_exposure(&mut params, capabilities, config.camera.torch_on_start);
    }

    tuning::apply_focus(
        &mut params,
        capabilities,
        config.focus.auto_focus,
        config.focus.disable_continuous,
        safe_mode,
    );

    if !safe_mode {
        if config.camera.invert_scan {
            tuning::apply_invert_color(&mut params, capabilities);
        }
        if config.camera.barcode_scene_mode {
            tuning::apply_barcode_scene_mode(&mut params, capabilities);
        }
        if config.camera.metering {
            tuning::apply_video_stabilization(&mut params, capabilities);
            tuning::apply_focus_area(&mut params, capabilities);
            tuning::apply_metering_area(&mut params, capabilities);
        }
        if let Some(ratio) = config.camera.target_zoom_ratio {
            tuning::apply_zoom(&mut params, capabilities, ratio);
        }
        tuning::apply_best_preview_fps(&mut params, capabilities);
    }

    params.preview_size = Some(preview_size);
    handle.set_parameters(&params)
}
