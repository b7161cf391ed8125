//! Deterministic in-process camera backend.
//!
//! Drives the pipeline without hardware: synthetic luminance frames,
//! scripted parameter rejection for exercising the safe-mode path, and a
//! shared call log tests inspect after the handle moves into a session.

use super::{CameraBackend, CameraHandle, DeviceInfo, FrameSink};
use crate::error::CameraError;
use crate::frame::PreviewFrame;
use crate::geometry::{CameraFacing, Size};
use crate::hardware::params::{
    ColorEffect, DeviceCapabilities, DeviceParameters, FlashMode, FocusMode, FpsRange, SceneMode,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

type FrameFn = Box<dyn FnMut(u64, Size) -> Vec<u8> + Send>;

/// Observable record of everything a mock device was asked to do.
#[derive(Debug, Default)]
pub struct MockCameraLog {
    pub start_preview_count: AtomicU32,
    pub stop_preview_count: AtomicU32,
    pub frame_requests: AtomicU32,
    pub auto_focus_calls: AtomicU32,
    pub cancel_focus_calls: AtomicU32,
    pub set_parameter_attempts: AtomicU32,
    pub released: AtomicBool,
    pub display_orientation: AtomicU32,
    pub applied_parameters: Mutex<Vec<DeviceParameters>>,
}

impl MockCameraLog {
    pub fn last_applied(&self) -> Option<DeviceParameters> {
        self.applied_parameters.lock().last().cloned()
    }
}

/// Blueprint for one mock device; shared with every handle opened from it.
pub struct MockDeviceSpec {
    pub info: DeviceInfo,
    pub capabilities: DeviceCapabilities,
    pub initial_parameters: DeviceParameters,
    /// How many upcoming `set_parameters` calls to reject.
    pub reject_parameter_sets: AtomicU32,
    pub fail_open: AtomicBool,
    pub log: Arc<MockCameraLog>,
    frame_fn: Arc<Mutex<FrameFn>>,
}

impl MockDeviceSpec {
    pub fn back_camera() -> Self {
        Self::with_facing(CameraFacing::Back, 90)
    }

    pub fn front_camera() -> Self {
        Self::with_facing(CameraFacing::Front, 270)
    }

    pub fn with_facing(facing: CameraFacing, orientation: u32) -> Self {
        Self {
            info: DeviceInfo {
                facing,
                orientation,
            },
            capabilities: default_capabilities(),
            initial_parameters: default_parameters(),
            reject_parameter_sets: AtomicU32::new(0),
            fail_open: AtomicBool::new(false),
            log: Arc::new(MockCameraLog::default()),
            frame_fn: Arc::new(Mutex::new(Box::new(gradient_frame))),
        }
    }

    /// Replace the synthetic frame generator.
    pub fn with_frame_fn(self, frame_fn: impl FnMut(u64, Size) -> Vec<u8> + Send + 'static) -> Self {
        *self.frame_fn.lock() = Box::new(frame_fn);
        self
    }

    /// Script the next `count` parameter applications to be rejected.
    pub fn reject_next_parameter_sets(&self, count: u32) {
        self.reject_parameter_sets.store(count, Ordering::SeqCst);
    }
}

fn default_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        supported_preview_sizes: vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(640, 480),
            Size::new(352, 288),
        ],
        supported_focus_modes: vec![
            FocusMode::Auto,
            FocusMode::ContinuousPicture,
            FocusMode::Macro,
            FocusMode::Fixed,
        ],
        supported_flash_modes: vec![
            FlashMode::Off,
            FlashMode::On,
            FlashMode::Torch,
            FlashMode::Auto,
        ],
        supported_scene_modes: vec![SceneMode::Auto, SceneMode::Barcode],
        supported_color_effects: vec![ColorEffect::None, ColorEffect::Negative, ColorEffect::Mono],
        supported_fps_ranges: vec![
            FpsRange::new(15, 15),
            FpsRange::new(10, 20),
            FpsRange::new(30, 30),
        ],
        exposure_compensation_range: (-3, 3),
        exposure_compensation_step: 0.5,
        max_focus_areas: 1,
        max_metering_areas: 1,
        video_stabilization_supported: true,
        zoom_ratios: vec![100, 150, 200, 250, 300, 400],
    }
}

fn default_parameters() -> DeviceParameters {
    DeviceParameters {
        focus_mode: Some(FocusMode::ContinuousPicture),
        flash_mode: Some(FlashMode::Off),
        preview_size: Some(Size::new(640, 480)),
        preview_fps_range: Some(FpsRange::new(30, 30)),
        ..DeviceParameters::default()
    }
}

/// Plain luminance gradient shifted by the frame sequence number.
fn gradient_frame(sequence: u64, size: Size) -> Vec<u8> {
    let mut data = Vec::with_capacity((size.width * size.height) as usize);
    for y in 0..size.height {
        for x in 0..size.width {
            data.push(((x + y + sequence as u32) % 256) as u8);
        }
    }
    data
}

/// Backend over a fixed list of mock devices.
pub struct MockBackend {
    devices: Vec<Arc<MockDeviceSpec>>,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDeviceSpec>) -> Self {
        Self {
            devices: devices.into_iter().map(Arc::new).collect(),
        }
    }

    /// The common case: one back-facing device.
    pub fn single_back_camera() -> Self {
        Self::new(vec![MockDeviceSpec::back_camera()])
    }

    pub fn device(&self, index: u32) -> Option<&Arc<MockDeviceSpec>> {
        self.devices.get(index as usize)
    }
}

impl CameraBackend for MockBackend {
    fn device_count(&self) -> u32 {
        self.devices.len() as u32
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, CameraError> {
        self.devices
            .get(index as usize)
            .map(|spec| spec.info)
            .ok_or(CameraError::NoSuchDevice { index })
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraHandle>, CameraError> {
        let spec = self
            .devices
            .get(index as usize)
            .ok_or(CameraError::NoSuchDevice { index })?;
        if spec.fail_open.load(Ordering::SeqCst) {
            return Err(CameraError::fatal(format!(
                "scripted open failure for device {index}"
            )));
        }
        debug!("opening mock camera #{}", index);
        Ok(Box::new(MockCamera {
            spec: Arc::clone(spec),
            parameters: spec.initial_parameters.clone(),
            previewing: false,
            sequence: AtomicU64::new(0),
        }))
    }
}

/// One opened mock device.
pub struct MockCamera {
    spec: Arc<MockDeviceSpec>,
    parameters: DeviceParameters,
    previewing: bool,
    sequence: AtomicU64,
}

impl CameraHandle for MockCamera {
    fn info(&self) -> DeviceInfo {
        self.spec.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.spec.capabilities.clone()
    }

    fn parameters(&self) -> DeviceParameters {
        self.parameters.clone()
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), CameraError> {
        self.spec
            .log
            .set_parameter_attempts
            .fetch_add(1, Ordering::SeqCst);

        let pending_rejections = self.spec.reject_parameter_sets.load(Ordering::SeqCst);
        if pending_rejections > 0 {
            self.spec
                .reject_parameter_sets
                .store(pending_rejections - 1, Ordering::SeqCst);
            return Err(CameraError::rejected("scripted parameter rejection"));
        }

        self.parameters = params.clone();
        self.spec.log.applied_parameters.lock().push(params.clone());
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) {
        self.spec
            .log
            .display_orientation
            .store(degrees, Ordering::SeqCst);
    }

    fn start_preview(&mut self) {
        self.previewing = true;
        self.spec
            .log
            .start_preview_count
            .fetch_add(1, Ordering::SeqCst);
    }

    fn stop_preview(&mut self) {
        self.previewing = false;
        self.spec
            .log
            .stop_preview_count
            .fetch_add(1, Ordering::SeqCst);
    }

    fn request_one_shot_frame(&mut self, sink: FrameSink) {
        if !self.previewing {
            debug!("one-shot frame requested while not previewing; dropping");
            return;
        }
        self.spec.log.frame_requests.fetch_add(1, Ordering::SeqCst);

        let size = self.parameters.preview_size.unwrap_or(Size::new(640, 480));
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut frame_fn = self.spec.frame_fn.lock();
        let data = (*frame_fn)(sequence, size);
        drop(frame_fn);
        sink(PreviewFrame::new(data, size.width, size.height));
    }

    fn auto_focus(&mut self, done: oneshot::Sender<bool>) -> Result<(), CameraError> {
        self.spec.log.auto_focus_calls.fetch_add(1, Ordering::SeqCst);
        // Mock optics are always in focus.
        let _ = done.send(true);
        Ok(())
    }

    fn cancel_auto_focus(&mut self) {
        self.spec
            .log
            .cancel_focus_calls
            .fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.previewing = false;
        self.spec.log.released.store(true, Ordering::SeqCst);
    }
}
