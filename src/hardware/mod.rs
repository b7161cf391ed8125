//! Abstraction over the platform camera API.
//!
//! The pipeline never talks to a driver directly: everything goes through
//! [`CameraBackend`] and [`CameraHandle`], and all hardware access is
//! serialized by the owning session. The in-tree [`mock`] backend is what
//! tests and the demo binary run against; real platform bindings implement
//! the same traits out of tree.

pub mod mock;
pub mod params;

pub use params::{
    Area, ColorEffect, DeviceCapabilities, DeviceParameters, FlashMode, FocusMode, FpsRange,
    SceneMode,
};

use crate::error::CameraError;
use crate::frame::PreviewFrame;
use crate::geometry::CameraFacing;
use tokio::sync::oneshot;

/// Static facts about one camera device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub facing: CameraFacing,
    /// Clockwise sensor mount orientation in degrees.
    pub orientation: u32,
}

/// Delivery sink for a single-shot frame request. Invoked exactly once,
/// from the camera's callback context, and must not block.
pub type FrameSink = Box<dyn FnOnce(PreviewFrame) + Send + 'static>;

/// Enumerates and opens camera devices.
pub trait CameraBackend: Send + Sync {
    fn device_count(&self) -> u32;

    fn device_info(&self, index: u32) -> Result<DeviceInfo, CameraError>;

    fn open(&self, index: u32) -> Result<Box<dyn CameraHandle>, CameraError>;
}

/// One opened camera device.
///
/// Implementations are not required to be thread-safe; the owning session
/// serializes all access behind its own lock.
pub trait CameraHandle: Send {
    fn info(&self) -> DeviceInfo;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Current parameter set as the driver reports it.
    fn parameters(&self) -> DeviceParameters;

    /// Apply a parameter set. Drivers may reject the whole set.
    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), CameraError>;

    /// Clockwise rotation the device applies when presenting preview frames.
    fn set_display_orientation(&mut self, degrees: u32);

    fn start_preview(&mut self);

    fn stop_preview(&mut self);

    /// Ask for exactly one preview frame. The sink fires once per call;
    /// a stopped preview silently drops the request.
    fn request_one_shot_frame(&mut self, sink: FrameSink);

    /// Begin one auto-focus cycle; `done` receives the focus outcome.
    fn auto_focus(&mut self, done: oneshot::Sender<bool>) -> Result<(), CameraError>;

    /// Best-effort cancellation of an in-flight focus cycle.
    fn cancel_auto_focus(&mut self);

    /// Release the hardware. Further calls are undefined; the session
    /// drops the handle right after.
    fn release(&mut self);
}
