//! Camera parameter and capability sets.
//!
//! Parameters are a plain value struct the tuning layer edits and the
//! session applies in one call, so a rejected configuration can be rolled
//! back wholesale from a previously flattened snapshot.

use crate::error::CameraError;
use crate::geometry::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    ContinuousPicture,
    ContinuousVideo,
    Macro,
    Edof,
    Fixed,
    Infinity,
}

impl FocusMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusMode::Auto => "auto",
            FocusMode::ContinuousPicture => "continuous-picture",
            FocusMode::ContinuousVideo => "continuous-video",
            FocusMode::Macro => "macro",
            FocusMode::Edof => "edof",
            FocusMode::Fixed => "fixed",
            FocusMode::Infinity => "infinity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(FocusMode::Auto),
            "continuous-picture" => Some(FocusMode::ContinuousPicture),
            "continuous-video" => Some(FocusMode::ContinuousVideo),
            "macro" => Some(FocusMode::Macro),
            "edof" => Some(FocusMode::Edof),
            "fixed" => Some(FocusMode::Fixed),
            "infinity" => Some(FocusMode::Infinity),
            _ => None,
        }
    }

    /// Modes that require the client to drive focus cycles itself.
    pub fn requires_focus_calls(&self) -> bool {
        matches!(self, FocusMode::Auto | FocusMode::Macro)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    Off,
    On,
    Torch,
    Auto,
}

impl FlashMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashMode::Off => "off",
            FlashMode::On => "on",
            FlashMode::Torch => "torch",
            FlashMode::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(FlashMode::Off),
            "on" => Some(FlashMode::On),
            "torch" => Some(FlashMode::Torch),
            "auto" => Some(FlashMode::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneMode {
    Auto,
    Barcode,
    Action,
    Night,
}

impl SceneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneMode::Auto => "auto",
            SceneMode::Barcode => "barcode",
            SceneMode::Action => "action",
            SceneMode::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(SceneMode::Auto),
            "barcode" => Some(SceneMode::Barcode),
            "action" => Some(SceneMode::Action),
            "night" => Some(SceneMode::Night),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorEffect {
    None,
    Negative,
    Mono,
}

impl ColorEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorEffect::None => "none",
            ColorEffect::Negative => "negative",
            ColorEffect::Mono => "mono",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ColorEffect::None),
            "negative" => Some(ColorEffect::Negative),
            "mono" => Some(ColorEffect::Mono),
            _ => None,
        }
    }
}

/// Preview frame-rate range in frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Weighted focus/metering region in driver coordinates (-1000..1000 per
/// axis, origin at sensor center).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub weight: u32,
}

impl Area {
    /// A centered square covering `extent` driver units per side from center.
    pub fn centered(extent: i32, weight: u32) -> Self {
        Self {
            left: -extent,
            top: -extent,
            right: extent,
            bottom: extent,
            weight,
        }
    }
}

/// What one device supports; checked by the tuning layer before any value
/// is applied.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub supported_preview_sizes: Vec<Size>,
    pub supported_focus_modes: Vec<FocusMode>,
    pub supported_flash_modes: Vec<FlashMode>,
    pub supported_scene_modes: Vec<SceneMode>,
    pub supported_color_effects: Vec<ColorEffect>,
    pub supported_fps_ranges: Vec<FpsRange>,
    /// (min, max) exposure compensation indices; (0, 0) means unsupported.
    pub exposure_compensation_range: (i32, i32),
    /// EV per compensation index step; 0.0 means unsupported.
    pub exposure_compensation_step: f32,
    pub max_focus_areas: u32,
    pub max_metering_areas: u32,
    pub video_stabilization_supported: bool,
    /// Zoom ratios in percent, one per zoom index; empty means unsupported.
    pub zoom_ratios: Vec<u32>,
}

/// One coherent parameter set, applied atomically to the device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceParameters {
    pub focus_mode: Option<FocusMode>,
    pub flash_mode: Option<FlashMode>,
    pub scene_mode: Option<SceneMode>,
    pub color_effect: Option<ColorEffect>,
    pub exposure_compensation: i32,
    pub preview_size: Option<Size>,
    pub preview_fps_range: Option<FpsRange>,
    pub zoom_index: u32,
    pub video_stabilization: bool,
    pub focus_areas: Vec<Area>,
    pub metering_areas: Vec<Area>,
}

impl DeviceParameters {
    /// Whether the flash is currently lighting the scene.
    pub fn torch_enabled(&self) -> bool {
        matches!(self.flash_mode, Some(FlashMode::On) | Some(FlashMode::Torch))
    }

    /// Serialize to a `key=value;` string, the snapshot format used by the
    /// safe-mode rollback path.
    pub fn flatten(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(mode) = self.focus_mode {
            parts.push(format!("focus-mode={}", mode.as_str()));
        }
        if let Some(mode) = self.flash_mode {
            parts.push(format!("flash-mode={}", mode.as_str()));
        }
        if let Some(mode) = self.scene_mode {
            parts.push(format!("scene-mode={}", mode.as_str()));
        }
        if let Some(effect) = self.color_effect {
            parts.push(format!("effect={}", effect.as_str()));
        }
        parts.push(format!("exposure-compensation={}", self.exposure_compensation));
        if let Some(size) = self.preview_size {
            parts.push(format!("preview-size={}x{}", size.width, size.height));
        }
        if let Some(range) = self.preview_fps_range {
            parts.push(format!("preview-fps-range={},{}", range.min, range.max));
        }
        parts.push(format!("zoom={}", self.zoom_index));
        parts.push(format!("video-stabilization={}", self.video_stabilization));
        parts.join(";")
    }

    /// Restore a parameter set from its flattened form.
    ///
    /// Focus/metering areas are not round-tripped; the snapshot exists to
    /// restore a known-good baseline, and areas are re-derived by the
    /// tuning layer on the next configure pass.
    pub fn unflatten(flattened: &str) -> Result<Self, CameraError> {
        let mut params = DeviceParameters::default();
        for part in flattened.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CameraError::rejected(format!("bad parameter entry: {part}")))?;
            match key {
                "focus-mode" => params.focus_mode = FocusMode::parse(value),
                "flash-mode" => params.flash_mode = FlashMode::parse(value),
                "scene-mode" => params.scene_mode = SceneMode::parse(value),
                "effect" => params.color_effect = ColorEffect::parse(value),
                "exposure-compensation" => {
                    params.exposure_compensation = value.parse().map_err(|_| {
                        CameraError::rejected(format!("bad exposure compensation: {value}"))
                    })?;
                }
                "preview-size" => {
                    let (w, h) = value.split_once('x').ok_or_else(|| {
                        CameraError::rejected(format!("bad preview size: {value}"))
                    })?;
                    let width = w
                        .parse()
                        .map_err(|_| CameraError::rejected(format!("bad preview size: {value}")))?;
                    let height = h
                        .parse()
                        .map_err(|_| CameraError::rejected(format!("bad preview size: {value}")))?;
                    params.preview_size = Some(Size::new(width, height));
                }
                "preview-fps-range" => {
                    let (min, max) = value.split_once(',').ok_or_else(|| {
                        CameraError::rejected(format!("bad fps range: {value}"))
                    })?;
                    let min = min
                        .parse()
                        .map_err(|_| CameraError::rejected(format!("bad fps range: {value}")))?;
                    let max = max
                        .parse()
                        .map_err(|_| CameraError::rejected(format!("bad fps range: {value}")))?;
                    params.preview_fps_range = Some(FpsRange::new(min, max));
                }
                "zoom" => {
                    params.zoom_index = value
                        .parse()
                        .map_err(|_| CameraError::rejected(format!("bad zoom index: {value}")))?;
                }
                "video-stabilization" => {
                    params.video_stabilization = value == "true";
                }
                _ => {
                    // Unknown keys from newer drivers are ignored, not fatal.
                }
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_mode_str_round_trip() {
        for mode in [
            FocusMode::Auto,
            FocusMode::ContinuousPicture,
            FocusMode::ContinuousVideo,
            FocusMode::Macro,
            FocusMode::Edof,
            FocusMode::Fixed,
            FocusMode::Infinity,
        ] {
            assert_eq!(FocusMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(FocusMode::parse("bogus"), None);
    }

    #[test]
    fn test_focus_modes_requiring_calls() {
        assert!(FocusMode::Auto.requires_focus_calls());
        assert!(FocusMode::Macro.requires_focus_calls());
        assert!(!FocusMode::ContinuousPicture.requires_focus_calls());
        assert!(!FocusMode::Fixed.requires_focus_calls());
    }

    #[test]
    fn test_torch_enabled() {
        let mut params = DeviceParameters::default();
        assert!(!params.torch_enabled());
        params.flash_mode = Some(FlashMode::Torch);
        assert!(params.torch_enabled());
        params.flash_mode = Some(FlashMode::On);
        assert!(params.torch_enabled());
        params.flash_mode = Some(FlashMode::Off);
        assert!(!params.torch_enabled());
    }

    #[test]
    fn test_flatten_round_trip() {
        let params = DeviceParameters {
            focus_mode: Some(FocusMode::ContinuousPicture),
            flash_mode: Some(FlashMode::Torch),
            scene_mode: Some(SceneMode::Barcode),
            color_effect: Some(ColorEffect::Negative),
            exposure_compensation: -3,
            preview_size: Some(Size::new(1280, 720)),
            preview_fps_range: Some(FpsRange::new(10, 20)),
            zoom_index: 4,
            video_stabilization: true,
            focus_areas: vec![Area::centered(400, 1)],
            metering_areas: Vec::new(),
        };
        let mut restored = DeviceParameters::unflatten(&params.flatten()).unwrap();
        // Areas intentionally do not survive the snapshot.
        assert!(restored.focus_areas.is_empty());
        restored.focus_areas = params.focus_areas.clone();
        assert_eq!(restored, params);
    }

    #[test]
    fn test_unflatten_rejects_garbage() {
        assert!(DeviceParameters::unflatten("no-equals-sign").is_err());
        assert!(DeviceParameters::unflatten("exposure-compensation=abc").is_err());
        assert!(DeviceParameters::unflatten("preview-size=1280").is_err());
    }

    #[test]
    fn test_unflatten_ignores_unknown_keys() {
        let params = DeviceParameters::unflatten("vendor-magic=7;zoom=2").unwrap();
        assert_eq!(params.zoom_index, 2);
    }
}
