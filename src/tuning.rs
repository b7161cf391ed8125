//! Capability-guarded camera parameter selection.
//!
//! Hardware is heterogeneous: every setter here checks what the device
//! reports as supported and silently skips anything it cannot honor. A
//! skipped parameter is a debug log line, never an error.

use crate::hardware::params::{
    Area, ColorEffect, DeviceCapabilities, DeviceParameters, FlashMode, FocusMode, FpsRange,
    SceneMode,
};
use tracing::{debug, info};

const MAX_EXPOSURE_COMPENSATION: f32 = 1.5;
const MIN_EXPOSURE_COMPENSATION: f32 = 0.0;
const MIN_FPS: u32 = 10;
const MAX_FPS: u32 = 20;
/// Focus/metering region half-extent, in thousandths of the sensor span.
const AREA_PER_1000: i32 = 400;

/// First desired value the device supports, if any.
fn find_settable_value<T: Copy + PartialEq + std::fmt::Debug>(
    name: &str,
    supported: &[T],
    desired: &[T],
) -> Option<T> {
    debug!("requesting {} from: {:?}", name, desired);
    debug!("supported {} values: {:?}", name, supported);
    let found = desired.iter().copied().find(|v| supported.contains(v));
    match found {
        Some(value) => debug!("can set {} to: {:?}", name, value),
        None => debug!("no supported {} value matched", name),
    }
    found
}

/// Pick the focus mode to run with.
///
/// Auto-focus preference falls back through continuous modes to plain auto;
/// safe mode and the continuous-focus kill switch restrict the choice to
/// plain auto. With auto-focus off (or nothing matching), macro/EDOF are
/// still tried outside safe mode so close-range scanning keeps working.
pub fn select_focus_mode(
    caps: &DeviceCapabilities,
    auto_focus: bool,
    disable_continuous: bool,
    safe_mode: bool,
) -> Option<FocusMode> {
    let supported = &caps.supported_focus_modes;
    let mut focus_mode = None;
    if auto_focus {
        focus_mode = if safe_mode || disable_continuous {
            find_settable_value("focus mode", supported, &[FocusMode::Auto])
        } else {
            find_settable_value(
                "focus mode",
                supported,
                &[
                    FocusMode::ContinuousPicture,
                    FocusMode::ContinuousVideo,
                    FocusMode::Auto,
                ],
            )
        };
    }
    if !safe_mode && focus_mode.is_none() {
        focus_mode = find_settable_value(
            "focus mode",
            supported,
            &[FocusMode::Macro, FocusMode::Edof],
        );
    }
    focus_mode
}

pub fn apply_focus(
    params: &mut DeviceParameters,
    caps: &DeviceCapabilities,
    auto_focus: bool,
    disable_continuous: bool,
    safe_mode: bool,
) {
    if let Some(mode) = select_focus_mode(caps, auto_focus, disable_continuous, safe_mode) {
        if params.focus_mode == Some(mode) {
            debug!("focus mode already set to {:?}", mode);
        } else {
            params.focus_mode = Some(mode);
        }
    }
}

pub fn apply_torch(params: &mut DeviceParameters, caps: &DeviceCapabilities, on: bool) {
    let flash_mode = if on {
        find_settable_value(
            "flash mode",
            &caps.supported_flash_modes,
            &[FlashMode::Torch, FlashMode::On],
        )
    } else {
        find_settable_value("flash mode", &caps.supported_flash_modes, &[FlashMode::Off])
    };
    if let Some(mode) = flash_mode {
        if params.flash_mode == Some(mode) {
            debug!("flash mode already set to {:?}", mode);
        } else {
            debug!("setting flash mode to {:?}", mode);
            params.flash_mode = Some(mode);
        }
    }
}

/// Exposure compensation tuned for scanning: dim slightly when the torch
/// lights the scene, brighten otherwise. Clamped to the device range.
pub fn apply_best_exposure(params: &mut DeviceParameters, caps: &DeviceCapabilities, torch_on: bool) {
    let (min_exposure, max_exposure) = caps.exposure_compensation_range;
    let step = caps.exposure_compensation_step;
    if (min_exposure == 0 && max_exposure == 0) || step <= 0.0 {
        debug!("camera does not support exposure compensation");
        return;
    }

    let target_compensation = if torch_on {
        MIN_EXPOSURE_COMPENSATION
    } else {
        MAX_EXPOSURE_COMPENSATION
    };
    let mut compensation_steps = (target_compensation / step).round() as i32;
    compensation_steps = compensation_steps.clamp(min_exposure, max_exposure);
    let actual_compensation = step * compensation_steps as f32;

    if params.exposure_compensation == compensation_steps {
        debug!(
            "exposure compensation already set to {} / {}",
            compensation_steps, actual_compensation
        );
    } else {
        debug!(
            "setting exposure compensation to {} / {}",
            compensation_steps, actual_compensation
        );
        params.exposure_compensation = compensation_steps;
    }
}

pub fn apply_best_preview_fps(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    apply_preview_fps_in_range(params, caps, MIN_FPS, MAX_FPS);
}

/// First supported FPS range entirely within `[min_fps, max_fps]`.
pub fn apply_preview_fps_in_range(
    params: &mut DeviceParameters,
    caps: &DeviceCapabilities,
    min_fps: u32,
    max_fps: u32,
) {
    if caps.supported_fps_ranges.is_empty() {
        return;
    }
    debug!("supported FPS ranges: {:?}", caps.supported_fps_ranges);

    let suitable = caps
        .supported_fps_ranges
        .iter()
        .copied()
        .find(|range| range.min >= min_fps && range.max <= max_fps);

    match suitable {
        None => debug!("no suitable FPS range"),
        Some(range) => {
            if params.preview_fps_range == Some(range) {
                debug!("FPS range already set to {:?}", range);
            } else {
                debug!("setting FPS range to {:?}", range);
                params.preview_fps_range = Some(range);
            }
        }
    }
}

pub fn apply_barcode_scene_mode(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    if params.scene_mode == Some(SceneMode::Barcode) {
        debug!("barcode scene mode already set");
        return;
    }
    if let Some(mode) = find_settable_value(
        "scene mode",
        &caps.supported_scene_modes,
        &[SceneMode::Barcode],
    ) {
        params.scene_mode = Some(mode);
    }
}

pub fn apply_invert_color(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    if params.color_effect == Some(ColorEffect::Negative) {
        debug!("negative effect already set");
        return;
    }
    if let Some(effect) = find_settable_value(
        "color effect",
        &caps.supported_color_effects,
        &[ColorEffect::Negative],
    ) {
        params.color_effect = Some(effect);
    }
}

pub fn apply_video_stabilization(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    if !caps.video_stabilization_supported {
        debug!("this device does not support video stabilization");
        return;
    }
    if params.video_stabilization {
        debug!("video stabilization already enabled");
    } else {
        debug!("enabling video stabilization");
        params.video_stabilization = true;
    }
}

pub fn apply_focus_area(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    if caps.max_focus_areas == 0 {
        debug!("device does not support focus areas");
        return;
    }
    debug!("old focus areas: {:?}", params.focus_areas);
    params.focus_areas = vec![Area::centered(AREA_PER_1000, 1)];
}

pub fn apply_metering_area(params: &mut DeviceParameters, caps: &DeviceCapabilities) {
    if caps.max_metering_areas == 0 {
        debug!("device does not support metering areas");
        return;
    }
    debug!("old metering areas: {:?}", params.metering_areas);
    params.metering_areas = vec![Area::centered(AREA_PER_1000, 1)];
}

/// Zoom index whose ratio is closest to `target_ratio`.
pub fn apply_zoom(params: &mut DeviceParameters, caps: &DeviceCapabilities, target_ratio: f64) {
    if caps.zoom_ratios.is_empty() {
        debug!("zoom is not supported");
        return;
    }
    debug!("zoom ratios: {:?}", caps.zoom_ratios);

    let target100 = 100.0 * target_ratio;
    let mut smallest_diff = f64::INFINITY;
    let mut closest_index = 0u32;
    for (i, &ratio) in caps.zoom_ratios.iter().enumerate() {
        let diff = (ratio as f64 - target100).abs();
        if diff < smallest_diff {
            smallest_diff = diff;
            closest_index = i as u32;
        }
    }
    info!(
        "chose zoom ratio {}",
        caps.zoom_ratios[closest_index as usize] as f64 / 100.0
    );

    if params.zoom_index == closest_index {
        debug!("zoom already set to {}", closest_index);
    } else {
        params.zoom_index = closest_index;
    }
}

/// Sorted flattened parameter dump for diagnostics.
pub fn collect_stats(params: &DeviceParameters) -> String {
    let flattened = params.flatten();
    let mut entries: Vec<&str> = flattened.split(';').filter(|p| !p.is_empty()).collect();
    entries.sort_unstable();
    let mut out = String::with_capacity(flattened.len() + entries.len());
    for entry in entries {
        out.push_str(entry);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities {
            supported_preview_sizes: vec![Size::new(640, 480)],
            supported_focus_modes: vec![
                FocusMode::Auto,
                FocusMode::ContinuousPicture,
                FocusMode::Macro,
            ],
            supported_flash_modes: vec![FlashMode::Off, FlashMode::Torch],
            supported_scene_modes: vec![SceneMode::Auto, SceneMode::Barcode],
            supported_color_effects: vec![ColorEffect::None, ColorEffect::Negative],
            supported_fps_ranges: vec![FpsRange::new(30, 30), FpsRange::new(15, 15)],
            exposure_compensation_range: (-3, 3),
            exposure_compensation_step: 0.5,
            max_focus_areas: 1,
            max_metering_areas: 0,
            video_stabilization_supported: false,
            zoom_ratios: vec![100, 150, 200, 400],
        }
    }

    #[test]
    fn test_focus_mode_selection_prefers_continuous() {
        let caps = caps();
        assert_eq!(
            select_focus_mode(&caps, true, false, false),
            Some(FocusMode::ContinuousPicture)
        );
        // Continuous disabled falls back to plain auto.
        assert_eq!(
            select_focus_mode(&caps, true, true, false),
            Some(FocusMode::Auto)
        );
        // Safe mode restricts to plain auto as well.
        assert_eq!(
            select_focus_mode(&caps, true, false, true),
            Some(FocusMode::Auto)
        );
        // Auto-focus off still tries macro outside safe mode.
        assert_eq!(
            select_focus_mode(&caps, false, false, false),
            Some(FocusMode::Macro)
        );
        assert_eq!(select_focus_mode(&caps, false, false, true), None);
    }

    #[test]
    fn test_focus_mode_unsupported_hardware() {
        let mut caps = caps();
        caps.supported_focus_modes = vec![FocusMode::Fixed];
        assert_eq!(select_focus_mode(&caps, true, false, false), None);
        let mut params = DeviceParameters::default();
        apply_focus(&mut params, &caps, true, false, false);
        assert_eq!(params.focus_mode, None);
    }

    #[test]
    fn test_apply_torch_uses_supported_mode() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_torch(&mut params, &caps, true);
        assert_eq!(params.flash_mode, Some(FlashMode::Torch));
        apply_torch(&mut params, &caps, false);
        assert_eq!(params.flash_mode, Some(FlashMode::Off));
    }

    #[test]
    fn test_apply_torch_without_flash_hardware() {
        let mut caps = caps();
        caps.supported_flash_modes = Vec::new();
        let mut params = DeviceParameters::default();
        apply_torch(&mut params, &caps, true);
        assert_eq!(params.flash_mode, None);
    }

    #[test]
    fn test_exposure_compensation_steps() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        // Target 1.5 EV at 0.5 EV per step is 3 steps, inside the range.
        apply_best_exposure(&mut params, &caps, false);
        assert_eq!(params.exposure_compensation, 3);
        // Torch on targets 0.0 EV.
        apply_best_exposure(&mut params, &caps, true);
        assert_eq!(params.exposure_compensation, 0);
    }

    #[test]
    fn test_exposure_compensation_clamped() {
        let mut caps = caps();
        caps.exposure_compensation_range = (-1, 1);
        let mut params = DeviceParameters::default();
        apply_best_exposure(&mut params, &caps, false);
        assert_eq!(params.exposure_compensation, 1);
    }

    #[test]
    fn test_exposure_compensation_unsupported() {
        let mut caps = caps();
        caps.exposure_compensation_range = (0, 0);
        let mut params = DeviceParameters::default();
        params.exposure_compensation = 2;
        apply_best_exposure(&mut params, &caps, false);
        assert_eq!(params.exposure_compensation, 2);
    }

    #[test]
    fn test_preview_fps_selection() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_best_preview_fps(&mut params, &caps);
        // (30, 30) is outside [10, 20]; (15, 15) is the first fit.
        assert_eq!(params.preview_fps_range, Some(FpsRange::new(15, 15)));
    }

    #[test]
    fn test_preview_fps_no_fit_leaves_params() {
        let mut caps = caps();
        caps.supported_fps_ranges = vec![FpsRange::new(30, 30)];
        let mut params = DeviceParameters::default();
        apply_best_preview_fps(&mut params, &caps);
        assert_eq!(params.preview_fps_range, None);
    }

    #[test]
    fn test_scene_and_color_guards() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_barcode_scene_mode(&mut params, &caps);
        assert_eq!(params.scene_mode, Some(SceneMode::Barcode));
        apply_invert_color(&mut params, &caps);
        assert_eq!(params.color_effect, Some(ColorEffect::Negative));

        let mut bare = DeviceCapabilities::default();
        bare.supported_scene_modes = vec![SceneMode::Auto];
        let mut params = DeviceParameters::default();
        apply_barcode_scene_mode(&mut params, &bare);
        assert_eq!(params.scene_mode, None);
    }

    #[test]
    fn test_area_guards() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_focus_area(&mut params, &caps);
        assert_eq!(params.focus_areas, vec![Area::centered(400, 1)]);
        // max_metering_areas is 0 in these caps.
        apply_metering_area(&mut params, &caps);
        assert!(params.metering_areas.is_empty());
    }

    #[test]
    fn test_stabilization_guard() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_video_stabilization(&mut params, &caps);
        assert!(!params.video_stabilization);

        let mut supported = caps;
        supported.video_stabilization_supported = true;
        apply_video_stabilization(&mut params, &supported);
        assert!(params.video_stabilization);
    }

    #[test]
    fn test_zoom_closest_index() {
        let caps = caps();
        let mut params = DeviceParameters::default();
        apply_zoom(&mut params, &caps, 1.6);
        assert_eq!(params.zoom_index, 1); // 150 is closest to 160
        apply_zoom(&mut params, &caps, 10.0);
        assert_eq!(params.zoom_index, 3); // saturates at the largest ratio
    }

    #[test]
    fn test_zoom_unsupported() {
        let mut caps = caps();
        caps.zoom_ratios = Vec::new();
        let mut params = DeviceParameters::default();
        params.zoom_index = 2;
        apply_zoom(&mut params, &caps, 1.5);
        assert_eq!(params.zoom_index, 2);
    }

    #[test]
    fn test_collect_stats_sorted() {
        let mut params = DeviceParameters::default();
        params.flash_mode = Some(FlashMode::Off);
        params.focus_mode = Some(FocusMode::Auto);
        let stats = collect_stats(&params);
        let lines: Vec<&str> = stats.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
        assert!(stats.contains("focus-mode=auto"));
    }
}
