//! Preview-size, framing-rect and rotation negotiation.
//!
//! Everything here is pure: given the sizes the hardware reports and the
//! screen the preview is drawn on, the same inputs always produce the same
//! geometry. The session layer caches the results; nothing in this module
//! touches hardware.

use crate::error::CameraError;
use crate::geometry::{CameraFacing, DisplayRotation, Rect, Size};
use tracing::{debug, info, warn};

/// Candidates below this pixel count make a useless preview.
const MIN_PREVIEW_PIXELS: u64 = 480 * 320;

/// Maximum tolerated difference between candidate and screen aspect ratios.
const MAX_ASPECT_DISTORTION: f64 = 0.15;

const MIN_FRAME_WIDTH: u32 = 240;
const MIN_FRAME_HEIGHT: u32 = 240;
const MAX_FRAME_WIDTH: u32 = 1200; // = 5/8 * 1920
const MAX_FRAME_HEIGHT: u32 = 675; // = 5/8 * 1080

/// Select the best supported preview size for the given screen.
///
/// Candidates are considered in descending pixel-count order. Sizes below
/// the pixel floor or with too much aspect distortion are dropped; an
/// orientation-normalized exact match with the screen wins outright,
/// otherwise the largest survivor. With no survivors the hardware's current
/// default is used; lacking even that is a configuration error.
pub fn find_best_preview_size(
    supported: &[Size],
    default_size: Option<Size>,
    screen: Size,
) -> Result<Size, CameraError> {
    if supported.is_empty() {
        warn!("device reported no supported preview sizes; using default");
        return default_size
            .ok_or_else(|| CameraError::rejected("no supported preview sizes and no default"));
    }

    let mut candidates: Vec<Size> = supported.to_vec();
    // Total order: pixel-count ties broken by dimensions, so the choice
    // never depends on the order the driver listed its sizes in.
    candidates.sort_by(|a, b| {
        b.pixel_count()
            .cmp(&a.pixel_count())
            .then_with(|| b.width.cmp(&a.width))
            .then_with(|| b.height.cmp(&a.height))
    });

    debug!(
        "supported preview sizes: {}",
        candidates
            .iter()
            .map(Size::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    );

    let screen_aspect_ratio = screen.normalized_aspect_ratio();

    let mut survivors: Vec<Size> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.pixel_count() < MIN_PREVIEW_PIXELS {
            continue;
        }

        let distortion =
            (candidate.normalized_aspect_ratio() - screen_aspect_ratio).abs();
        if distortion > MAX_ASPECT_DISTORTION {
            continue;
        }

        // Orientation-normalized exact match with the screen wins outright.
        let flipped = if candidate.is_portrait() == screen.is_portrait() {
            candidate
        } else {
            candidate.transposed()
        };
        if flipped == screen {
            info!("found preview size exactly matching screen: {}", candidate);
            return Ok(candidate);
        }

        survivors.push(candidate);
    }

    if let Some(largest) = survivors.first() {
        info!("using largest suitable preview size: {}", largest);
        return Ok(*largest);
    }

    match default_size {
        Some(size) => {
            info!("no suitable preview size; using default: {}", size);
            Ok(size)
        }
        None => Err(CameraError::rejected(
            "no suitable preview size and no default",
        )),
    }
}

/// 5/8 of the dimension, clamped into the hard bounds.
pub fn find_desired_dimension_in_range(resolution: u32, hard_min: u32, hard_max: u32) -> u32 {
    let dim = 5 * resolution / 8;
    dim.clamp(hard_min, hard_max)
}

/// The screen-space rectangle the user is asked to center a symbol in.
pub fn framing_rect(screen: Size) -> Rect {
    let width = find_desired_dimension_in_range(screen.width, MIN_FRAME_WIDTH, MAX_FRAME_WIDTH);
    let height = find_desired_dimension_in_range(screen.height, MIN_FRAME_HEIGHT, MAX_FRAME_HEIGHT);
    let rect = Rect::centered_in(screen, width, height);
    debug!("calculated framing rect: {}", rect);
    rect
}

/// A caller-specified framing rectangle, clamped to the screen and centered.
pub fn manual_framing_rect(screen: Size, requested_width: u32, requested_height: u32) -> Rect {
    let width = requested_width.min(screen.width);
    let height = requested_height.min(screen.height);
    let rect = Rect::centered_in(screen, width, height);
    debug!("calculated manual framing rect: {}", rect);
    rect
}

/// Remap a screen-space rectangle into preview-buffer coordinates.
///
/// Linear per-axis scaling by `preview / screen`, rounding toward zero.
pub fn framing_rect_in_preview(rect: Rect, screen: Size, preview: Size) -> Rect {
    let scale_x = |v: i32| (v as i64 * preview.width as i64 / screen.width.max(1) as i64) as i32;
    let scale_y = |v: i32| (v as i64 * preview.height as i64 / screen.height.max(1) as i64) as i32;

    let left = scale_x(rect.left);
    let right = scale_x(rect.right());
    let top = scale_y(rect.top);
    let bottom = scale_y(rect.bottom());
    Rect::new(
        left,
        top,
        (right - left).max(0) as u32,
        (bottom - top).max(0) as u32,
    )
}

/// Clockwise rotation from the display orientation to the camera sensor.
///
/// Front-facing sensors are mirrored, so their mount orientation is
/// reflected before the displays are reconciled.
pub fn rotation_from_display_to_camera(
    display: DisplayRotation,
    sensor_orientation: u32,
    facing: CameraFacing,
) -> u32 {
    let mut from_natural_to_camera = sensor_orientation % 360;
    if facing == CameraFacing::Front {
        from_natural_to_camera = (360 - from_natural_to_camera) % 360;
    }
    (360 + from_natural_to_camera - display.degrees()) % 360
}

/// Clockwise rotation to apply to captured frames to present them upright.
///
/// Equal to [`rotation_from_display_to_camera`] for back cameras; the
/// front camera's mirroring flips it to the complement.
pub fn needed_rotation(
    display: DisplayRotation,
    sensor_orientation: u32,
    facing: CameraFacing,
) -> u32 {
    let display_to_camera = rotation_from_display_to_camera(display, sensor_orientation, facing);
    match facing {
        CameraFacing::Back => display_to_camera,
        CameraFacing::Front => (360 - display_to_camera) % 360,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_best_size_rejects_below_pixel_floor() {
        let supported = [Size::new(320, 240), Size::new(160, 120)];
        let screen = Size::new(640, 480);
        // Nothing clears the floor, so the default wins.
        let best =
            find_best_preview_size(&supported, Some(Size::new(320, 240)), screen).unwrap();
        assert_eq!(best, Size::new(320, 240));
    }

    #[test]
    fn test_best_size_portrait_screen_scenario() {
        // Portrait 720x1280 screen against typical landscape sensor sizes:
        // 320x240 is below the floor, 640x480 has 4:3 distortion against the
        // 16:9 screen, and 1280x720 is the orientation-normalized exact match.
        let supported = [
            Size::new(640, 480),
            Size::new(1280, 720),
            Size::new(320, 240),
        ];
        let screen = Size::new(720, 1280);
        let best = find_best_preview_size(&supported, None, screen).unwrap();
        assert_eq!(best, Size::new(1280, 720));
    }

    #[test]
    fn test_best_size_prefers_largest_survivor() {
        let supported = [
            Size::new(800, 448),
            Size::new(1920, 1080),
            Size::new(1280, 720),
        ];
        let screen = Size::new(2560, 1440);
        let best = find_best_preview_size(&supported, None, screen).unwrap();
        assert_eq!(best, Size::new(1920, 1080));
    }

    #[test]
    fn test_best_size_empty_supported_uses_default() {
        let best = find_best_preview_size(&[], Some(Size::new(640, 480)), Size::new(1280, 720))
            .unwrap();
        assert_eq!(best, Size::new(640, 480));
        assert!(find_best_preview_size(&[], None, Size::new(1280, 720)).is_err());
    }

    #[test]
    fn test_desired_dimension_clamping() {
        assert_eq!(find_desired_dimension_in_range(1920, 240, 1200), 1200);
        assert_eq!(find_desired_dimension_in_range(1080, 240, 675), 675);
        assert_eq!(find_desired_dimension_in_range(320, 240, 1200), 240);
        assert_eq!(find_desired_dimension_in_range(800, 240, 1200), 500);
    }

    #[test]
    fn test_framing_rect_centered() {
        let screen = Size::new(1080, 1920);
        let rect = framing_rect(screen);
        assert_eq!((screen.width as i32 - rect.width as i32) / 2, rect.left);
        assert_eq!((screen.height as i32 - rect.height as i32) / 2, rect.top);
        assert_eq!(rect.width, 675); // 5/8 * 1080
        assert_eq!(rect.height, 675); // 5/8 * 1920 clamped to max
    }

    #[test]
    fn test_manual_framing_rect_clamped_to_screen() {
        let screen = Size::new(480, 800);
        let rect = manual_framing_rect(screen, 600, 300);
        assert_eq!(rect.width, 480);
        assert_eq!(rect.height, 300);
        assert_eq!(rect.left, 0);
        assert_eq!(rect.top, 250);
    }

    #[test]
    fn test_framing_rect_in_preview_remap() {
        let screen = Size::new(1080, 1920);
        let preview = Size::new(540, 960);
        let rect = Rect::new(202, 622, 675, 675);
        let mapped = framing_rect_in_preview(rect, screen, preview);
        assert_eq!(mapped, Rect::new(101, 311, 337, 337));
    }

    #[test]
    fn test_needed_rotation_literal_tuples() {
        assert_eq!(
            needed_rotation(DisplayRotation::Deg90, 90, CameraFacing::Back),
            0
        );
        assert_eq!(
            needed_rotation(DisplayRotation::Deg0, 90, CameraFacing::Back),
            90
        );
        assert_eq!(
            needed_rotation(DisplayRotation::Deg270, 90, CameraFacing::Back),
            180
        );
        // Mirrored front sensor at the same mount point.
        assert_eq!(
            needed_rotation(DisplayRotation::Deg0, 90, CameraFacing::Front),
            90
        );
    }

    #[test]
    fn test_front_rotation_is_complement_of_display_to_camera() {
        for display in [
            DisplayRotation::Deg0,
            DisplayRotation::Deg90,
            DisplayRotation::Deg180,
            DisplayRotation::Deg270,
        ] {
            for sensor in [0u32, 90, 180, 270] {
                let d2c = rotation_from_display_to_camera(display, sensor, CameraFacing::Front);
                let needed = needed_rotation(display, sensor, CameraFacing::Front);
                assert_eq!(needed, (360 - d2c) % 360);
                assert_eq!(
                    needed_rotation(display, sensor, CameraFacing::Back),
                    rotation_from_display_to_camera(display, sensor, CameraFacing::Back)
                );
            }
        }
    }

    proptest! {
        /// The negotiator never returns a size below the pixel floor unless
        /// no candidate clears it.
        #[test]
        fn prop_best_size_respects_pixel_floor(
            sizes in prop::collection::vec((160u32..4000, 120u32..3000), 1..12),
            screen_w in 320u32..4000,
            screen_h in 320u32..4000,
        ) {
            let supported: Vec<Size> =
                sizes.iter().map(|&(w, h)| Size::new(w, h)).collect();
            let screen = Size::new(screen_w, screen_h);
            let any_clears_floor = supported
                .iter()
                .any(|s| s.pixel_count() >= MIN_PREVIEW_PIXELS);
            if let Ok(best) = find_best_preview_size(&supported, None, screen) {
                if any_clears_floor {
                    prop_assert!(best.pixel_count() >= MIN_PREVIEW_PIXELS);
                }
            }
        }

        /// The negotiator is a function of its inputs: shuffling candidate
        /// order never changes the result.
        #[test]
        fn prop_best_size_order_independent(
            sizes in prop::collection::vec((160u32..4000, 120u32..3000), 1..8),
            screen_w in 320u32..4000,
            screen_h in 320u32..4000,
        ) {
            let supported: Vec<Size> =
                sizes.iter().map(|&(w, h)| Size::new(w, h)).collect();
            let mut reversed = supported.clone();
            reversed.reverse();
            let screen = Size::new(screen_w, screen_h);
            let a = find_best_preview_size(&supported, None, screen).ok();
            let b = find_best_preview_size(&reversed, None, screen).ok();
            prop_assert_eq!(a, b);
        }

        /// Framing rects are always centered and within bounds.
        #[test]
        fn prop_framing_rect_centered(
            screen_w in 240u32..4000,
            screen_h in 240u32..4000,
        ) {
            let screen = Size::new(screen_w, screen_h);
            let rect = framing_rect(screen);
            prop_assert_eq!((screen_w as i32 - rect.width as i32) / 2, rect.left);
            prop_assert_eq!((screen_h as i32 - rect.height as i32) / 2, rect.top);
            prop_assert!(rect.width >= MIN_FRAME_WIDTH.min(screen_w));
            prop_assert!(rect.width <= MAX_FRAME_WIDTH);
            prop_assert!(rect.height <= MAX_FRAME_HEIGHT);
        }

        /// The preview remap is scale-invariant: scaling screen and preview
        /// resolutions by the same integer factor scales the rect linearly.
        #[test]
        fn prop_preview_remap_linearity(
            screen_w in 320u32..1000,
            screen_h in 320u32..1000,
            preview_w in 320u32..1000,
            preview_h in 320u32..1000,
            factor in 2u32..4,
        ) {
            let screen = Size::new(screen_w, screen_h);
            let preview = Size::new(preview_w, preview_h);
            let rect = framing_rect(screen);
            let base = framing_rect_in_preview(rect, screen, preview);

            let scaled_screen = Size::new(screen_w * factor, screen_h * factor);
            let scaled_preview = Size::new(preview_w * factor, preview_h * factor);
            // Same screen rect against uniformly scaled resolutions: the
            // ratio is unchanged, so the mapped rect is unchanged too.
            let remapped = framing_rect_in_preview(rect, scaled_screen, scaled_preview);
            prop_assert_eq!(base, remapped);
        }

        /// Rotation reconciliation is periodic mod 360.
        #[test]
        fn prop_rotation_periodic(sensor in 0u32..4u32) {
            let sensor = sensor * 90;
            for display in [
                DisplayRotation::Deg0,
                DisplayRotation::Deg90,
                DisplayRotation::Deg180,
                DisplayRotation::Deg270,
            ] {
                for facing in [CameraFacing::Back, CameraFacing::Front] {
                    let a = needed_rotation(display, sensor, facing);
                    let b = needed_rotation(display, sensor + 360, facing);
                    prop_assert_eq!(a, b);
                    prop_assert!(a < 360);
                    prop_assert_eq!(a % 90, 0);
                }
            }
        }
    }
}
