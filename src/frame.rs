use crate::geometry::Rect;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[cfg(feature = "thumbnail")]
use image::codecs::jpeg::JpegEncoder;

/// Thumbnails are rendered at half the crop resolution.
const THUMBNAIL_SCALE_FACTOR: u32 = 2;

/// One captured preview frame: a planar YUV buffer of which only the
/// leading Y (luminance) plane is consumed, plus dimensions.
///
/// Produced once per outstanding single-shot request, handed to the decode
/// worker, then dropped.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Raw buffer; the first `width * height` bytes are the Y plane.
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl PreviewFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Whether the buffer holds at least a full luminance plane.
    pub fn validate_size(&self) -> bool {
        self.data.len() as u64 >= self.width as u64 * self.height as u64
    }
}

/// Grayscale view of the framing-rect region of a preview frame.
#[derive(Debug, Clone)]
pub struct LuminanceSource {
    data: Arc<Vec<u8>>,
    data_width: u32,
    crop: Rect,
}

impl LuminanceSource {
    /// Crop view over `frame`. Returns `None` when the rect is empty, has
    /// negative origin, or falls outside the frame's luminance plane.
    pub fn new(frame: &PreviewFrame, crop: Rect) -> Option<Self> {
        if crop.is_empty() || crop.left < 0 || crop.top < 0 {
            return None;
        }
        if crop.right() as u32 > frame.width || crop.bottom() as u32 > frame.height {
            return None;
        }
        if !frame.validate_size() {
            return None;
        }
        Some(Self {
            data: Arc::clone(&frame.data),
            data_width: frame.width,
            crop,
        })
    }

    pub fn width(&self) -> u32 {
        self.crop.width
    }

    pub fn height(&self) -> u32 {
        self.crop.height
    }

    /// Luminance value at crop-relative coordinates.
    pub fn luminance_at(&self, x: u32, y: u32) -> u8 {
        let abs_x = self.crop.left as u32 + x.min(self.crop.width - 1);
        let abs_y = self.crop.top as u32 + y.min(self.crop.height - 1);
        self.data[(abs_y * self.data_width + abs_x) as usize]
    }

    /// One crop-relative row of luminance data.
    pub fn row(&self, y: u32) -> &[u8] {
        let abs_y = self.crop.top as u32 + y.min(self.crop.height - 1);
        let start = (abs_y * self.data_width + self.crop.left as u32) as usize;
        &self.data[start..start + self.crop.width as usize]
    }

    /// The cropped region as a contiguous buffer.
    pub fn to_matrix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.crop.width * self.crop.height) as usize);
        for y in 0..self.crop.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Downscaled grayscale rendition of the crop region, for result
    /// display. Pairs with [`Self::thumbnail_scale_factor`].
    pub fn render_thumbnail(&self) -> Thumbnail {
        let width = self.crop.width / THUMBNAIL_SCALE_FACTOR;
        let height = self.crop.height / THUMBNAIL_SCALE_FACTOR;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            let row = self.row(y * THUMBNAIL_SCALE_FACTOR);
            for x in 0..width {
                pixels.push(row[(x * THUMBNAIL_SCALE_FACTOR) as usize]);
            }
        }
        Thumbnail {
            pixels,
            width,
            height,
        }
    }

    /// Ratio of thumbnail width to crop width, for mapping finder points
    /// onto the thumbnail.
    pub fn thumbnail_scale_factor(&self) -> f32 {
        (self.crop.width / THUMBNAIL_SCALE_FACTOR) as f32 / self.crop.width as f32
    }
}

/// Grayscale thumbnail of a decoded region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(feature = "thumbnail")]
impl Thumbnail {
    /// JPEG-encode the thumbnail for handoff to result display.
    pub fn to_jpeg(&self) -> crate::error::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, 50);
        encoder
            .encode(&self.pixels, self.width, self.height, image::ColorType::L8)
            .map_err(|e| crate::error::ScancamError::component("thumbnail", e.to_string().as_str()))?;
        Ok(buf)
    }
}

/// Build the luminance view the decoder consumes.
///
/// `None` means the frame cannot be decoded (no framing geometry yet, or a
/// rect that does not fit the buffer) and the attempt short-circuits to a
/// failure outcome without invoking the decoder.
pub fn build_luminance_source(frame: &PreviewFrame, crop: Option<Rect>) -> Option<LuminanceSource> {
    let rect = match crop {
        Some(rect) => rect,
        None => {
            debug!("no framing rect available; dropping frame");
            return None;
        }
    };
    LuminanceSource::new(frame, rect)
}
