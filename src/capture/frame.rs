// frame.rs - Reads a captured photo from disk, downscales, JPEG-encodes and
// base64-encodes it into a data-URI payload ready for a provider request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_WIDTH: u32 = 1280;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ── Payload ─────────────────────────────────────────────────────────────
/// An encoded image, owned by exactly one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Base64-encoded JPEG image data
    pub data: String,
    /// Width of the (possibly downscaled) image
    pub width: u32,
    /// Height of the (possibly downscaled) image
    pub height: u32,
    /// Local file the payload was read from.
    pub source: PathBuf,
}

impl ImagePayload {
    pub const MEDIA_TYPE: &'static str = "image/jpeg";

    /// `data:image/jpeg;base64,...` form used by both providers.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MEDIA_TYPE, self.data)
    }
}

/// Errors that make a frame unusable. Never retried: a corrupt local read
/// cannot succeed on a second attempt.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image {0} is empty")]
    Empty(PathBuf),
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

// ── FrameEncoder ────────────────────────────────────────────────────────
/// Stateless encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    /// Maximum width in pixels; images wider than this are downscaled.
    max_width: u32,
    /// JPEG compression quality (1–100).
    jpeg_quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WIDTH, DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    pub fn new(max_width: u32, jpeg_quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Read and encode the image at `path`.
    pub fn encode(&self, path: &Path) -> Result<ImagePayload, EncodeError> {
        let bytes = std::fs::read(path).map_err(|source| EncodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.encode_bytes(&bytes, path)
    }

    /// Encode already-loaded image bytes. `source` is recorded on the payload.
    pub fn encode_bytes(&self, bytes: &[u8], source: &Path) -> Result<ImagePayload, EncodeError> {
        if bytes.is_empty() {
            return Err(EncodeError::Empty(source.to_path_buf()));
        }

        let img = image::load_from_memory(bytes).map_err(EncodeError::Decode)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(EncodeError::Empty(source.to_path_buf()));
        }

        let img = downscale(img, self.max_width);
        let (w, h) = img.dimensions();

        let mut jpeg_buf: Vec<u8> = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg_buf, self.jpeg_quality)
            .encode(img.to_rgb8().as_raw(), w, h, image::ExtendedColorType::Rgb8)
            .map_err(EncodeError::Encode)?;

        log::debug!(
            "Encoded frame {} ({}x{}, {} bytes)",
            source.display(),
            w,
            h,
            jpeg_buf.len()
        );

        Ok(ImagePayload {
            data: BASE64.encode(&jpeg_buf),
            width: w,
            height: h,
            source: source.to_path_buf(),
        })
    }
}

/// Downscale if wider than `max_width`, preserving aspect ratio.
fn downscale(img: DynamicImage, max_width: u32) -> DynamicImage {
    if img.width() <= max_width {
        return img;
    }
    let ratio = max_width as f64 / img.width() as f64;
    let new_h = ((img.height() as f64 * ratio).round() as u32).max(1);
    img.resize_exact(max_width, new_h, imageops::FilterType::Triangle)
}
