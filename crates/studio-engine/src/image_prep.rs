use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
use thiserror::Error;

pub const NORMALIZED_MIME: &str = "image/jpeg";

/// Raw user-provided image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Self::new(bytes, guess_image_mime(path)))
    }

    /// Parses `data:<mime>;base64,<payload>`. A bare base64 string is
    /// accepted as JPEG.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (mime_type, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let Some((header, payload)) = rest.split_once(',') else {
                    bail!("data URL has no payload");
                };
                let Some(mime) = header.strip_suffix(";base64") else {
                    bail!("only base64 data URLs are supported");
                };
                let mime = if mime.is_empty() { NORMALIZED_MIME } else { mime };
                (mime.to_string(), payload)
            }
            None => (NORMALIZED_MIME.to_string(), trimmed),
        };
        let bytes = BASE64
            .decode(payload.as_bytes())
            .context("data URL base64 decode failed")?;
        Ok(Self::new(bytes, mime_type))
    }
}

/// Bounded JPEG ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeProfile {
    pub max_edge: u32,
    pub quality: u8,
}

impl NormalizeProfile {
    /// One image per request.
    pub const SINGLE: NormalizeProfile = NormalizeProfile {
        max_edge: 1536,
        quality: 90,
    };
    /// Two images share one request (face swap).
    pub const DUAL: NormalizeProfile = NormalizeProfile {
        max_edge: 1280,
        quality: 85,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unsupported or corrupt image: {0}")]
    Format(String),
    #[error("image re-encode failed: {0}")]
    Encode(String),
}

pub fn normalize(
    source: &SourceImage,
    profile: NormalizeProfile,
) -> Result<NormalizedImage, NormalizeError> {
    let decoded = decode_upright(&source.bytes)?;
    let (source_width, source_height) = (decoded.width(), decoded.height());
    let (width, height) = bounded_dimensions(source_width, source_height, profile.max_edge);

    let flattened = flatten_onto_white(&decoded);
    let resized = if (width, height) == (source_width, source_height) {
        flattened
    } else {
        image::imageops::resize(&flattened, width, height, FilterType::Triangle)
    };

    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, profile.quality.clamp(1, 100));
        encoder
            .encode_image(&resized)
            .map_err(|err| NormalizeError::Encode(err.to_string()))?;
    }

    log::debug!(
        "normalized {}x{} {} -> {}x{} jpeg ({} bytes)",
        source_width,
        source_height,
        source.mime_type,
        width,
        height,
        bytes.len()
    );

    Ok(NormalizedImage {
        bytes,
        mime_type: NORMALIZED_MIME.to_string(),
        width,
        height,
        source_width,
        source_height,
    })
}

/// Decodes and applies the EXIF orientation, so dimensions match what a
/// viewer would display.
pub(crate) fn decode_upright(bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| NormalizeError::Format(err.to_string()))?
        .into_decoder()
        .map_err(|err| NormalizeError::Format(err.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut decoded = DynamicImage::from_decoder(decoder)
        .map_err(|err| NormalizeError::Format(err.to_string()))?;
    if orientation != Orientation::NoTransforms {
        log::debug!("applying exif orientation {orientation:?}");
        decoded.apply_orientation(orientation);
    }
    Ok(decoded)
}

/// Scales so the longer edge equals `max_edge`; smaller images are unchanged.
pub fn bounded_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let max_edge = max_edge.max(1);
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    let scale = |edge: u32, longer: u32| -> u32 {
        ((edge as f64 * max_edge as f64) / longer as f64)
            .round()
            .clamp(1.0, max_edge as f64) as u32
    };
    if width > height {
        (max_edge, scale(height, width))
    } else {
        (scale(width, height), max_edge)
    }
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

pub fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}
