use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::image_prep::{decode_upright, NormalizeError};
use crate::outcome::GeneratedImage;

pub const ADJUSTED_MIME: &str = "image/png";
pub const MAX_UNDO_STATES: usize = 20;

/// Post-generation tonal adjustments, in CSS filter units: percentages for
/// brightness, contrast, saturation and sepia, pixels for blur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    pub brightness: u16,
    pub contrast: u16,
    pub saturation: u16,
    pub sepia: u8,
    pub blur: u8,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            brightness: 100,
            contrast: 100,
            saturation: 100,
            sepia: 0,
            blur: 0,
        }
    }
}

impl Adjustments {
    /// Clamps every field into the editor's slider range.
    pub fn clamped(self) -> Self {
        Self {
            brightness: self.brightness.min(200),
            contrast: self.contrast.min(200),
            saturation: self.saturation.min(200),
            sepia: self.sepia.min(100),
            blur: self.blur.min(10),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Applies `adjustments` in filter order (brightness, contrast, saturate,
/// sepia, blur) and re-encodes the result as PNG at full size.
pub fn apply_adjustments(
    image: &GeneratedImage,
    adjustments: &Adjustments,
) -> Result<GeneratedImage, NormalizeError> {
    let adjustments = adjustments.clamped();
    let mut pixels = decode_upright(&image.bytes)?.to_rgba8();

    let brightness = f32::from(adjustments.brightness) / 100.0;
    let contrast = f32::from(adjustments.contrast) / 100.0;
    // Saturate and sepia at their identity values are skipped.
    let saturate = (adjustments.saturation != 100)
        .then(|| saturate_matrix(f32::from(adjustments.saturation) / 100.0));
    let sepia = (adjustments.sepia > 0).then(|| sepia_matrix(f32::from(adjustments.sepia) / 100.0));
    for pixel in pixels.pixels_mut() {
        let mut rgb = [
            f32::from(pixel[0]) / 255.0,
            f32::from(pixel[1]) / 255.0,
            f32::from(pixel[2]) / 255.0,
        ];
        rgb = rgb.map(|channel| (channel * brightness).clamp(0.0, 1.0));
        rgb = rgb.map(|channel| ((channel - 0.5) * contrast + 0.5).clamp(0.0, 1.0));
        if let Some(matrix) = saturate {
            rgb = apply_matrix(rgb, matrix);
        }
        if let Some(matrix) = sepia {
            rgb = apply_matrix(rgb, matrix);
        }
        *pixel = Rgba([
            to_channel(rgb[0]),
            to_channel(rgb[1]),
            to_channel(rgb[2]),
            pixel[3],
        ]);
    }

    let adjusted: RgbaImage = if adjustments.blur > 0 {
        image::imageops::blur(&pixels, f32::from(adjustments.blur))
    } else {
        pixels
    };

    let mut bytes = Vec::new();
    adjusted
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| NormalizeError::Encode(err.to_string()))?;
    log::debug!(
        "applied {adjustments:?} to {}x{} image ({} bytes)",
        adjusted.width(),
        adjusted.height(),
        bytes.len()
    );
    Ok(GeneratedImage {
        bytes,
        mime_type: ADJUSTED_MIME.to_string(),
    })
}

type ColorMatrix = [[f32; 3]; 3];

fn saturate_matrix(s: f32) -> ColorMatrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn sepia_matrix(amount: f32) -> ColorMatrix {
    let keep = 1.0 - amount;
    [
        [0.393 + 0.607 * keep, 0.769 - 0.769 * keep, 0.189 - 0.189 * keep],
        [0.349 - 0.349 * keep, 0.686 + 0.314 * keep, 0.168 - 0.168 * keep],
        [0.272 - 0.272 * keep, 0.534 - 0.534 * keep, 0.131 + 0.869 * keep],
    ]
}

fn apply_matrix(rgb: [f32; 3], matrix: ColorMatrix) -> [f32; 3] {
    matrix.map(|row| (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]).clamp(0.0, 1.0))
}

fn to_channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Linear undo/redo over adjustment states. Holds at most
/// [`MAX_UNDO_STATES`] states; the oldest are dropped first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentHistory {
    states: Vec<Adjustments>,
    index: usize,
}

impl Default for AdjustmentHistory {
    fn default() -> Self {
        Self {
            states: vec![Adjustments::default()],
            index: 0,
        }
    }
}

impl AdjustmentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Adjustments {
        self.states[self.index]
    }

    /// Commits a new state. Anything that could have been redone is discarded.
    pub fn push(&mut self, adjustments: Adjustments) {
        self.states.truncate(self.index + 1);
        self.states.push(adjustments.clamped());
        if self.states.len() > MAX_UNDO_STATES {
            let excess = self.states.len() - MAX_UNDO_STATES;
            self.states.drain(..excess);
        }
        self.index = self.states.len() - 1;
    }

    pub fn undo(&mut self) -> Option<Adjustments> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<Adjustments> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        Some(self.current())
    }

    /// Back to defaults, as an undoable step.
    pub fn reset(&mut self) {
        self.push(Adjustments::default());
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
