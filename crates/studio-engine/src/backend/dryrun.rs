use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{BackendResponse, Candidate, ContentPart, GenerationBackend, TransportError};
use crate::client::GenerationRequest;
use crate::outcome::GeneratedImage;

/// Offline backend that answers every request with a solid PNG whose colour
/// is derived from the prompt. Output size follows the requested ratio.
#[derive(Debug, Clone)]
pub struct DryrunBackend {
    long_edge: u32,
}

impl DryrunBackend {
    pub fn new(long_edge: u32) -> Self {
        Self {
            long_edge: long_edge.max(1),
        }
    }
}

impl Default for DryrunBackend {
    fn default() -> Self {
        Self::new(512)
    }
}

impl GenerationBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn send(&self, request: &GenerationRequest) -> Result<BackendResponse, TransportError> {
        let (width, height) = request.aspect_ratio().dimensions(self.long_edge);
        let (r, g, b) = color_from_prompt(request.prompt(), request.images().len() as u64);
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }

        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| TransportError::Other(format!("dryrun encode failed: {err}")))?;

        Ok(BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: Some("STOP".to_string()),
                parts: vec![ContentPart::Image(GeneratedImage {
                    bytes,
                    mime_type: "image/png".to_string(),
                })],
            }),
        })
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use studio_contracts::AspectRatio;

    use super::{color_from_prompt, DryrunBackend};
    use crate::backend::{ContentPart, GenerationBackend};
    use crate::client::tests::fake_normalized;
    use crate::client::GenerationRequest;

    #[test]
    fn dryrun_image_matches_requested_ratio() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(320);
        let request =
            GenerationRequest::single(fake_normalized(900, 1600), "noir", AspectRatio::Auto);
        let response = backend.send(&request)?;
        let candidate = response.candidate.unwrap_or_default();
        let Some(ContentPart::Image(image)) = candidate.parts.first() else {
            panic!("dryrun should return an image part");
        };
        let decoded = image::load_from_memory(&image.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (180, 320));
        Ok(())
    }

    #[test]
    fn colour_is_stable_per_prompt() {
        assert_eq!(color_from_prompt("a", 1), color_from_prompt("a", 1));
        assert_ne!(color_from_prompt("a", 1), color_from_prompt("b", 1));
    }
}
