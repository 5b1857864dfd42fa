use studio_contracts::AspectRatio;

use crate::backend::{BackendResponse, ContentPart, GenerationBackend};
use crate::image_prep::NormalizedImage;
use crate::outcome::{ErrorKind, GenerationOutcome};

const SAFETY_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];
const REFUSAL_FINISH_REASONS: [&str; 2] = ["OTHER", "IMAGE_OTHER"];

/// One call's worth of input. The aspect ratio is always concrete: `Auto` is
/// resolved from the first image's original size at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    images: Vec<NormalizedImage>,
    prompt: String,
    aspect_ratio: AspectRatio,
}

impl GenerationRequest {
    pub fn single(
        image: NormalizedImage,
        prompt: impl Into<String>,
        requested: AspectRatio,
    ) -> Self {
        Self::build(vec![image], prompt.into(), requested)
    }

    /// Target first, then the face to transplant.
    pub fn dual(
        target: NormalizedImage,
        face: NormalizedImage,
        prompt: impl Into<String>,
        requested: AspectRatio,
    ) -> Self {
        Self::build(vec![target, face], prompt.into(), requested)
    }

    fn build(images: Vec<NormalizedImage>, prompt: String, requested: AspectRatio) -> Self {
        let primary = &images[0];
        let aspect_ratio = requested.resolve(primary.source_width, primary.source_height);
        Self {
            images,
            prompt,
            aspect_ratio,
        }
    }

    pub fn images(&self) -> &[NormalizedImage] {
        &self.images
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }
}

/// Turns backend responses and transport errors into a [`GenerationOutcome`].
pub struct GenerationClient {
    backend: Box<dyn GenerationBackend>,
}

impl GenerationClient {
    pub fn new(backend: Box<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Exactly one backend call; never retries.
    pub fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        match self.backend.send(request) {
            Ok(response) => interpret_response(response),
            Err(err) => {
                let kind = err.kind();
                log::warn!("{} transport failure ({kind}): {err}", self.backend.name());
                GenerationOutcome::failure(kind, err.to_string())
            }
        }
    }
}

pub fn interpret_response(response: BackendResponse) -> GenerationOutcome {
    if let Some(reason) = response.block_reason {
        return GenerationOutcome::failure(
            ErrorKind::SafetyBlocked,
            format!("prompt blocked: {reason}"),
        );
    }
    let Some(candidate) = response.candidate else {
        return GenerationOutcome::failure(
            ErrorKind::ServerError,
            "no candidates returned; the service may be temporarily unavailable",
        );
    };

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    if SAFETY_FINISH_REASONS.contains(&finish_reason.as_str()) {
        return GenerationOutcome::failure(
            ErrorKind::SafetyBlocked,
            format!("finish reason {finish_reason}"),
        );
    }

    let mut refusal_text: Option<String> = None;
    for part in candidate.parts {
        match part {
            ContentPart::Image(image) => return GenerationOutcome::Success(image),
            ContentPart::Text(text) => {
                if refusal_text.is_none() && !text.trim().is_empty() {
                    refusal_text = Some(text.trim().to_string());
                }
            }
        }
    }

    if let Some(text) = refusal_text {
        return GenerationOutcome::failure(ErrorKind::Refusal, text);
    }
    if REFUSAL_FINISH_REASONS.contains(&finish_reason.as_str()) {
        return GenerationOutcome::failure(
            ErrorKind::Refusal,
            format!("model declined the request (finish reason {finish_reason})"),
        );
    }
    let reason = if finish_reason.is_empty() {
        "unknown".to_string()
    } else {
        finish_reason
    };
    GenerationOutcome::failure(
        ErrorKind::Unknown,
        format!("no image data in response (finish reason {reason})"),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use studio_contracts::AspectRatio;

    use super::{interpret_response, GenerationClient, GenerationRequest};
    use crate::backend::{
        BackendResponse, Candidate, ContentPart, GenerationBackend, TransportError,
    };
    use crate::image_prep::NormalizedImage;
    use crate::outcome::{ErrorKind, GeneratedImage, GenerationOutcome};

    pub(crate) fn fake_normalized(source_width: u32, source_height: u32) -> NormalizedImage {
        NormalizedImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".to_string(),
            width: source_width,
            height: source_height,
            source_width,
            source_height,
        }
    }

    pub(crate) fn image_response(bytes: &[u8]) -> BackendResponse {
        BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: Some("STOP".to_string()),
                parts: vec![ContentPart::Image(GeneratedImage {
                    bytes: bytes.to_vec(),
                    mime_type: "image/png".to_string(),
                })],
            }),
        }
    }

    /// Replays queued results and records every request it sees.
    pub(crate) struct ScriptedBackend {
        pub(crate) replies: RefCell<VecDeque<Result<BackendResponse, TransportError>>>,
        pub(crate) seen: RefCell<Vec<GenerationRequest>>,
        pub(crate) calls: Cell<usize>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<BackendResponse, TransportError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
                calls: Cell::new(0),
            }
        }
    }

    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn send(&self, request: &GenerationRequest) -> Result<BackendResponse, TransportError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    impl GenerationBackend for std::rc::Rc<ScriptedBackend> {
        fn name(&self) -> &str {
            "scripted"
        }

        fn send(&self, request: &GenerationRequest) -> Result<BackendResponse, TransportError> {
            self.as_ref().send(request)
        }
    }

    fn kind_of(outcome: &GenerationOutcome) -> Option<ErrorKind> {
        outcome.error().map(|failure| failure.kind)
    }

    #[test]
    fn auto_ratio_resolves_from_source_dimensions() {
        let normalized = fake_normalized(1200, 1600);
        let request = GenerationRequest::single(normalized, "portrait", AspectRatio::Auto);
        assert_eq!(request.aspect_ratio(), AspectRatio::Portrait);
        assert_eq!(request.aspect_ratio().as_str(), "3:4");
        assert_eq!(request.prompt(), "portrait");
    }

    #[test]
    fn explicit_ratio_is_kept() {
        let normalized = fake_normalized(1200, 1600);
        let request = GenerationRequest::single(normalized, "portrait", AspectRatio::Wide);
        assert_eq!(request.aspect_ratio(), AspectRatio::Wide);
    }

    #[test]
    fn first_image_part_wins() {
        let response = BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: None,
                parts: vec![
                    ContentPart::Text("caption".to_string()),
                    ContentPart::Image(GeneratedImage {
                        bytes: vec![1],
                        mime_type: "image/png".to_string(),
                    }),
                    ContentPart::Image(GeneratedImage {
                        bytes: vec![2],
                        mime_type: "image/png".to_string(),
                    }),
                ],
            }),
        };
        let outcome = interpret_response(response);
        assert_eq!(outcome.image().map(|image| image.bytes.clone()), Some(vec![1]));
    }

    #[test]
    fn missing_candidate_is_a_server_error() {
        let outcome = interpret_response(BackendResponse::default());
        assert_eq!(kind_of(&outcome), Some(ErrorKind::ServerError));
    }

    #[test]
    fn safety_signals_block() {
        let prompt_block = BackendResponse {
            block_reason: Some("OTHER".to_string()),
            candidate: None,
        };
        assert_eq!(kind_of(&interpret_response(prompt_block)), Some(ErrorKind::SafetyBlocked));

        let finish_block = BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: Some("IMAGE_SAFETY".to_string()),
                parts: Vec::new(),
            }),
        };
        assert_eq!(kind_of(&interpret_response(finish_block)), Some(ErrorKind::SafetyBlocked));
    }

    #[test]
    fn text_only_answer_is_a_refusal_with_text() {
        let response = BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: Some("STOP".to_string()),
                parts: vec![ContentPart::Text("  I cannot edit photos of minors. ".to_string())],
            }),
        };
        let outcome = interpret_response(response);
        let failure = outcome.error().cloned().unwrap_or_else(|| panic!("expected failure"));
        assert_eq!(failure.kind, ErrorKind::Refusal);
        assert_eq!(failure.detail, "I cannot edit photos of minors.");
    }

    #[test]
    fn other_finish_without_parts_is_a_refusal() {
        let response = BackendResponse {
            block_reason: None,
            candidate: Some(Candidate {
                finish_reason: Some("IMAGE_OTHER".to_string()),
                parts: Vec::new(),
            }),
        };
        assert_eq!(kind_of(&interpret_response(response)), Some(ErrorKind::Refusal));
    }

    #[test]
    fn empty_candidate_is_unknown() {
        let response = BackendResponse {
            block_reason: None,
            candidate: Some(Candidate::default()),
        };
        assert_eq!(kind_of(&interpret_response(response)), Some(ErrorKind::Unknown));
    }

    #[test]
    fn transport_errors_are_classified_and_called_once() {
        let backend = std::rc::Rc::new(ScriptedBackend::new(vec![Err(TransportError::Status {
            code: 429,
            body: "quota".to_string(),
        })]));
        let client = GenerationClient::new(Box::new(backend.clone()));
        let request = GenerationRequest::single(fake_normalized(10, 10), "x", AspectRatio::Square);

        let outcome = client.generate(&request);
        assert_eq!(kind_of(&outcome), Some(ErrorKind::RateLimited));
        assert_eq!(backend.calls.get(), 1);
    }

    #[test]
    fn success_passes_image_through() {
        let backend = ScriptedBackend::new(vec![Ok(image_response(&[7, 7]))]);
        let client = GenerationClient::new(Box::new(backend));
        let request = GenerationRequest::single(fake_normalized(10, 10), "x", AspectRatio::Square);
        let outcome = client.generate(&request);
        assert_eq!(outcome.image().map(|image| image.bytes.clone()), Some(vec![7, 7]));
    }
}
