pub mod adjust;
pub mod backend;
pub mod batch;
pub mod client;
pub mod config;
pub mod gallery;
pub mod image_prep;
pub mod outcome;
pub mod prompt;

pub use adjust::{apply_adjustments, AdjustmentHistory, Adjustments};
pub use backend::{DryrunBackend, GeminiBackend, GenerationBackend, TransportError};
pub use batch::{
    retry_all, retry_failed, BatchEvent, BatchItem, BatchReport, BatchStatus, TransitionError,
};
pub use client::{GenerationClient, GenerationRequest};
pub use config::StudioConfig;
pub use gallery::HistoryFeed;
pub use image_prep::{normalize, NormalizeError, NormalizeProfile, NormalizedImage, SourceImage};
pub use outcome::{ErrorKind, GeneratedImage, GenerationFailure, GenerationOutcome};
pub use prompt::{PortraitPrompt, PromptFactory, PromptSpec};

use studio_contracts::events::ProgressLog;
use studio_contracts::{AspectRatio, GenerationMode, HistoryEntry, JsonHistoryStore};

/// One single-image or face-swap generation. Re-running the same job is the
/// retry path; every run builds a fresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleJob {
    pub source: SourceImage,
    /// Face to transplant onto `source`. Switches the job to face swap.
    pub face: Option<SourceImage>,
    pub prompt: PromptSpec,
}

impl SingleJob {
    pub fn new(source: SourceImage, prompt: PromptSpec) -> Self {
        Self {
            source,
            face: None,
            prompt,
        }
    }

    pub fn face_swap(target: SourceImage, face: SourceImage, prompt: PromptSpec) -> Self {
        Self {
            source: target,
            face: Some(face),
            prompt,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        if self.face.is_some() {
            GenerationMode::FaceSwap
        } else {
            GenerationMode::Single
        }
    }
}

pub struct Studio {
    client: GenerationClient,
    history: HistoryFeed,
    progress_log: Option<ProgressLog>,
}

impl Studio {
    pub fn new(client: GenerationClient, history: HistoryFeed) -> Self {
        Self {
            client,
            history,
            progress_log: None,
        }
    }

    /// Studio backed by the JSON history directory named in `config`.
    pub fn open(config: &StudioConfig, backend: Box<dyn GenerationBackend>) -> Self {
        let store = JsonHistoryStore::new(config.history_dir.clone());
        Self::new(GenerationClient::new(backend), HistoryFeed::new(Box::new(store)))
    }

    pub fn with_progress_log(mut self, log: ProgressLog) -> Self {
        self.progress_log = Some(log);
        self
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub fn history(&self) -> &HistoryFeed {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryFeed {
        &mut self.history
    }

    pub fn generate(&mut self, job: &SingleJob) -> GenerationOutcome {
        let request = match self.build_request(job) {
            Ok(request) => request,
            Err(err) => return GenerationOutcome::failure(ErrorKind::FormatError, err.to_string()),
        };
        log::debug!(
            "{:?} generation via {} at {}",
            job.mode(),
            self.client.backend_name(),
            request.aspect_ratio()
        );

        let outcome = self.client.generate(&request);
        if let Some(image) = outcome.image() {
            self.history.record(HistoryEntry::new(
                image.bytes.clone(),
                image.mime_type.clone(),
                request.prompt(),
                request.aspect_ratio(),
                job.mode(),
                job.prompt.style,
            ));
        }
        outcome
    }

    /// Regenerates from a previous result with follow-up instructions. The
    /// refined image is returned only; nothing is recorded in history.
    pub fn refine(
        &mut self,
        previous: &GeneratedImage,
        text: &str,
        aspect_ratio: AspectRatio,
    ) -> GenerationOutcome {
        let source = SourceImage::new(previous.bytes.clone(), previous.mime_type.clone());
        let image = match normalize(&source, NormalizeProfile::SINGLE) {
            Ok(image) => image,
            Err(err) => return GenerationOutcome::failure(ErrorKind::FormatError, err.to_string()),
        };
        let request = GenerationRequest::single(image, text, aspect_ratio);
        log::debug!(
            "refinement via {} at {}",
            self.client.backend_name(),
            request.aspect_ratio()
        );
        self.client.generate(&request)
    }

    fn build_request(&self, job: &SingleJob) -> Result<GenerationRequest, NormalizeError> {
        let prompt = &job.prompt;
        match &job.face {
            None => {
                let image = normalize(&job.source, NormalizeProfile::SINGLE)?;
                Ok(GenerationRequest::single(image, prompt.text.clone(), prompt.aspect_ratio))
            }
            Some(face) => {
                let target = normalize(&job.source, NormalizeProfile::DUAL)?;
                let face = normalize(face, NormalizeProfile::DUAL)?;
                Ok(GenerationRequest::dual(
                    target,
                    face,
                    prompt.text.clone(),
                    prompt.aspect_ratio,
                ))
            }
        }
    }

    pub fn run_batch(
        &mut self,
        items: &mut [BatchItem],
        prompt_factory: &dyn PromptFactory,
        progress: &mut dyn FnMut(&BatchEvent),
    ) -> BatchReport {
        batch::run_batch(
            &self.client,
            &mut self.history,
            self.progress_log.as_ref(),
            items,
            prompt_factory,
            progress,
        )
    }
}
