use std::fmt;

use serde::Serialize;
use studio_contracts::events::ProgressLog;
use studio_contracts::{GenerationMode, HistoryEntry};
use thiserror::Error;
use uuid::Uuid;

use crate::client::{GenerationClient, GenerationRequest};
use crate::gallery::HistoryFeed;
use crate::image_prep::{normalize, NormalizeProfile, SourceImage};
use crate::outcome::{ErrorKind, GeneratedImage, GenerationFailure, GenerationOutcome};
use crate::prompt::PromptFactory;

pub const MAX_BATCH_ITEMS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch item {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: BatchStatus,
    pub to: BatchStatus,
}

/// One source image inside a batch run.
///
/// Status only moves forward: `pending -> processing -> done | error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    id: String,
    source: SourceImage,
    status: BatchStatus,
    result: Option<GeneratedImage>,
    failure: Option<GenerationFailure>,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, source: SourceImage) -> Self {
        Self {
            id: id.into(),
            source,
            status: BatchStatus::Pending,
            result: None,
            failure: None,
        }
    }

    /// Builds a pending batch under a fresh run id. Sources past
    /// [`MAX_BATCH_ITEMS`] are dropped.
    pub fn from_sources(sources: impl IntoIterator<Item = SourceImage>) -> Vec<BatchItem> {
        let run_id = new_run_id();
        let mut items = Vec::new();
        let mut dropped = 0usize;
        for (index, source) in sources.into_iter().enumerate() {
            if index >= MAX_BATCH_ITEMS {
                dropped += 1;
                continue;
            }
            items.push(BatchItem::new(format!("batch-{run_id}-{index}"), source));
        }
        if dropped > 0 {
            log::warn!("batch limited to {MAX_BATCH_ITEMS} images; dropped {dropped}");
        }
        items
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&GenerationFailure> {
        self.failure.as_ref()
    }

    pub fn begin(&mut self) -> Result<(), TransitionError> {
        if self.status != BatchStatus::Pending {
            return Err(self.transition_error(BatchStatus::Processing));
        }
        self.status = BatchStatus::Processing;
        Ok(())
    }

    pub fn complete(&mut self, outcome: GenerationOutcome) -> Result<(), TransitionError> {
        let next = if outcome.is_success() {
            BatchStatus::Done
        } else {
            BatchStatus::Error
        };
        if self.status != BatchStatus::Processing {
            return Err(self.transition_error(next));
        }
        match outcome {
            GenerationOutcome::Success(image) => self.result = Some(image),
            GenerationOutcome::Failure(failure) => self.failure = Some(failure),
        }
        self.status = next;
        Ok(())
    }

    fn transition_error(&self, to: BatchStatus) -> TransitionError {
        TransitionError {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}

/// New pending batch from the sources of the items that failed.
pub fn retry_failed(items: &[BatchItem]) -> Vec<BatchItem> {
    BatchItem::from_sources(
        items
            .iter()
            .filter(|item| item.status == BatchStatus::Error)
            .map(|item| item.source.clone()),
    )
}

/// New pending batch from every source, whatever its previous status.
pub fn retry_all(items: &[BatchItem]) -> Vec<BatchItem> {
    BatchItem::from_sources(items.iter().map(|item| item.source.clone()))
}

fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    ItemStarted {
        item_id: String,
        current: usize,
        total: usize,
    },
    ItemFinished {
        item_id: String,
        current: usize,
        total: usize,
        status: BatchStatus,
        error_kind: Option<ErrorKind>,
    },
    Completed {
        total: usize,
        succeeded: usize,
        failed: usize,
        preview_item_id: Option<String>,
    },
}

/// Summary of one run. Counts cover items processed by this run only.
///
/// `skipped` counts items that were already `done` or `error`. An item found
/// still `processing` (left over from an interrupted run) is finished as an
/// `error` and counted in `failed`, so every item ends the run terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub preview_item_id: Option<String>,
}

/// Drives `items` through the client one at a time, in order.
///
/// An item failure never stops the run. `Completed` is emitted exactly once,
/// after every item has been visited.
pub fn run_batch(
    client: &GenerationClient,
    feed: &mut HistoryFeed,
    progress_log: Option<&ProgressLog>,
    items: &mut [BatchItem],
    prompt_factory: &dyn PromptFactory,
    progress: &mut dyn FnMut(&BatchEvent),
) -> BatchReport {
    let spec = prompt_factory.prompt_spec();
    let total = items.len();
    let mut report = BatchReport {
        total,
        ..BatchReport::default()
    };
    let mut emit = |event: BatchEvent| {
        progress(&event);
        if let Some(sink) = progress_log {
            if let Err(err) = sink.emit(&event) {
                log::warn!("progress log write failed: {err:#}");
            }
        }
    };

    log::info!(
        "batch started: {total} item(s) via {}, aspect {}",
        client.backend_name(),
        spec.aspect_ratio
    );

    for (index, item) in items.iter_mut().enumerate() {
        let current = index + 1;
        if let Err(err) = item.begin() {
            if err.from != BatchStatus::Processing {
                log::warn!("skipping: {err}");
                report.skipped += 1;
                continue;
            }
            log::warn!("batch item {} was left processing; marking it failed", item.id);
            let interrupted = GenerationOutcome::failure(ErrorKind::Unknown, err.to_string());
            if let Err(err) = item.complete(interrupted) {
                log::warn!("batch item state rejected: {err}");
            }
            report.failed += 1;
            emit(BatchEvent::ItemFinished {
                item_id: item.id.clone(),
                current,
                total,
                status: item.status,
                error_kind: item.failure.as_ref().map(|failure| failure.kind),
            });
            continue;
        }
        emit(BatchEvent::ItemStarted {
            item_id: item.id.clone(),
            current,
            total,
        });

        let (outcome, aspect_ratio) = match normalize(&item.source, NormalizeProfile::SINGLE) {
            Ok(image) => {
                let request =
                    GenerationRequest::single(image, spec.text.clone(), spec.aspect_ratio);
                let aspect_ratio = request.aspect_ratio();
                (client.generate(&request), aspect_ratio)
            }
            Err(err) => (
                GenerationOutcome::failure(ErrorKind::FormatError, err.to_string()),
                spec.aspect_ratio,
            ),
        };
        let error_kind = outcome.error().map(|failure| failure.kind);

        if let Err(err) = item.complete(outcome) {
            log::warn!("batch item state rejected: {err}");
        }
        match (item.status, item.result.as_ref()) {
            (BatchStatus::Done, Some(image)) => {
                report.succeeded += 1;
                if report.preview_item_id.is_none() {
                    report.preview_item_id = Some(item.id.clone());
                }
                feed.record(HistoryEntry::new(
                    image.bytes.clone(),
                    image.mime_type.clone(),
                    spec.text.clone(),
                    aspect_ratio,
                    GenerationMode::Batch,
                    spec.style,
                ));
            }
            _ => {
                report.failed += 1;
                if let Some(failure) = item.failure.as_ref() {
                    log::debug!("batch item {} failed: {failure}", item.id);
                }
            }
        }

        emit(BatchEvent::ItemFinished {
            item_id: item.id.clone(),
            current,
            total,
            status: item.status,
            error_kind,
        });
    }

    emit(BatchEvent::Completed {
        total,
        succeeded: report.succeeded,
        failed: report.failed,
        preview_item_id: report.preview_item_id.clone(),
    });
    log::info!(
        "batch finished: {} succeeded, {} failed, {} skipped",
        report.succeeded,
        report.failed,
        report.skipped
    );
    report
}
