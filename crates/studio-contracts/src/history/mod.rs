mod store;

pub use store::JsonHistoryStore;

use chrono::Utc;
use uuid::Uuid;

use crate::aspect::AspectRatio;
use crate::style::{GenerationMode, StyleSettings};

/// One persisted generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub mode: GenerationMode,
    pub style: Option<StyleSettings>,
}

impl HistoryEntry {
    /// New entry stamped with a fresh id and the current time.
    pub fn new(
        image_bytes: Vec<u8>,
        mime_type: impl Into<String>,
        prompt: impl Into<String>,
        aspect_ratio: AspectRatio,
        mode: GenerationMode,
        style: Option<StyleSettings>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image_bytes,
            mime_type: mime_type.into(),
            prompt: prompt.into(),
            aspect_ratio,
            timestamp: Utc::now().timestamp_millis(),
            mode,
            style,
        }
    }
}

/// Durable log of generation results.
///
/// `list` returns newest first. `delete` of an unknown id is a no-op.
pub trait HistoryStore {
    fn append(&mut self, entry: &HistoryEntry) -> anyhow::Result<()>;
    fn list(&mut self, offset: usize, limit: usize) -> anyhow::Result<Vec<HistoryEntry>>;
    fn delete(&mut self, id: &str) -> anyhow::Result<()>;
    fn count(&mut self) -> anyhow::Result<usize>;
}
