mod dryrun;
mod gemini;

pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;

use std::error::Error as StdError;

use thiserror::Error;

use crate::client::GenerationRequest;
use crate::outcome::{ErrorKind, GeneratedImage};

/// One remote image service.
///
/// `send` performs exactly one call. Retries are a caller decision.
pub trait GenerationBackend {
    fn name(&self) -> &str;
    fn send(&self, request: &GenerationRequest) -> Result<BackendResponse, TransportError>;
}

/// Service response reduced to what outcome interpretation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendResponse {
    /// Prompt-level block reported before any candidate was produced.
    pub block_reason: Option<String>,
    /// First candidate only; later candidates are never used.
    pub candidate: Option<Candidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub finish_reason: Option<String>,
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Image(GeneratedImage),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = error_chain_text(err, 512);
        if err.is_timeout() {
            return Self::Timeout(message);
        }
        if err.is_connect() {
            return Self::Connect(message);
        }
        if err.is_decode() || err.is_body() {
            return Self::InvalidPayload(message);
        }
        if let Some(status) = err.status() {
            return Self::Status {
                code: status.as_u16(),
                body: message,
            };
        }
        Self::Other(message)
    }

    /// Structured classification first; message heuristics only when the
    /// transport could not say more.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Status { code: 429, .. } => ErrorKind::RateLimited,
            Self::Status { code, .. } if (500..600).contains(code) => ErrorKind::ServerError,
            Self::Status { body, .. } => classify_message(body),
            Self::Timeout(_) | Self::Connect(_) => ErrorKind::NetworkError,
            Self::InvalidPayload(_) => ErrorKind::ServerError,
            Self::Other(message) => classify_message(message),
        }
    }
}

/// Last-resort mapping of free-form error text.
pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));
    if has(&[
        "429",
        "rate limit",
        "rate-limit",
        "quota",
        "resource_exhausted",
        "too many requests",
    ]) {
        return ErrorKind::RateLimited;
    }
    if has(&["500", "502", "503", "504", "unavailable", "overloaded", "internal"]) {
        return ErrorKind::ServerError;
    }
    if has(&["network", "timeout", "timed out", "connection", "dns", "xhr", "fetch"]) {
        return ErrorKind::NetworkError;
    }
    ErrorKind::Unknown
}

fn error_chain_text(err: &(dyn StdError + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
