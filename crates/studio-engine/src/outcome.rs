use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Closed failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The local image could not be decoded.
    FormatError,
    SafetyBlocked,
    /// The model answered with text instead of an image.
    Refusal,
    RateLimited,
    ServerError,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FormatError => "format_error",
            Self::SafetyBlocked => "safety_blocked",
            Self::Refusal => "refusal",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether re-issuing the same request can reasonably succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::SafetyBlocked | Self::FormatError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl GenerationFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Message suitable for showing next to a failed result.
    pub fn user_message(&self) -> String {
        let base = match self.kind {
            ErrorKind::FormatError => "This image format could not be read. Try a JPEG or PNG.",
            ErrorKind::SafetyBlocked => {
                "Generation was blocked by the service's safety filters. \
                 Change the photo or prompt."
            }
            ErrorKind::Refusal => "The model declined this request.",
            ErrorKind::RateLimited => "Too many requests right now. Wait a moment and retry.",
            ErrorKind::ServerError => "The generation service is temporarily unavailable.",
            ErrorKind::NetworkError => "Network problem while contacting the generation service.",
            ErrorKind::Unknown => "Generation failed.",
        };
        let detail = self.detail.trim();
        if detail.is_empty() || self.kind == ErrorKind::SafetyBlocked {
            base.to_string()
        } else {
            format!("{base} ({detail})")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success(GeneratedImage),
    Failure(GenerationFailure),
}

impl GenerationOutcome {
    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Failure(GenerationFailure::new(kind, detail))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn image(&self) -> Option<&GeneratedImage> {
        match self {
            Self::Success(image) => Some(image),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&GenerationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<GeneratedImage, GenerationFailure> {
        match self {
            Self::Success(image) => Ok(image),
            Self::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, GenerationFailure, GenerationOutcome};

    #[test]
    fn safety_blocks_are_not_retryable() {
        assert!(!ErrorKind::SafetyBlocked.is_retryable());
        assert!(!ErrorKind::FormatError.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::NetworkError.is_retryable());
    }

    #[test]
    fn user_message_hides_safety_detail_but_keeps_refusal_text() {
        let blocked = GenerationFailure::new(ErrorKind::SafetyBlocked, "finish reason SAFETY");
        assert!(!blocked.user_message().contains("SAFETY"));

        let refusal = GenerationFailure::new(ErrorKind::Refusal, "I can't edit this photo.");
        assert!(refusal.user_message().contains("I can't edit this photo."));
    }

    #[test]
    fn failure_display_includes_kind() {
        let failure = GenerationFailure::new(ErrorKind::RateLimited, "429 Too Many Requests");
        assert_eq!(failure.to_string(), "rate_limited: 429 Too Many Requests");
    }

    #[test]
    fn outcome_accessors_match_arm() {
        let outcome = GenerationOutcome::failure(ErrorKind::Unknown, "empty");
        assert!(!outcome.is_success());
        assert!(outcome.image().is_none());
        assert_eq!(outcome.error().map(|failure| failure.kind), Some(ErrorKind::Unknown));
        assert!(outcome.into_result().is_err());
    }
}
