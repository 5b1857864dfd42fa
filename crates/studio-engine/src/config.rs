use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_HISTORY_DIR: &str = "studio-history";

const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 300.0;

/// Runtime settings, read once from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub request_timeout_s: f64,
    pub history_dir: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_s: DEFAULT_TIMEOUT_S,
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            model: lookup("STUDIO_IMAGE_MODEL").unwrap_or(defaults.model),
            request_timeout_s: seconds_in_range(
                lookup("STUDIO_REQUEST_TIMEOUT").as_deref(),
                DEFAULT_TIMEOUT_S,
                MIN_TIMEOUT_S,
                MAX_TIMEOUT_S,
            ),
            history_dir: lookup("STUDIO_HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_dir),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s.clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S))
    }
}

fn seconds_in_range(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
