use std::time::Duration;

use anyhow::bail;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{
    truncate_text, BackendResponse, Candidate, ContentPart, GenerationBackend, TransportError,
};
use crate::client::GenerationRequest;
use crate::config::StudioConfig;
use crate::outcome::GeneratedImage;

/// Gemini `generateContent` image editing over HTTPS.
pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &StudioConfig) -> anyhow::Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        Ok(Self::new(
            api_key,
            config.api_base.clone(),
            config.model.clone(),
            config.request_timeout(),
        ))
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub(crate) fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts: Vec<Value> = request
            .images()
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": BASE64.encode(&image.bytes),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": request.prompt() }));

        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio().as_str(),
                },
            },
        })
    }

    pub(crate) fn parse_response(payload: &Value) -> Result<BackendResponse, TransportError> {
        let block_reason = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(candidate) = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
        else {
            return Ok(BackendResponse {
                block_reason,
                candidate: None,
            });
        };

        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(str::to_string);
        let raw_parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut parts = Vec::new();
        for part in raw_parts {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            if let Some(inline) = inline {
                let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                    TransportError::InvalidPayload(format!(
                        "Gemini image base64 decode failed: {err}"
                    ))
                })?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png")
                    .to_string();
                parts.push(ContentPart::Image(GeneratedImage { bytes, mime_type }));
                continue;
            }
            if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                parts.push(ContentPart::Text(text.to_string()));
            }
        }

        Ok(BackendResponse {
            block_reason,
            candidate: Some(Candidate {
                finish_reason,
                parts,
            }),
        })
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn send(&self, request: &GenerationRequest) -> Result<BackendResponse, TransportError> {
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);
        log::debug!(
            "gemini request to {endpoint}: {} image(s), aspect {}",
            request.images().len(),
            request.aspect_ratio()
        );

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(|err| TransportError::from_reqwest(&err))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| TransportError::from_reqwest(&err))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                code: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            TransportError::InvalidPayload(format!("Gemini returned invalid JSON payload: {err}"))
        })?;
        Self::parse_response(&parsed)
    }
}
