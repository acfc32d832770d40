//! Adapter for the Gemini `generateContent` API.
//!
//! The HTTP call uses `reqwest::blocking` and runs on tokio's blocking pool
//! through [`tokio::task::spawn_blocking`]; the async caller only awaits the
//! join handle. If the caller abandons the attempt, the blocking request
//! keeps running detached until it completes or hits its own timeout.

use super::Adapter;
use crate::config::{redact, CallConfig, Settings, GOOGLE_API_KEY};
use crate::error::{Error, Result};
use crate::types::CallResult;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinError;

const PROVIDER: &str = "gemini";

/// Adapter for Google Gemini models (`gemini:` and `google:` tags).
#[derive(Clone)]
pub struct GeminiAdapter {
    base_url: String,
    /// Sent as the `x-goog-api-key` header.
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Base URL and `GOOGLE_API_KEY` taken from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let adapter = Self::new(&settings.gemini_base_url);
        match settings.credentials.get(GOOGLE_API_KEY) {
            Some(key) => adapter.with_api_key(key),
            None => adapter,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    fn build_body(prompt: &str, config: &CallConfig) -> Value {
        json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": config.temperature,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
            },
        })
    }

    /// Response text, looked up defensively.
    ///
    /// A top-level `text` field wins; otherwise every `text` part of the
    /// first candidate is concatenated. Blank text counts as no content.
    pub(crate) fn extract_text(json_resp: &Value) -> Option<String> {
        if let Some(text) = json_resp.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }

        let parts = json_resp
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())?;

        let joined: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect();

        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// `promptTokenCount + candidatesTokenCount`, missing counts read as 0.
    pub(crate) fn extract_tokens(json_resp: &Value) -> Option<u64> {
        let usage = json_resp.get("usageMetadata")?;
        let count = |field: &str| usage.get(field).and_then(|v| v.as_u64()).unwrap_or(0);
        Some(count("promptTokenCount") + count("candidatesTokenCount"))
    }

    /// Worker outcome as a call result. A worker that panicked or was
    /// cancelled is a failure like any other.
    fn into_call_result(model: &str, joined: std::result::Result<Result<Value>, JoinError>) -> CallResult {
        match joined.map_err(Error::from).and_then(|outcome| outcome) {
            Ok(json_resp) => match Self::extract_text(&json_resp) {
                Some(text) => CallResult::success(PROVIDER, model, text, Self::extract_tokens(&json_resp)),
                None => CallResult::failure(PROVIDER, model, "No content in Gemini response"),
            },
            Err(e) => CallResult::failure(PROVIDER, model, format!("Gemini API error: {}", e)),
        }
    }
}

/// One blocking request. The client lives only for this call.
fn generate_blocking(url: &str, key: &str, body: &Value, timeout: Duration) -> Result<Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let resp = client
        .post(url)
        .header("x-goog-api-key", key)
        .json(body)
        .send()?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().unwrap_or_default();
        return Err(Error::HttpError {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(resp.json()?)
}

#[async_trait]
impl Adapter for GeminiAdapter {
    async fn attempt(&self, prompt: &str, model: &str, config: &CallConfig) -> Result<CallResult> {
        let Some(key) = self.api_key.clone() else {
            let err = Error::MissingCredential(GOOGLE_API_KEY);
            return Ok(CallResult::failure(PROVIDER, model, err.to_string()));
        };

        let url = self.endpoint(model);
        let body = Self::build_body(prompt, config);
        let timeout = config.timeout;

        let joined =
            tokio::task::spawn_blocking(move || generate_blocking(&url, &key, &body, timeout)).await;
        Ok(Self::into_call_result(model, joined))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
