//! Adapter for the OpenAI chat completions API.
//!
//! Endpoint: `/v1/chat/completions`, one user message per attempt.
//! Any OpenAI-compatible server works when `OPENAI_BASE_URL` points at it.

use super::Adapter;
use crate::config::{redact, CallConfig, Settings, OPENAI_API_KEY};
use crate::error::{Error, Result};
use crate::types::CallResult;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const PROVIDER: &str = "openai";

/// Adapter for OpenAI (and compatible) chat completion endpoints.
///
/// # Example
///
/// ```
/// use protocol_wizard::backend::OpenAiAdapter;
///
/// let adapter = OpenAiAdapter::new("https://api.openai.com").with_api_key("sk-...");
/// ```
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
    /// If set, sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

impl OpenAiAdapter {
    /// Create an adapter without a credential.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Base URL and `OPENAI_API_KEY` taken from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let adapter = Self::new(&settings.openai_base_url);
        match settings.credentials.get(OPENAI_API_KEY) {
            Some(key) => adapter.with_api_key(key),
            None => adapter,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(prompt: &str, model: &str, config: &CallConfig) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": config.temperature,
        })
    }

    fn build_http_request(
        &self,
        key: &str,
        body: &Value,
        config: &CallConfig,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint())
            .bearer_auth(key)
            .timeout(config.timeout)
            .json(body)
    }

    /// Text from `choices[0].message.content`.
    fn extract_text(json_resp: &Value) -> Option<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn extract_tokens(json_resp: &Value) -> Option<u64> {
        json_resp
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64())
    }

    async fn complete(&self, key: &str, prompt: &str, model: &str, config: &CallConfig) -> Result<Value> {
        let body = Self::build_body(prompt, model, config);
        let resp = self.build_http_request(key, &body, config).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::HttpError {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    async fn attempt(&self, prompt: &str, model: &str, config: &CallConfig) -> Result<CallResult> {
        let Some(key) = self.api_key.as_deref() else {
            let err = Error::MissingCredential(OPENAI_API_KEY);
            return Ok(CallResult::failure(PROVIDER, model, err.to_string()));
        };

        let result = match self.complete(key, prompt, model, config).await {
            Ok(json_resp) => match Self::extract_text(&json_resp) {
                Some(text) => CallResult::success(PROVIDER, model, text, Self::extract_tokens(&json_resp)),
                None => CallResult::failure(
                    PROVIDER,
                    model,
                    "OpenAI API error: response has no message content",
                ),
            },
            Err(e) => CallResult::failure(PROVIDER, model, format!("OpenAI API error: {}", e)),
        };
        Ok(result)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_openai_body() {
        let config = CallConfig::default().with_temperature(0.3);
        let body = OpenAiAdapter::build_body("Why is the sky blue?", "gpt-4o-mini", &config);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.3);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Why is the sky blue?");
    }

    #[test]
    fn test_openai_auth_header_and_timeout() {
        let adapter = OpenAiAdapter::new("https://api.openai.com/");
        let config = CallConfig::default().with_timeout(Duration::from_secs(5));
        let req = adapter
            .build_http_request("sk-test123", &json!({"test": true}), &config)
            .build()
            .expect("build request");

        assert_eq!(req.url().as_str(), "https://api.openai.com/v1/chat/completions");
        let auth = req.headers().get("Authorization").expect("auth header");
        assert_eq!(auth, "Bearer sk-test123");
        assert_eq!(req.timeout(), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn test_extract_text_and_tokens() {
        let resp = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        assert_eq!(OpenAiAdapter::extract_text(&resp).as_deref(), Some("{\"a\":1}"));
        assert_eq!(OpenAiAdapter::extract_tokens(&resp), Some(15));
    }

    #[test]
    fn test_extract_missing_fields() {
        let resp = json!({"choices": []});
        assert!(OpenAiAdapter::extract_text(&resp).is_none());
        assert!(OpenAiAdapter::extract_tokens(&resp).is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_network() {
        let adapter = OpenAiAdapter::new("http://127.0.0.1:9");
        let result = adapter
            .attempt("hi", "gpt-4o-mini", &CallConfig::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.provider, "openai");
        assert_eq!(result.model, "gpt-4o-mini");
        assert_eq!(result.error.as_deref(), Some("OPENAI_API_KEY not set"));
        assert!(!adapter.is_configured());
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failure_value() {
        let adapter = OpenAiAdapter::new("http://127.0.0.1:9").with_api_key("sk-test");
        let config = CallConfig::default().with_timeout(Duration::from_secs(2));
        let result = adapter.attempt("hi", "gpt-4o-mini", &config).await.unwrap();

        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .starts_with("OpenAI API error: "));
    }

    #[tokio::test]
    async fn test_round_trip_reads_choices_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "temperature": 0.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"ok\":true}"}}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(server.uri()).with_api_key("sk-test");
        let result = adapter
            .attempt("hi", "gpt-4o-mini", &CallConfig::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.provider, "openai");
        assert_eq!(result.content.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(result.tokens_used, Some(12));
    }

    #[tokio::test]
    async fn test_http_error_becomes_failure_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(server.uri()).with_api_key("sk-test");
        let result = adapter
            .attempt("hi", "gpt-4o-mini", &CallConfig::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("OpenAI API error: HTTP 500: upstream down")
        );
    }

    #[tokio::test]
    async fn test_missing_content_becomes_failure_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(server.uri()).with_api_key("sk-test");
        let result = adapter
            .attempt("hi", "gpt-4o-mini", &CallConfig::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("OpenAI API error: response has no message content")
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let adapter = OpenAiAdapter::new("https://api.openai.com").with_api_key("sk-1234567890abcdef");
        let debug_output = format!("{:?}", adapter);
        assert!(!debug_output.contains("1234567890abcdef"), "API key must not appear in Debug output");
        assert!(debug_output.contains("sk-123***"));
    }

    #[test]
    fn test_from_settings_reads_credential() {
        use crate::config::Credentials;
        let settings = Settings {
            credentials: Credentials::new().with(OPENAI_API_KEY, "sk-abc"),
            openai_base_url: "http://localhost:8000".into(),
            ..Settings::default()
        };
        let adapter = OpenAiAdapter::from_settings(&settings);
        assert!(adapter.is_configured());
        assert_eq!(adapter.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
