use serde::{Deserialize, Serialize};
use std::fmt;

/// Wizard stages that go through the fallback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Draft,
    Refine,
    Queries,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::Refine => "refine",
            Stage::Queries => "queries",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of one provider call (or a whole retry sequence).
///
/// `content` is only present on success; `error` is only present on
/// failure. The dispatcher patches `latency_ms` after timing the entire
/// retry sequence; nothing else is mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Raw text produced by the model.
    pub content: Option<String>,

    /// Whether the provider returned usable output.
    pub success: bool,

    /// Provider tag that served (or refused) the call, e.g. `"openai"`.
    pub provider: String,

    /// Model name as sent to the provider.
    pub model: String,

    /// Wall-clock milliseconds across every attempt and backoff sleep.
    pub latency_ms: u64,

    /// Tokens consumed, when the provider reports it.
    pub tokens_used: Option<u64>,

    /// Human-readable failure description.
    pub error: Option<String>,
}

impl CallResult {
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        tokens_used: Option<u64>,
    ) -> Self {
        Self {
            content: Some(content.into()),
            success: true,
            provider: provider.into(),
            model: model.into(),
            latency_ms: 0,
            tokens_used,
            error: None,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            content: None,
            success: false,
            provider: provider.into(),
            model: model.into(),
            latency_ms: 0,
            tokens_used: None,
            error: Some(error.into()),
        }
    }

    /// Set the end-to-end latency.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Content if the call succeeded and produced non-blank text.
    pub fn usable_content(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Telemetry view without the content body.
    pub fn telemetry(&self) -> CallTelemetry {
        CallTelemetry {
            provider: self.provider.clone(),
            model: self.model.clone(),
            success: self.success,
            latency_ms: self.latency_ms,
            tokens_used: self.tokens_used,
            error: self.error.clone(),
        }
    }
}

/// Provider/latency/token record a stage hands back for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTelemetry {
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub latency_ms: u64,
    pub tokens_used: Option<u64>,
    pub error: Option<String>,
}
