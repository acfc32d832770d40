//! Call configuration and environment-backed settings.
//!
//! [`CallConfig`] is the bounded, per-call configuration handed to the
//! dispatcher. [`Settings`] is the process-level configuration read once
//! from environment-style key/value pairs (optionally seeded from a
//! `.env` file) and shared read-only afterwards.

use crate::backend::BackoffConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Credential slot read by the OpenAI adapter.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Credential slot read by the Gemini adapter.
pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gemini:gemini-1.5-flash";

const MAX_RETRY_LIMIT: u32 = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded configuration for one dispatcher call.
///
/// Built with [`CallConfig::default`] and the `with_*` methods; every
/// setter clamps its input so the struct can never hold an unusable value.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    /// Attempt budget, `1..=10`. Default: 3.
    pub max_retries: u32,

    /// Upper bound on a single provider attempt. Default: 60 seconds.
    pub timeout: Duration,

    /// Delay schedule between attempts. Default: 1 s base, 10 s ceiling.
    pub backoff: BackoffConfig,

    /// Sampling temperature, `0.0..=2.0`. Default: 0.0.
    pub temperature: f64,

    /// Stop retrying as soon as an attempt fails with a permanent error
    /// (e.g. a missing credential). Default: `false`.
    pub stop_on_permanent: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffConfig::standard(),
            temperature: 0.0,
            stop_on_permanent: false,
        }
    }
}

impl CallConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.clamp(1, MAX_RETRY_LIMIT);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.backoff = BackoffConfig::new(base_delay, max_delay);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = if temperature.is_finite() {
            temperature.clamp(0.0, 2.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_stop_on_permanent(mut self, enabled: bool) -> Self {
        self.stop_on_permanent = enabled;
        self
    }
}

/// Named credential slots.
///
/// Empty values are treated as absent. `Debug` output never shows more
/// than a short prefix of a secret.
#[derive(Clone, Default)]
pub struct Credentials {
    slots: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a secret into a slot (builder style).
    pub fn with(mut self, slot: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(slot, secret);
        self
    }

    pub fn insert(&mut self, slot: impl Into<String>, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.slots.insert(slot.into(), secret);
        }
    }

    /// The secret held in `slot`, if any.
    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(|s| s.as_str())
    }

    pub fn has(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        let mut slots: Vec<_> = self.slots.iter().collect();
        slots.sort();
        for (slot, secret) in slots {
            map.entry(slot, &redact(secret));
        }
        map.finish()
    }
}

pub(crate) fn redact(secret: &str) -> String {
    match secret.get(..6) {
        Some(prefix) if secret.len() > 6 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Model identifier used when a request names none.
    pub default_model: String,
    /// Call configuration applied to every stage.
    pub call: CallConfig,
    /// Provider credentials.
    pub credentials: Credentials,
    /// OpenAI API root. Default: `https://api.openai.com`.
    pub openai_base_url: String,
    /// Gemini API root. Default: `https://generativelanguage.googleapis.com`.
    pub gemini_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            call: CallConfig::default(),
            credentials: Credentials::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl Settings {
    /// Read a `.env` file (if any) without overriding variables that are
    /// already set, then build settings from the process environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_env()
    }

    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// Recognized keys: `DEFAULT_MODEL`, `LLM_MAX_RETRIES`,
    /// `LLM_TIMEOUT_SECONDS`, `LLM_BASE_DELAY`, `LLM_MAX_DELAY`,
    /// `LLM_TEMPERATURE`, `OPENAI_API_KEY`, `GOOGLE_API_KEY`,
    /// `OPENAI_BASE_URL`, `GEMINI_BASE_URL`. Missing keys keep their
    /// defaults; unparsable values are an error naming the key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut call = CallConfig::default();
        if let Some(v) = get("LLM_MAX_RETRIES") {
            call = call.with_max_retries(parse_number::<u32>("LLM_MAX_RETRIES", &v)?);
        }
        if let Some(v) = get("LLM_TIMEOUT_SECONDS") {
            call = call.with_timeout(parse_seconds("LLM_TIMEOUT_SECONDS", &v)?);
        }
        let base = match get("LLM_BASE_DELAY") {
            Some(v) => parse_seconds("LLM_BASE_DELAY", &v)?,
            None => call.backoff.base_delay,
        };
        let max = match get("LLM_MAX_DELAY") {
            Some(v) => parse_seconds("LLM_MAX_DELAY", &v)?,
            None => call.backoff.max_delay,
        };
        call = call.with_backoff(base, max);
        if let Some(v) = get("LLM_TEMPERATURE") {
            call = call.with_temperature(parse_number::<f64>("LLM_TEMPERATURE", &v)?);
        }

        let mut credentials = Credentials::new();
        for slot in [OPENAI_API_KEY, GOOGLE_API_KEY] {
            if let Some(secret) = get(slot) {
                credentials.insert(slot, secret);
            }
        }

        Ok(Self {
            default_model: get("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            call,
            credentials,
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
        })
    }

    /// The request's model if given, otherwise the default model.
    pub fn model_or_default<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.default_model)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| Error::InvalidConfig(format!("{} = '{}': {}", key, value, e)))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs = parse_number::<f64>(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::InvalidConfig(format!("{} = '{}': {}", key, value, e)))
}
