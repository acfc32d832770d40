//! Provider adapters and the registry the dispatcher resolves them from.
//!
//! An [`Adapter`] performs exactly one attempt against one provider and
//! reports the outcome as a [`CallResult`] value. Retrying, backoff and
//! latency accounting belong to the [`Dispatcher`](crate::dispatch::Dispatcher).
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher::call ──► parse_model_string ──► AdapterRegistry::get(provider)
//!                                                     │
//!                                      ┌──────────────┴──────────────┐
//!                                 OpenAiAdapter                 GeminiAdapter
//!                            /v1/chat/completions     /v1beta/models/{m}:generateContent
//!                               (async reqwest)       (reqwest::blocking on spawn_blocking)
//! ```

pub mod backoff;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use backoff::BackoffConfig;
pub use gemini::GeminiAdapter;
pub use mock::{MockAdapter, MockReply};
pub use openai::OpenAiAdapter;

use crate::config::{CallConfig, Settings};
use crate::error::Result;
use crate::model::Provider;
use crate::types::CallResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Type alias for the callback invoked before each retry sleep.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, std::time::Duration, &str) + Send)>;

/// One provider attempt.
///
/// Built-in adapters never return `Err`: transport, auth and backend
/// problems come back as `Ok(CallResult { success: false, .. })`. An `Err`
/// from a third-party adapter is treated by the dispatcher like any other
/// failed attempt and retried.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Adapter>`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Send `prompt` to `model` once.
    async fn attempt(&self, prompt: &str, model: &str, config: &CallConfig) -> Result<CallResult>;

    /// Provider tag reported in results and logs.
    fn name(&self) -> &'static str;

    /// Whether the adapter holds what it needs to reach its provider.
    ///
    /// An unconfigured adapter fails every attempt the same way, so the
    /// dispatcher may stop early when `CallConfig::stop_on_permanent` is set.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Fixed mapping from provider tag to adapter.
///
/// Aliased tags share one adapter instance.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// A registry with no adapters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in OpenAI and Gemini adapters, configured from settings.
    /// `gemini` and `google` resolve to the same instance.
    pub fn standard(settings: &Settings) -> Self {
        let gemini: Arc<dyn Adapter> = Arc::new(GeminiAdapter::from_settings(settings));
        Self::empty()
            .with(
                Provider::OpenAi,
                Arc::new(OpenAiAdapter::from_settings(settings)),
            )
            .with(Provider::Gemini, gemini.clone())
            .with(Provider::Google, gemini)
    }

    /// Register (or replace) the adapter for a provider tag.
    pub fn with(mut self, provider: Provider, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    /// Register one adapter under every provider tag.
    pub fn uniform(adapter: Arc<dyn Adapter>) -> Self {
        Provider::ALL
            .into_iter()
            .fold(Self::empty(), |registry, provider| {
                registry.with(provider, adapter.clone())
            })
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn Adapter>> {
        self.adapters.get(&provider)
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.adapters.contains_key(&provider)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .adapters
            .iter()
            .map(|(provider, adapter)| (provider.as_str(), adapter.name()))
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GOOGLE_API_KEY, OPENAI_API_KEY};
    use crate::config::Credentials;

    #[test]
    fn test_standard_registry_covers_every_provider() {
        let registry = AdapterRegistry::standard(&Settings::default());
        for provider in Provider::ALL {
            assert!(registry.contains(provider), "missing {}", provider);
        }
        assert_eq!(registry.get(Provider::OpenAi).unwrap().name(), "openai");
        assert_eq!(registry.get(Provider::Google).unwrap().name(), "gemini");
    }

    #[test]
    fn test_gemini_and_google_share_instance() {
        let registry = AdapterRegistry::standard(&Settings::default());
        let gemini = registry.get(Provider::Gemini).unwrap();
        let google = registry.get(Provider::Google).unwrap();
        assert!(Arc::ptr_eq(gemini, google));
    }

    #[test]
    fn test_configured_follows_credentials() {
        let registry = AdapterRegistry::standard(&Settings::default());
        assert!(!registry.get(Provider::OpenAi).unwrap().is_configured());

        let settings = Settings {
            credentials: Credentials::new()
                .with(OPENAI_API_KEY, "sk-test")
                .with(GOOGLE_API_KEY, "g-test"),
            ..Settings::default()
        };
        let registry = AdapterRegistry::standard(&settings);
        assert!(registry.get(Provider::OpenAi).unwrap().is_configured());
        assert!(registry.get(Provider::Gemini).unwrap().is_configured());
    }

    #[test]
    fn test_empty_registry() {
        let registry = AdapterRegistry::empty();
        assert!(registry.get(Provider::OpenAi).is_none());
        assert_eq!(format!("{:?}", registry), "{}");
    }

    #[test]
    fn test_uniform_registry() {
        let registry = AdapterRegistry::uniform(Arc::new(MockAdapter::always("ok")));
        for provider in Provider::ALL {
            assert_eq!(registry.get(provider).unwrap().name(), "mock");
        }
    }
}
