//! Retrying, provider-agnostic call entry point.
//!
//! [`Dispatcher::call`] resolves a model string to an adapter, runs up to
//! `max_retries` sequential attempts with exponential backoff between
//! them, and always hands back a [`CallResult`]. Provider trouble never
//! escapes as an error or a panic.

use crate::backend::{AdapterRegistry, RetryCallback};
use crate::config::CallConfig;
use crate::events::{emit, Event, EventHandler};
use crate::model::{parse_model_string, Provider};
use crate::types::CallResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Models probed by [`Dispatcher::check_health`].
const HEALTH_PROBES: [(Provider, &str); 2] = [
    (Provider::OpenAi, "openai:gpt-3.5-turbo"),
    (Provider::Gemini, "gemini:gemini-1.5-flash"),
];

/// Per-call bookkeeping, dropped when the call returns.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    last_error: Option<String>,
    permanent: bool,
}

/// Routes prompts to provider adapters with retry and backoff.
///
/// Cheap to clone; adapters are shared through `Arc`.
///
/// # Example
///
/// ```
/// use protocol_wizard::backend::{AdapterRegistry, MockAdapter};
/// use protocol_wizard::config::CallConfig;
/// use protocol_wizard::dispatch::Dispatcher;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let registry = AdapterRegistry::uniform(Arc::new(MockAdapter::always("{}")));
/// let dispatcher = Dispatcher::new(registry);
/// let result = dispatcher.call("hello", "openai:gpt-4o-mini", &CallConfig::default()).await;
/// assert!(result.success);
/// # });
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    registry: AdapterRegistry,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Send `prompt` to `model` (`"provider:model_name"`), retrying failures.
    pub async fn call(&self, prompt: &str, model: &str, config: &CallConfig) -> CallResult {
        self.call_with_observer(prompt, model, config, None).await
    }

    /// [`call`](Self::call) with a callback invoked before each backoff
    /// sleep with `(next_attempt, delay, last_error)`.
    pub async fn call_with_observer(
        &self,
        prompt: &str,
        model: &str,
        config: &CallConfig,
        mut on_retry: RetryCallback<'_>,
    ) -> CallResult {
        let spec = parse_model_string(model);
        let provider = spec.provider.as_str();

        let Some(adapter) = self.registry.get(spec.provider) else {
            warn!(provider, model = %spec.name, "no adapter registered");
            let result = CallResult::failure(
                provider,
                &spec.name,
                format!("Unsupported provider: {}", provider),
            );
            self.emit_end(&result, 0);
            return result;
        };

        let started = Instant::now();
        let mut state = RetryState::default();

        for attempt in 0..config.max_retries {
            if attempt > 0 {
                let delay = config.backoff.delay_for_attempt(attempt - 1);
                let reason = state.last_error.clone().unwrap_or_default();

                if let Some(ref mut cb) = on_retry {
                    cb(attempt + 1, delay, &reason);
                }
                emit(
                    &self.event_handler,
                    Event::Retry {
                        provider: provider.to_string(),
                        model: spec.name.clone(),
                        attempt: attempt + 1,
                        delay_ms: duration_ms(delay),
                        reason,
                    },
                );
                debug!(provider, model = %spec.name, delay_ms = duration_ms(delay), "retrying after backoff");

                tokio::time::sleep(delay).await;
            }

            state.attempts += 1;
            emit(
                &self.event_handler,
                Event::AttemptStart {
                    provider: provider.to_string(),
                    model: spec.name.clone(),
                    attempt: attempt + 1,
                },
            );

            match adapter.attempt(prompt, &spec.name, config).await {
                Ok(result) if result.success => {
                    let result = result.with_latency(elapsed_ms(started));
                    info!(
                        provider,
                        model = %spec.name,
                        latency_ms = result.latency_ms,
                        attempt = attempt + 1,
                        "LLM call succeeded"
                    );
                    self.emit_end(&result, state.attempts);
                    return result;
                }
                Ok(result) => {
                    let message = result.error.unwrap_or_else(|| "unknown error".to_string());
                    warn!(
                        provider,
                        model = %spec.name,
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        error = %message,
                        "LLM call attempt failed"
                    );
                    state.permanent = !adapter.is_configured();
                    state.last_error = Some(message);
                }
                Err(e) => {
                    warn!(
                        provider,
                        model = %spec.name,
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        error = %e,
                        "LLM call attempt raised"
                    );
                    state.permanent = e.is_permanent();
                    state.last_error = Some(e.to_string());
                }
            }

            if config.stop_on_permanent && state.permanent {
                debug!(provider, model = %spec.name, "permanent failure, not retrying");
                break;
            }
        }

        let latency_ms = elapsed_ms(started);
        let message = state
            .last_error
            .unwrap_or_else(|| "no attempts were made".to_string());
        error!(
            provider,
            model = %spec.name,
            attempts = state.attempts,
            latency_ms,
            error = %message,
            "LLM call failed after all attempts"
        );
        let result = CallResult::failure(provider, &spec.name, message).with_latency(latency_ms);
        self.emit_end(&result, state.attempts);
        result
    }

    /// Probe every provider whose adapter is configured with a single
    /// attempt. Keys are provider tags; unconfigured providers are absent.
    pub async fn check_health(&self) -> BTreeMap<String, bool> {
        let probe_config = CallConfig::default().with_max_retries(1);
        let probes = HEALTH_PROBES.iter().filter(|(provider, _)| {
            self.registry
                .get(*provider)
                .is_some_and(|adapter| adapter.is_configured())
        });

        let checks = probes.map(|(provider, model)| {
            let config = &probe_config;
            async move {
                let result = self.call("test", model, config).await;
                (provider.as_str().to_string(), result.success)
            }
        });

        futures::future::join_all(checks).await.into_iter().collect()
    }

    fn emit_end(&self, result: &CallResult, attempts: u32) {
        emit(
            &self.event_handler,
            Event::CallEnd {
                provider: result.provider.clone(),
                model: result.model.clone(),
                success: result.success,
                attempts,
                latency_ms: result.latency_ms,
                tokens_used: result.tokens_used,
            },
        );
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
