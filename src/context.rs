//! Execution context shared across stage invocations.
//!
//! [`WizardCtx`] carries the settings, the dispatcher (with its adapter
//! registry and event handler) and the prompt templates. It is built once
//! and shared read-only, usually behind an `Arc`, by every stage call.

use crate::backend::{Adapter, AdapterRegistry};
use crate::config::{CallConfig, Settings};
use crate::dispatch::Dispatcher;
use crate::events::{emit, Event, EventHandler};
use crate::model::Provider;
use crate::prompt::PromptSet;
use std::sync::Arc;

/// Shared context for the wizard stages.
///
/// # Example
///
/// ```
/// use protocol_wizard::backend::MockAdapter;
/// use protocol_wizard::model::Provider;
/// use protocol_wizard::WizardCtx;
/// use std::sync::Arc;
///
/// let ctx = WizardCtx::builder()
///     .adapter(Provider::OpenAi, Arc::new(MockAdapter::always("{}")))
///     .build();
/// assert_eq!(ctx.model_or_default(None), "gemini:gemini-1.5-flash");
/// ```
pub struct WizardCtx {
    /// Process settings (default model, call config, credentials).
    pub settings: Arc<Settings>,
    /// Retrying call entry point.
    pub dispatcher: Dispatcher,
    /// Templates for draft, refine and queries.
    pub prompts: PromptSet,
    /// Optional event handler, also installed on the dispatcher.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl WizardCtx {
    pub fn builder() -> WizardCtxBuilder {
        WizardCtxBuilder {
            settings: None,
            registry: None,
            overrides: Vec::new(),
            prompts: None,
            event_handler: None,
            call: None,
        }
    }

    /// Context from environment settings with the built-in adapters.
    pub fn from_settings(settings: Settings) -> Self {
        Self::builder().settings(settings).build()
    }

    /// Call configuration applied by every stage.
    pub fn call_config(&self) -> &CallConfig {
        &self.settings.call
    }

    /// The request's model if given, otherwise the configured default.
    pub fn model_or_default<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        self.settings.model_or_default(model)
    }

    pub(crate) fn emit(&self, event: Event) {
        emit(&self.event_handler, event);
    }
}

impl std::fmt::Debug for WizardCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardCtx")
            .field("default_model", &self.settings.default_model)
            .field("call", &self.settings.call)
            .field("dispatcher", &self.dispatcher)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`WizardCtx`].
pub struct WizardCtxBuilder {
    settings: Option<Settings>,
    registry: Option<AdapterRegistry>,
    overrides: Vec<(Provider, Arc<dyn Adapter>)>,
    prompts: Option<PromptSet>,
    event_handler: Option<Arc<dyn EventHandler>>,
    call: Option<CallConfig>,
}

impl WizardCtxBuilder {
    /// Set the settings. Default: [`Settings::default()`].
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replace the whole adapter registry.
    /// Default: [`AdapterRegistry::standard`] built from the settings.
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register one adapter on top of the registry.
    pub fn adapter(mut self, provider: Provider, adapter: Arc<dyn Adapter>) -> Self {
        self.overrides.push((provider, adapter));
        self
    }

    /// Override the call configuration from the settings.
    pub fn call_config(mut self, call: CallConfig) -> Self {
        self.call = Some(call);
        self
    }

    /// Set the prompt templates. Default: [`PromptSet::default()`].
    pub fn prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the context.
    pub fn build(self) -> WizardCtx {
        let mut settings = self.settings.unwrap_or_default();
        if let Some(call) = self.call {
            settings.call = call;
        }

        let registry = self
            .registry
            .unwrap_or_else(|| AdapterRegistry::standard(&settings));
        let registry = self
            .overrides
            .into_iter()
            .fold(registry, |registry, (provider, adapter)| {
                registry.with(provider, adapter)
            });

        let mut dispatcher = Dispatcher::new(registry);
        if let Some(ref handler) = self.event_handler {
            dispatcher = dispatcher.with_event_handler(handler.clone());
        }

        WizardCtx {
            settings: Arc::new(settings),
            dispatcher,
            prompts: self.prompts.unwrap_or_default(),
            event_handler: self.event_handler,
        }
    }
}
