//! Event system for call and stage lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe the wizard. The
//! dispatcher emits events for every attempt, retry and finished call;
//! stages emit an event when they fall back. Implement [`EventHandler`] to
//! receive them for metrics, progress tracking or audit logs.
//! [`Telemetry`](crate::telemetry::Telemetry) is the built-in handler.

use crate::types::Stage;
use std::sync::Arc;

/// Events emitted by the dispatcher and the stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A provider attempt is starting.
    AttemptStart {
        /// Provider tag the model string resolved to.
        provider: String,
        /// Model name sent to the provider.
        model: String,
        /// The attempt number (1-indexed).
        attempt: u32,
    },
    /// A retry is about to sleep before the next attempt.
    Retry {
        provider: String,
        model: String,
        /// The attempt that is about to run (1-indexed).
        attempt: u32,
        /// Backoff delay before that attempt in milliseconds.
        delay_ms: u64,
        /// Error of the attempt that just failed.
        reason: String,
    },
    /// A dispatcher call has finished, successfully or not.
    CallEnd {
        provider: String,
        model: String,
        success: bool,
        /// Attempts actually made (0 when the provider was unsupported).
        attempts: u32,
        /// End-to-end latency including backoff sleeps.
        latency_ms: u64,
        tokens_used: Option<u64>,
    },
    /// A stage discarded the provider output and used its fallback.
    Fallback {
        stage: Stage,
        /// Why the provider output was not usable.
        reason: String,
    },
}

/// Handler for wizard events.
///
/// This is entirely optional -- the wizard works without an event handler.
///
/// # Example
///
/// ```
/// use protocol_wizard::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::Retry { attempt, reason, .. } => println!("[retry {}] {}", attempt, reason),
///             Event::Fallback { stage, .. } => println!("[fallback] {}", stage),
///             _ => {} // AttemptStart, CallEnd
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use protocol_wizard::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::CallEnd { latency_ms, .. } = event {
///         println!("call took {} ms", latency_ms);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Fans one event out to several handlers, in order.
#[derive(Default)]
pub struct EventFanout {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }
}

impl EventHandler for EventFanout {
    fn on_event(&self, event: Event) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}
