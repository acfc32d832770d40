//! In-process counters fed by wizard events.
//!
//! [`Telemetry`] is an [`EventHandler`] that tallies calls per
//! provider/model/outcome, tokens, retries and stage fallbacks.
//! [`Telemetry::snapshot`] returns a serializable copy for whatever
//! exporter the host application uses.

use crate::events::{Event, EventHandler};
use crate::types::Stage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CallKey {
    provider: String,
    model: String,
    success: bool,
}

/// Call, token, retry and fallback counters.
///
/// # Example
///
/// ```
/// use protocol_wizard::telemetry::Telemetry;
/// use protocol_wizard::WizardCtx;
/// use std::sync::Arc;
///
/// let telemetry = Arc::new(Telemetry::new());
/// let _ctx = WizardCtx::builder().event_handler(telemetry.clone()).build();
/// assert_eq!(telemetry.snapshot().total_calls, 0);
/// ```
#[derive(Debug, Default)]
pub struct Telemetry {
    calls: Mutex<HashMap<CallKey, u64>>,
    fallbacks: Mutex<HashMap<Stage, u64>>,
    tokens: AtomicU64,
    retries: AtomicU64,
    latency_ms: AtomicU64,
}

/// Count of finished calls for one provider/model/outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCount {
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub count: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    /// Sorted by provider, model, then outcome.
    pub calls: Vec<CallCount>,
    pub total_calls: u64,
    pub tokens_used: u64,
    pub retries: u64,
    /// Sum of end-to-end call latencies.
    pub latency_ms: u64,
    pub fallbacks: BTreeMap<Stage, u64>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mut calls: Vec<CallCount> = self
            .calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .map(|(key, count)| CallCount {
                        provider: key.provider.clone(),
                        model: key.model.clone(),
                        success: key.success,
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        calls.sort_by(|a, b| {
            (&a.provider, &a.model, a.success).cmp(&(&b.provider, &b.model, b.success))
        });

        let fallbacks = self
            .fallbacks
            .lock()
            .map(|f| f.iter().map(|(stage, n)| (*stage, *n)).collect())
            .unwrap_or_default();

        TelemetrySnapshot {
            total_calls: calls.iter().map(|c| c.count).sum(),
            calls,
            tokens_used: self.tokens.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
            fallbacks,
        }
    }

    /// Fallbacks recorded for one stage.
    pub fn fallbacks_for(&self, stage: Stage) -> u64 {
        self.fallbacks
            .lock()
            .ok()
            .and_then(|f| f.get(&stage).copied())
            .unwrap_or(0)
    }
}

impl EventHandler for Telemetry {
    fn on_event(&self, event: Event) {
        match event {
            Event::CallEnd {
                provider,
                model,
                success,
                latency_ms,
                tokens_used,
                ..
            } => {
                if let Ok(mut calls) = self.calls.lock() {
                    *calls
                        .entry(CallKey {
                            provider,
                            model,
                            success,
                        })
                        .or_insert(0) += 1;
                }
                if let Some(tokens) = tokens_used {
                    self.tokens.fetch_add(tokens, Ordering::Relaxed);
                }
                self.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
            }
            Event::Retry { .. } => {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            Event::Fallback { stage, .. } => {
                if let Ok(mut fallbacks) = self.fallbacks.lock() {
                    *fallbacks.entry(stage).or_insert(0) += 1;
                }
            }
            Event::AttemptStart { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_end(provider: &str, success: bool, tokens: Option<u64>) -> Event {
        Event::CallEnd {
            provider: provider.into(),
            model: "m".into(),
            success,
            attempts: 1,
            latency_ms: 10,
            tokens_used: tokens,
        }
    }

    #[test]
    fn test_counts_calls_by_outcome() {
        let telemetry = Telemetry::new();
        telemetry.on_event(call_end("openai", true, Some(20)));
        telemetry.on_event(call_end("openai", true, Some(5)));
        telemetry.on_event(call_end("openai", false, None));
        telemetry.on_event(call_end("gemini", true, None));

        let snap = telemetry.snapshot();
        assert_eq!(snap.total_calls, 4);
        assert_eq!(snap.tokens_used, 25);
        assert_eq!(snap.latency_ms, 40);
        assert_eq!(
            snap.calls,
            vec![
                CallCount { provider: "gemini".into(), model: "m".into(), success: true, count: 1 },
                CallCount { provider: "openai".into(), model: "m".into(), success: false, count: 1 },
                CallCount { provider: "openai".into(), model: "m".into(), success: true, count: 2 },
            ]
        );
    }

    #[test]
    fn test_counts_retries_and_fallbacks() {
        let telemetry = Telemetry::new();
        telemetry.on_event(Event::Retry {
            provider: "openai".into(),
            model: "m".into(),
            attempt: 2,
            delay_ms: 1000,
            reason: "boom".into(),
        });
        telemetry.on_event(Event::Fallback { stage: Stage::Draft, reason: "x".into() });
        telemetry.on_event(Event::Fallback { stage: Stage::Draft, reason: "y".into() });
        telemetry.on_event(Event::Fallback { stage: Stage::Queries, reason: "z".into() });

        let snap = telemetry.snapshot();
        assert_eq!(snap.retries, 1);
        assert_eq!(telemetry.fallbacks_for(Stage::Draft), 2);
        assert_eq!(telemetry.fallbacks_for(Stage::Refine), 0);
        assert_eq!(snap.fallbacks.get(&Stage::Queries), Some(&1));
    }

    #[test]
    fn test_snapshot_serializes() {
        let telemetry = Telemetry::new();
        telemetry.on_event(Event::Fallback { stage: Stage::Refine, reason: "x".into() });
        let json = serde_json::to_value(telemetry.snapshot()).unwrap();
        assert_eq!(json["fallbacks"]["refine"], 1);
        assert_eq!(json["total_calls"], 0);
    }
}
