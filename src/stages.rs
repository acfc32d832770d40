//! The model-backed wizard stages: draft, refine and queries.
//!
//! Every stage makes one dispatcher call and then decides whether the
//! output is usable. The decision is the same for all three:
//!
//! 1. a failed call or blank content falls back;
//! 2. output that does not parse as the stage's shape falls back;
//! 3. for queries only, an empty record set falls back to an empty list.
//!
//! Draft and refine fall back to the fixed documents in
//! [`fallback`](crate::fallback); queries have no static fallback.

use crate::context::WizardCtx;
use crate::error::Result;
use crate::events::Event;
use crate::fallback;
use crate::normalize::{normalize_records, parse_as, ParseError};
use crate::protocol::{
    DraftOutcome, DraftRequest, Protocol, QueriesOutcome, QueriesRequest, RefineOutcome,
    RefineRequest, Refinements,
};
use crate::types::{CallResult, Stage};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Why a stage did not use the model's output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FallbackReason {
    /// The dispatcher gave up.
    #[error("LLM call failed: {0}")]
    CallFailed(String),

    /// The call succeeded but produced no text.
    #[error("LLM returned empty content")]
    EmptyContent,

    /// The text did not parse as the stage's shape.
    #[error("malformed LLM output: {0}")]
    Malformed(#[from] ParseError),

    /// No usable query records were found.
    #[error("no queries found in LLM output")]
    NoRecords,
}

fn usable_text(result: &CallResult) -> std::result::Result<&str, FallbackReason> {
    if !result.success {
        let message = result.error.clone().unwrap_or_else(|| "unknown error".into());
        return Err(FallbackReason::CallFailed(message));
    }
    result.usable_content().ok_or(FallbackReason::EmptyContent)
}

fn parse_typed<T: DeserializeOwned>(result: &CallResult) -> std::result::Result<T, FallbackReason> {
    let text = usable_text(result)?;
    Ok(parse_as::<T>(text)?)
}

/// Decide whether a draft call produced a usable protocol.
pub fn parse_draft(result: &CallResult) -> std::result::Result<Protocol, FallbackReason> {
    parse_typed(result)
}

/// Decide whether a refine call produced usable refinements.
pub fn parse_refinements(result: &CallResult) -> std::result::Result<Refinements, FallbackReason> {
    parse_typed(result)
}

/// Decide whether a queries call produced any records.
pub fn parse_queries(
    result: &CallResult,
) -> std::result::Result<Vec<Map<String, Value>>, FallbackReason> {
    let text = usable_text(result)?;
    let records = normalize_records(text);
    if records.is_empty() {
        return Err(FallbackReason::NoRecords);
    }
    Ok(records)
}

fn record_fallback(ctx: &WizardCtx, stage: Stage, reason: &FallbackReason) {
    warn!(stage = stage.as_str(), reason = %reason, "using fallback");
    ctx.emit(Event::Fallback {
        stage,
        reason: reason.to_string(),
    });
}

fn log_success(stage: Stage, result: &CallResult) {
    info!(
        stage = stage.as_str(),
        provider = %result.provider,
        tokens = result.tokens_used,
        latency_ms = result.latency_ms,
        "LLM output accepted"
    );
}

/// Draft a protocol from a free-text subject description.
pub async fn draft(ctx: &WizardCtx, request: DraftRequest) -> Result<DraftOutcome> {
    let model = ctx.model_or_default(request.model.as_deref()).to_string();
    info!(stage = "draft", model = %model, "drafting protocol");

    let prompt = ctx.prompts.draft_prompt(&request.subject_text);
    let result = ctx.dispatcher.call(&prompt, &model, ctx.call_config()).await;

    let (protocol, from_fallback) = match parse_draft(&result) {
        Ok(protocol) => {
            log_success(Stage::Draft, &result);
            (protocol, false)
        }
        Err(reason) => {
            record_fallback(ctx, Stage::Draft, &reason);
            (fallback::draft_protocol(), true)
        }
    };

    let validation = protocol.validate();
    if !validation.valid {
        warn!(stage = "draft", errors = validation.errors.len(), "protocol validation failed");
    }

    Ok(DraftOutcome {
        protocol,
        checklist: fallback::DRAFT_CHECKLIST.to_string(),
        from_fallback,
        validation,
        telemetry: result.telemetry(),
    })
}

/// Refine the screening criteria of a protocol.
pub async fn refine(ctx: &WizardCtx, request: RefineRequest) -> Result<RefineOutcome> {
    let model = ctx.model_or_default(request.model.as_deref()).to_string();
    info!(stage = "refine", model = %model, "refining criteria");

    let prompt = ctx.prompts.refine_prompt(&request.protocol.to_prompt_json()?);
    let result = ctx.dispatcher.call(&prompt, &model, ctx.call_config()).await;

    let (refinements, from_fallback) = match parse_refinements(&result) {
        Ok(refinements) => {
            log_success(Stage::Refine, &result);
            (refinements, false)
        }
        Err(reason) => {
            record_fallback(ctx, Stage::Refine, &reason);
            (fallback::refinements(), true)
        }
    };

    Ok(RefineOutcome {
        refinements,
        from_fallback,
        telemetry: result.telemetry(),
    })
}

/// Generate database search queries for a protocol.
pub async fn queries(ctx: &WizardCtx, request: QueriesRequest) -> Result<QueriesOutcome> {
    let model = ctx.model_or_default(request.model.as_deref()).to_string();
    info!(stage = "queries", model = %model, "generating queries");

    let prompt = ctx.prompts.queries_prompt(&request.protocol.to_prompt_json()?);
    let result = ctx.dispatcher.call(&prompt, &model, ctx.call_config()).await;

    let (queries, from_fallback) = match parse_queries(&result) {
        Ok(records) => {
            log_success(Stage::Queries, &result);
            (records, false)
        }
        Err(reason) => {
            record_fallback(ctx, Stage::Queries, &reason);
            (Vec::new(), true)
        }
    };

    Ok(QueriesOutcome {
        queries,
        from_fallback,
        telemetry: result.telemetry(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AdapterRegistry, MockAdapter, MockReply};
    use crate::config::CallConfig;
    use crate::telemetry::Telemetry;
    use std::sync::Arc;
    use std::time::Duration;

    const MODEL_DRAFT: &str = r#"```json
{
  "research_questions": ["Do transformers beat CNNs on field images?"],
  "keywords": {"include": ["transformer", "CNN"], "exclude": []},
  "screening": {"inclusion_criteria": ["field images"], "years": [2018, 2024]},
  "sources": ["openalex"]
}
```"#;

    const MODEL_REFINEMENTS: &str = r#"{"inclusion_criteria_refined": ["uses field images"],
"exclusion_criteria_refined": ["lab only"],
"borderline_examples": [{"text": "mixed data", "suggested": "INCLUDE", "why": "has field part"}]}"#;

    fn ctx_with(mock: Arc<MockAdapter>, telemetry: Arc<Telemetry>) -> WizardCtx {
        WizardCtx::builder()
            .registry(AdapterRegistry::uniform(mock))
            .call_config(
                CallConfig::default()
                    .with_max_retries(2)
                    .with_backoff(Duration::from_millis(10), Duration::from_millis(10)),
            )
            .event_handler(telemetry)
            .build()
    }

    fn ok(content: &str) -> CallResult {
        CallResult::success("mock", "m", content, None)
    }

    #[test]
    fn test_parse_draft_decisions() {
        assert!(parse_draft(&ok(MODEL_DRAFT)).is_ok());

        let failed = CallResult::failure("mock", "m", "HTTP 500");
        assert_eq!(
            parse_draft(&failed),
            Err(FallbackReason::CallFailed("HTTP 500".into()))
        );
        assert_eq!(parse_draft(&ok("   ")), Err(FallbackReason::EmptyContent));
        assert!(matches!(
            parse_draft(&ok("Sure! Here is your protocol.")),
            Err(FallbackReason::Malformed(ParseError::InvalidJson { .. }))
        ));
        assert!(matches!(
            parse_draft(&ok("{\"research_questions\": []}")),
            Err(FallbackReason::Malformed(ParseError::DeserializationFailed { .. }))
        ));
        assert!(matches!(
            parse_draft(&ok("[1, 2]")),
            Err(FallbackReason::Malformed(ParseError::NotAnObject { .. }))
        ));
    }

    #[test]
    fn test_parse_queries_decisions() {
        let records = parse_queries(&ok("{\"family\":\"openalex\"}\n{\"family\":\"pubmed\"}")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(parse_queries(&ok("no json here")), Err(FallbackReason::NoRecords));
        assert_eq!(parse_queries(&ok("")), Err(FallbackReason::EmptyContent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_uses_model_output() {
        let telemetry = Arc::new(Telemetry::new());
        let mock = Arc::new(MockAdapter::always(MODEL_DRAFT));
        let ctx = ctx_with(mock.clone(), telemetry.clone());

        let outcome = draft(&ctx, DraftRequest::new("Transformers for plant disease detection"))
            .await
            .unwrap();

        assert!(!outcome.from_fallback);
        assert_eq!(outcome.protocol.sources, vec!["openalex"]);
        assert_eq!(outcome.protocol.screening.languages, vec!["en"]);
        assert!(outcome.validation.valid);
        assert_eq!(outcome.checklist, fallback::DRAFT_CHECKLIST);
        assert!(outcome.telemetry.success);
        assert!(mock.prompts()[0].contains("Transformers for plant disease detection"));
        assert_eq!(telemetry.fallbacks_for(Stage::Draft), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_falls_back_after_failed_call() {
        let telemetry = Arc::new(Telemetry::new());
        let mock = Arc::new(MockAdapter::failing("GOOGLE_API_KEY not set"));
        let ctx = ctx_with(mock.clone(), telemetry.clone());

        let outcome = draft(&ctx, DraftRequest::new("anything at all here"))
            .await
            .unwrap();

        assert!(outcome.from_fallback);
        assert_eq!(outcome.protocol, fallback::draft_protocol());
        assert!(outcome.validation.valid);
        assert!(!outcome.telemetry.success);
        assert_eq!(outcome.telemetry.error.as_deref(), Some("GOOGLE_API_KEY not set"));
        assert_eq!(mock.calls(), 2);
        assert_eq!(telemetry.fallbacks_for(Stage::Draft), 1);
        assert_eq!(telemetry.snapshot().retries, 1);
    }

    #[tokio::test]
    async fn test_draft_falls_back_on_wrong_shape() {
        let telemetry = Arc::new(Telemetry::new());
        let mock = Arc::new(MockAdapter::always("{\"title\": \"not a protocol\"}"));
        let ctx = ctx_with(mock, telemetry.clone());

        let outcome = draft(&ctx, DraftRequest::new("subject text")).await.unwrap();
        assert!(outcome.from_fallback);
        assert!(outcome.telemetry.success);
        assert_eq!(telemetry.fallbacks_for(Stage::Draft), 1);
    }

    #[tokio::test]
    async fn test_draft_reports_validation_without_fallback() {
        let telemetry = Arc::new(Telemetry::new());
        let content = r#"{"research_questions": ["q"], "keywords": {"include": ["k"]},
            "screening": {"inclusion_criteria": ["c"], "years": [2025, 2010]}, "sources": ["arxiv"]}"#;
        let ctx = ctx_with(Arc::new(MockAdapter::always(content)), telemetry);

        let outcome = draft(&ctx, DraftRequest::new("subject text")).await.unwrap();
        assert!(!outcome.from_fallback);
        assert!(!outcome.validation.valid);
        assert_eq!(outcome.validation.errors[0].path, "/screening/years");
    }

    #[tokio::test]
    async fn test_refine_uses_model_output() {
        let telemetry = Arc::new(Telemetry::new());
        let mock = Arc::new(MockAdapter::always(MODEL_REFINEMENTS));
        let ctx = ctx_with(mock.clone(), telemetry);

        let request = RefineRequest {
            protocol: fallback::draft_protocol(),
            model: Some("openai:gpt-4o-mini".into()),
        };
        let outcome = refine(&ctx, request).await.unwrap();

        assert!(!outcome.from_fallback);
        assert_eq!(outcome.refinements.inclusion_criteria_refined, vec!["uses field images"]);
        assert!(outcome.refinements.risks_and_ambiguities.is_empty());
        assert_eq!(outcome.telemetry.model, "gpt-4o-mini");
        assert!(mock.prompts()[0].contains("\"plant disease detection\""));
    }

    #[tokio::test]
    async fn test_refine_falls_back_on_blank_content() {
        let telemetry = Arc::new(Telemetry::new());
        let ctx = ctx_with(Arc::new(MockAdapter::always("\n  \n")), telemetry.clone());

        let request = RefineRequest {
            protocol: fallback::draft_protocol(),
            model: None,
        };
        let outcome = refine(&ctx, request).await.unwrap();
        assert!(outcome.from_fallback);
        assert_eq!(outcome.refinements, fallback::refinements());
        assert_eq!(telemetry.fallbacks_for(Stage::Refine), 1);
    }

    #[tokio::test]
    async fn test_refine_falls_back_on_bad_suggestion() {
        let telemetry = Arc::new(Telemetry::new());
        let content = r#"{"inclusion_criteria_refined": [], "exclusion_criteria_refined": [],
            "borderline_examples": [{"text": "t", "suggested": "PERHAPS", "why": "w"}]}"#;
        let ctx = ctx_with(Arc::new(MockAdapter::always(content)), telemetry);

        let request = RefineRequest {
            protocol: fallback::draft_protocol(),
            model: None,
        };
        assert!(refine(&ctx, request).await.unwrap().from_fallback);
    }

    #[tokio::test]
    async fn test_queries_from_jsonl() {
        let telemetry = Arc::new(Telemetry::new());
        let content = "```jsonl\n{\"family\":\"openalex\",\"provider\":\"openalex\",\"native\":{\"search\":\"plant disease\"},\"rationale\":\"broad\"}\nnot a record\n{\"family\":\"arxiv\"}\n```";
        let ctx = ctx_with(Arc::new(MockAdapter::always(content)), telemetry);

        let request = QueriesRequest {
            protocol: fallback::draft_protocol(),
            model: None,
        };
        let outcome = queries(&ctx, request).await.unwrap();
        assert!(!outcome.from_fallback);
        assert_eq!(outcome.queries.len(), 2);
        assert_eq!(outcome.typed_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_queries_empty_records_fall_back_to_empty_list() {
        let telemetry = Arc::new(Telemetry::new());
        let ctx = ctx_with(Arc::new(MockAdapter::always("I could not write queries.")), telemetry.clone());

        let request = QueriesRequest {
            protocol: fallback::draft_protocol(),
            model: None,
        };
        let outcome = queries(&ctx, request).await.unwrap();
        assert!(outcome.from_fallback);
        assert!(outcome.queries.is_empty());
        assert!(outcome.telemetry.success);
        assert_eq!(telemetry.fallbacks_for(Stage::Queries), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_failed_call_has_no_static_fallback() {
        let telemetry = Arc::new(Telemetry::new());
        let mock = Arc::new(MockAdapter::new(vec![MockReply::raise("timeout")]));
        let ctx = ctx_with(mock, telemetry);

        let request = QueriesRequest {
            protocol: fallback::draft_protocol(),
            model: None,
        };
        let outcome = queries(&ctx, request).await.unwrap();
        assert!(outcome.from_fallback);
        assert!(outcome.queries.is_empty());
        assert_eq!(outcome.telemetry.error.as_deref(), Some("timeout"));
    }
}
