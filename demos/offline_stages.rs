//! Example: run every stage against a scripted adapter, no network needed.
//!
//! The first draft reply is fenced JSON and is accepted; the refine call
//! fails twice and falls back; the queries reply is JSON Lines.
//!
//! Run with: `cargo run --example offline_stages`

use protocol_wizard::backend::{MockAdapter, MockReply};
use protocol_wizard::protocol::{DraftRequest, FreezeRequest, QueriesRequest, RefineRequest};
use protocol_wizard::{freeze, stages, AdapterRegistry, CallConfig, Telemetry, WizardCtx};
use std::sync::Arc;
use std::time::Duration;

const DRAFT_REPLY: &str = r#"```json
{"research_questions": ["Which augmentation strategies reduce lab-to-field accuracy loss?"],
 "keywords": {"include": ["plant disease", "data augmentation", "domain shift"]},
 "screening": {"inclusion_criteria": ["reports field accuracy"], "years": [2018, 2025]},
 "sources": ["openalex", "arxiv"]}
```"#;

const QUERIES_REPLY: &str = r#"{"family": "openalex", "provider": "openalex", "native": {"search": "plant disease augmentation"}, "rationale": "broad"}
{"family": "arxiv", "provider": "arxiv", "native": {"search_query": "all:\"domain shift\" AND all:plant"}, "rationale": "preprints"}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protocol_wizard=info".into()),
        )
        .init();

    let mock = Arc::new(MockAdapter::new(vec![
        MockReply::text(DRAFT_REPLY),
        MockReply::fail("rate limited"),
        MockReply::raise("connection reset"),
        MockReply::text(QUERIES_REPLY),
    ]));
    let telemetry = Arc::new(Telemetry::new());

    let ctx = WizardCtx::builder()
        .registry(AdapterRegistry::uniform(mock.clone()))
        .call_config(
            CallConfig::default()
                .with_max_retries(2)
                .with_backoff(Duration::from_millis(50), Duration::from_millis(200)),
        )
        .event_handler(telemetry.clone())
        .build();

    let draft = stages::draft(
        &ctx,
        DraftRequest::new("Plant disease detection under lab-to-field domain shift"),
    )
    .await?;
    println!("draft: fallback={} valid={}", draft.from_fallback, draft.validation.valid);

    let refined = stages::refine(
        &ctx,
        RefineRequest {
            protocol: draft.protocol.clone(),
            model: None,
        },
    )
    .await?;
    println!("refine: fallback={}", refined.from_fallback);

    let queries = stages::queries(
        &ctx,
        QueriesRequest {
            protocol: draft.protocol.clone(),
            model: None,
        },
    )
    .await?;
    for query in queries.typed_queries() {
        println!("query [{}]: {}", query.family, serde_json::Value::Object(query.native));
    }

    let frozen = freeze(FreezeRequest {
        protocol: draft.protocol,
        refinements: Some(refined.refinements),
    })?;
    println!("sha256: {}", frozen.manifest.protocol_sha256);

    println!(
        "\nTelemetry:\n{}",
        serde_json::to_string_pretty(&telemetry.snapshot())?
    );
    println!("adapter calls: {}", mock.calls());
    Ok(())
}
