//! Example: draft a protocol against a real provider.
//!
//! Reads `GOOGLE_API_KEY` / `OPENAI_API_KEY`, `DEFAULT_MODEL` and the `LLM_*`
//! settings from the environment or a `.env` file. Without keys every
//! call fails and the draft falls back.
//!
//! Run with: `cargo run --example live_draft -- "your review topic"`

use protocol_wizard::protocol::DraftRequest;
use protocol_wizard::{stages, FnEventHandler, Event, Settings, WizardCtx};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protocol_wizard=info".into()),
        )
        .init();

    let subject = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Plant disease detection under lab-to-field domain shift".into());

    let settings = Settings::load()?;
    let handler = FnEventHandler(|event: Event| {
        if let Event::Retry { attempt, delay_ms, reason, .. } = event {
            eprintln!("retry {} in {}ms: {}", attempt, delay_ms, reason);
        }
    });
    let ctx = WizardCtx::builder()
        .settings(settings)
        .event_handler(Arc::new(handler))
        .build();

    for (provider, healthy) in ctx.dispatcher.check_health().await {
        println!("{}: {}", provider, if healthy { "ok" } else { "unavailable" });
    }

    let request = DraftRequest::new(subject);
    request.validate()?;
    let outcome = stages::draft(&ctx, request).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.protocol)?);
    println!("\nfrom_fallback: {}", outcome.from_fallback);
    for issue in &outcome.validation.errors {
        println!("  {}: {}", issue.path, issue.message);
    }
    println!("\n{}", outcome.checklist);
    Ok(())
}
