//! Example: freeze a protocol document and print its manifest.
//!
//! Run with: `cargo run --example freeze_protocol`

use protocol_wizard::canonical::{canonicalize, fingerprint};
use protocol_wizard::freeze_value;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protocol_wizard=info".into()),
        )
        .init();

    let protocol = json!({
        "sources": ["arxiv", "pubmed"],
        "screening": {
            "years": [2020, 2025],
            "languages": ["en", "fr"],
            "inclusion_criteria": ["supervised learning"],
        },
        "keywords": {"include": ["AI", "ML"], "exclude": ["robotics"]},
    });
    let refinements = json!({
        "inclusion_criteria_refined": ["supervised or self-supervised learning on labelled images"],
    });

    let frozen = freeze_value(protocol, Some(refinements))?;

    println!("Canonical text:\n{}\n", canonicalize(&frozen.protocol));
    println!("Manifest:\n{}", serde_json::to_string_pretty(&frozen.manifest)?);

    // Anyone holding the document can recompute the digest.
    assert_eq!(fingerprint(&frozen.protocol), frozen.manifest.protocol_sha256);
    Ok(())
}
