//! Freezing: merge refinements, canonicalize, hash, and stamp a manifest.
//!
//! The digest covers the canonical text of the merged protocol, so anyone
//! holding the frozen document can recompute it with
//! [`fingerprint`](crate::canonical::fingerprint).

use crate::canonical::{canonicalize, sha256_hex};
use crate::error::{Error, Result};
use crate::protocol::{FreezeOutcome, FreezeRequest, Manifest, Protocol};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

/// Provenance note written into every manifest.
pub const MANIFEST_NOTES: &str =
    "Freeze before data harvesting; include this hash in PRISMA/methods.";

/// Source list recorded for protocols submitted inline.
pub const INLINE_SOURCE: &str = "inline";

/// An untyped frozen document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrozenDocument {
    pub protocol: Value,
    pub manifest: Manifest,
}

/// Freeze a typed protocol at the current time.
pub fn freeze(request: FreezeRequest) -> Result<FreezeOutcome> {
    freeze_at(request, Utc::now())
}

/// [`freeze`] with an explicit timestamp.
pub fn freeze_at(request: FreezeRequest, now: DateTime<Utc>) -> Result<FreezeOutcome> {
    let protocol = serde_json::to_value(&request.protocol)?;
    let refinements = request
        .refinements
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    let frozen = freeze_value_at(protocol, refinements, now)?;
    let protocol: Protocol = serde_json::from_value(frozen.protocol)?;

    Ok(FreezeOutcome {
        protocol,
        manifest: frozen.manifest,
    })
}

/// Freeze an arbitrary JSON protocol document at the current time.
///
/// The protocol must be a JSON object. `refinements`, when given, must be
/// an object too; its `inclusion_criteria_refined` and
/// `exclusion_criteria_refined` lists replace the screening criteria.
pub fn freeze_value(protocol: Value, refinements: Option<Value>) -> Result<FrozenDocument> {
    freeze_value_at(protocol, refinements, Utc::now())
}

/// [`freeze_value`] with an explicit timestamp.
pub fn freeze_value_at(
    protocol: Value,
    refinements: Option<Value>,
    now: DateTime<Utc>,
) -> Result<FrozenDocument> {
    let Value::Object(mut document) = protocol else {
        return Err(Error::InvalidInput(
            "protocol must be a JSON object".to_string(),
        ));
    };

    if let Some(refinements) = refinements {
        let Value::Object(refinements) = refinements else {
            return Err(Error::InvalidInput(
                "refinements must be a JSON object".to_string(),
            ));
        };
        info!("merging refinements into protocol");
        merge_refinements(&mut document, &refinements)?;
    }

    let document = Value::Object(document);
    let checksum = sha256_hex(&canonicalize(&document));
    info!(checksum = &checksum[..16], "protocol frozen");

    Ok(FrozenDocument {
        protocol: document,
        manifest: Manifest {
            frozen_at_utc: utc_timestamp(now),
            protocol_sha256: checksum,
            source_files: vec![INLINE_SOURCE.to_string()],
            notes: Some(MANIFEST_NOTES.to_string()),
        },
    })
}

/// Replace the screening criteria with refined ones.
///
/// Each list falls back to the existing screening value, then to `[]`.
fn merge_refinements(document: &mut Map<String, Value>, refinements: &Map<String, Value>) -> Result<()> {
    let screening = document
        .entry("screening")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(screening) = screening else {
        return Err(Error::InvalidInput(
            "protocol screening must be a JSON object".to_string(),
        ));
    };

    for (target, source) in [
        ("inclusion_criteria", "inclusion_criteria_refined"),
        ("exclusion_criteria", "exclusion_criteria_refined"),
    ] {
        let merged = refinements
            .get(source)
            .or_else(|| screening.get(target))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        screening.insert(target.to_string(), merged);
    }
    Ok(())
}

/// RFC 3339 with microseconds and a `Z` suffix.
fn utc_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}
