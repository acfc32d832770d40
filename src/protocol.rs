//! Typed protocol document and the request/outcome shapes of each stage.
//!
//! Optional fields serialize as `null` rather than being skipped, so a
//! typed [`Protocol`] and the JSON it came from canonicalize (and hash)
//! identically once defaults are filled in.

use crate::error::{Error, Result};
use crate::types::CallTelemetry;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Earliest publication year a screening window may start at.
pub const MIN_YEAR: i32 = 1900;
/// Latest publication year a screening window may end at.
pub const MAX_YEAR: i32 = 2100;

/// Minimum length of [`DraftRequest::subject_text`], in characters.
pub const MIN_SUBJECT_CHARS: usize = 10;

/// Population, intervention, comparison, outcomes, context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Picos {
    #[serde(default)]
    pub population: Option<Vec<String>>,
    #[serde(default)]
    pub intervention: Option<Vec<String>>,
    #[serde(default)]
    pub comparison: Option<Vec<String>>,
    #[serde(default)]
    pub outcomes: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<Vec<String>>,
}

/// Search keyword sets. Entries are trimmed and blank entries dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(deserialize_with = "trimmed_strings")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "trimmed_strings")]
    pub exclude: Vec<String>,
    /// Term -> synonyms used for query expansion.
    #[serde(default)]
    pub synonyms: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    pub inclusion_criteria: Vec<String>,
    #[serde(default)]
    pub exclusion_criteria: Vec<String>,
    /// Inclusive publication window `(start, end)`, serialized as `[start, end]`.
    pub years: (i32, i32),
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_doc_types")]
    pub doc_types: Vec<String>,
}

/// A systematic-review protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub research_questions: Vec<String>,
    #[serde(default)]
    pub picos: Option<Picos>,
    pub keywords: Keywords,
    pub screening: Screening,
    /// Bibliographic sources to harvest, e.g. `"openalex"`.
    pub sources: Vec<String>,
    #[serde(default)]
    pub rationales: Option<BTreeMap<String, String>>,
}

/// Screening decision suggested for a borderline study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Suggestion {
    Include,
    Exclude,
    Maybe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderlineExample {
    pub text: String,
    pub suggested: Suggestion,
    pub why: String,
}

/// Refined screening criteria produced by the refine stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refinements {
    pub inclusion_criteria_refined: Vec<String>,
    pub exclusion_criteria_refined: Vec<String>,
    #[serde(default)]
    pub borderline_examples: Vec<BorderlineExample>,
    #[serde(default)]
    pub risks_and_ambiguities: Vec<String>,
}

/// One database-specific search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Database family, e.g. `"openalex"`.
    pub family: String,
    pub provider: String,
    /// Query in the database's native syntax.
    pub native: Map<String, Value>,
    #[serde(default)]
    pub budget: Map<String, Value>,
    pub rationale: String,
}

/// Audit record attached to a frozen protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// RFC 3339 UTC timestamp with a literal `Z` suffix.
    pub frozen_at_utc: String,
    pub protocol_sha256: String,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One field-level problem found by [`Protocol::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON-pointer style path, e.g. `/screening/years`.
    pub path: String,
    pub message: String,
}

/// Outcome of validating a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl Validation {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

impl Protocol {
    /// Check the constraints the type system does not enforce.
    pub fn validate(&self) -> Validation {
        let mut issues = Vec::new();
        let mut require = |ok: bool, path: &str, message: &str| {
            if !ok {
                issues.push(ValidationIssue {
                    path: path.to_string(),
                    message: message.to_string(),
                });
            }
        };

        require(
            !self.research_questions.is_empty(),
            "/research_questions",
            "at least one research question is required",
        );
        require(
            !self.keywords.include.is_empty(),
            "/keywords/include",
            "at least one include keyword is required",
        );
        require(
            !self.screening.inclusion_criteria.is_empty(),
            "/screening/inclusion_criteria",
            "at least one inclusion criterion is required",
        );
        require(
            !self.sources.is_empty(),
            "/sources",
            "at least one source is required",
        );

        let (start, end) = self.screening.years;
        require(
            start <= end,
            "/screening/years",
            &format!("start year ({}) must be <= end year ({})", start, end),
        );
        require(
            start >= MIN_YEAR && end <= MAX_YEAR,
            "/screening/years",
            &format!("years must be between {} and {}", MIN_YEAR, MAX_YEAR),
        );

        Validation::from_issues(issues)
    }

    /// Pretty JSON used to embed the protocol in prompts.
    pub fn to_prompt_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_doc_types() -> Vec<String> {
    vec!["journal".to_string(), "conference".to_string()]
}

fn trimmed_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Input of the draft stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRequest {
    /// Free-text description of the review topic.
    pub subject_text: String,
    /// `"provider:model_name"`; the configured default when absent.
    #[serde(default)]
    pub model: Option<String>,
}

impl DraftRequest {
    pub fn new(subject_text: impl Into<String>) -> Self {
        Self {
            subject_text: subject_text.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Reject subject texts shorter than [`MIN_SUBJECT_CHARS`].
    ///
    /// The draft stage itself accepts any text; callers that front user
    /// input use this to refuse obviously empty topics.
    pub fn validate(&self) -> Result<()> {
        let chars = self.subject_text.chars().count();
        if chars < MIN_SUBJECT_CHARS {
            return Err(Error::InvalidInput(format!(
                "subject_text must be at least {} characters, got {}",
                MIN_SUBJECT_CHARS, chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftOutcome {
    pub protocol: Protocol,
    /// Human-in-the-loop review checklist.
    pub checklist: String,
    pub from_fallback: bool,
    pub validation: Validation,
    pub telemetry: CallTelemetry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineRequest {
    pub protocol: Protocol,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefineOutcome {
    pub refinements: Refinements,
    pub from_fallback: bool,
    pub telemetry: CallTelemetry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueriesRequest {
    pub protocol: Protocol,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueriesOutcome {
    /// Records as the model produced them; may be empty.
    pub queries: Vec<Map<String, Value>>,
    pub from_fallback: bool,
    pub telemetry: CallTelemetry,
}

impl QueriesOutcome {
    /// The records that deserialize into [`Query`]; others are skipped.
    pub fn typed_queries(&self) -> Vec<Query> {
        self.queries
            .iter()
            .filter_map(|record| serde_json::from_value(Value::Object(record.clone())).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeRequest {
    pub protocol: Protocol,
    #[serde(default)]
    pub refinements: Option<Refinements>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreezeOutcome {
    pub protocol: Protocol,
    pub manifest: Manifest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "research_questions": ["Does X improve Y?"],
            "keywords": {"include": [" AI ", "", "ML"]},
            "screening": {"inclusion_criteria": ["peer reviewed"], "years": [2015, 2025]},
            "sources": ["openalex"]
        })
    }

    #[test]
    fn test_defaults_filled_on_deserialize() {
        let protocol: Protocol = serde_json::from_value(minimal()).unwrap();
        assert_eq!(protocol.keywords.include, vec!["AI", "ML"]);
        assert!(protocol.keywords.exclude.is_empty());
        assert_eq!(protocol.screening.languages, vec!["en"]);
        assert_eq!(protocol.screening.doc_types, vec!["journal", "conference"]);
        assert!(protocol.screening.exclusion_criteria.is_empty());
        assert!(protocol.picos.is_none());
        assert!(protocol.validate().valid);
    }

    #[test]
    fn test_none_serializes_as_null() {
        let protocol: Protocol = serde_json::from_value(minimal()).unwrap();
        let value = serde_json::to_value(&protocol).unwrap();
        assert_eq!(value["picos"], Value::Null);
        assert_eq!(value["rationales"], Value::Null);
        assert_eq!(value["keywords"]["synonyms"], Value::Null);
        assert_eq!(value["screening"]["years"], json!([2015, 2025]));
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut doc = minimal();
        doc.as_object_mut().unwrap().remove("sources");
        assert!(serde_json::from_value::<Protocol>(doc).is_err());
    }

    #[test]
    fn test_years_must_be_pair() {
        let mut doc = minimal();
        doc["screening"]["years"] = json!([2015]);
        assert!(serde_json::from_value::<Protocol>(doc).is_err());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut doc = minimal();
        doc["research_questions"] = json!([]);
        doc["screening"]["years"] = json!([2030, 2020]);
        let protocol: Protocol = serde_json::from_value(doc).unwrap();

        let validation = protocol.validate();
        assert!(!validation.valid);
        let paths: Vec<_> = validation.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/research_questions", "/screening/years"]);
        assert!(validation.errors[1].message.contains("2030"));
    }

    #[test]
    fn test_years_outside_supported_range() {
        let mut doc = minimal();
        doc["screening"]["years"] = json!([1850, 2020]);
        let protocol: Protocol = serde_json::from_value(doc).unwrap();
        let validation = protocol.validate();
        assert_eq!(validation.errors.len(), 1);
        assert_eq!(validation.errors[0].message, "years must be between 1900 and 2100");
    }

    #[test]
    fn test_blank_keywords_fail_validation() {
        let mut doc = minimal();
        doc["keywords"]["include"] = json!(["  ", ""]);
        let protocol: Protocol = serde_json::from_value(doc).unwrap();
        let validation = protocol.validate();
        assert_eq!(validation.errors[0].path, "/keywords/include");
    }

    #[test]
    fn test_suggestion_is_uppercase() {
        let example: BorderlineExample =
            serde_json::from_value(json!({"text": "t", "suggested": "MAYBE", "why": "w"})).unwrap();
        assert_eq!(example.suggested, Suggestion::Maybe);
        assert!(serde_json::from_value::<BorderlineExample>(
            json!({"text": "t", "suggested": "maybe", "why": "w"})
        )
        .is_err());
    }

    #[test]
    fn test_refinements_defaults() {
        let refinements: Refinements = serde_json::from_value(json!({
            "inclusion_criteria_refined": ["a"],
            "exclusion_criteria_refined": []
        }))
        .unwrap();
        assert!(refinements.borderline_examples.is_empty());
        assert!(refinements.risks_and_ambiguities.is_empty());
    }

    #[test]
    fn test_draft_request_validate() {
        assert!(DraftRequest::new("too short").validate().is_err());
        assert!(DraftRequest::new("plant disease detection in the field")
            .validate()
            .is_ok());
        // Counted in characters, not bytes.
        assert!(DraftRequest::new("éééééééé").validate().is_err());
    }

    #[test]
    fn test_typed_queries_skips_malformed() {
        let outcome = QueriesOutcome {
            queries: vec![
                json!({"family": "openalex", "provider": "openalex", "native": {"search": "x"}, "rationale": "r"})
                    .as_object()
                    .cloned()
                    .unwrap(),
                json!({"family": "pubmed"}).as_object().cloned().unwrap(),
            ],
            from_fallback: false,
            telemetry: CallTelemetry {
                provider: "mock".into(),
                model: "m".into(),
                success: true,
                latency_ms: 0,
                tokens_used: None,
                error: None,
            },
        };
        let typed = outcome.typed_queries();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].family, "openalex");
        assert!(typed[0].budget.is_empty());
    }
}
