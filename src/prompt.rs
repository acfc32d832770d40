//! Prompt templates for the three model-backed stages.
//!
//! Templates use `{name}` placeholders. Use `{{` to insert a literal `{`
//! and `}}` to insert a literal `}`; a `{name}` with no matching variable
//! is left untouched, so JSON examples inside templates survive rendering.

/// Default template for the draft stage. Placeholder: `{subject_text}`.
pub const DRAFT_TEMPLATE: &str = r#"You are helping a researcher plan a systematic literature review.

Read the subject description below and propose a review protocol.

Subject:
{subject_text}

Return ONE JSON object and nothing else, with these fields:
- "research_questions": list of strings (at least one)
- "picos": object with optional lists "population", "intervention", "comparison", "outcomes", "context"
- "keywords": {{"include": [...], "exclude": [...], "synonyms": {{"term": ["synonym", ...]}}}}
- "screening": {{"inclusion_criteria": [...], "exclusion_criteria": [...], "years": [start, end], "languages": [...], "doc_types": [...]}}
- "sources": list of bibliographic databases, e.g. "openalex", "crossref", "pubmed", "arxiv"
- "rationales": object mapping a topic ("scope", "risks", ...) to a short explanation

Make every inclusion and exclusion criterion testable from a title and abstract.
"#;

/// Default template for the refine stage. Placeholder: `{protocol_json}`.
pub const REFINE_TEMPLATE: &str = r#"You are reviewing the screening criteria of a systematic review protocol.

Protocol:
{protocol_json}

Rewrite the inclusion and exclusion criteria so that two independent screeners
would reach the same decision. Give borderline examples and list remaining risks.

Return ONE JSON object and nothing else:
{{"inclusion_criteria_refined": [...], "exclusion_criteria_refined": [...],
 "borderline_examples": [{{"text": "...", "suggested": "INCLUDE" | "EXCLUDE" | "MAYBE", "why": "..."}}],
 "risks_and_ambiguities": [...]}}
"#;

/// Default template for the queries stage. Placeholder: `{protocol_json}`.
pub const QUERIES_TEMPLATE: &str = r#"You are writing database search queries for a systematic review protocol.

Protocol:
{protocol_json}

For each source in the protocol, write one query in that database's native syntax.
Output JSON Lines: one JSON object per line, no surrounding array, no prose:
{{"family": "<database family>", "provider": "<api or endpoint>", "native": {{...}}, "budget": {{"max_results": 500}}, "rationale": "..."}}
"#;

/// Build a prompt string with variable substitution.
///
/// Single pass: text inserted for one placeholder is never scanned for
/// other placeholders.
///
/// # Example
///
/// ```
/// use protocol_wizard::prompt::render;
///
/// let result = render("Hello {name}, here is JSON: {{\"key\": \"val\"}}", &[("name", "Alice")]);
/// assert_eq!(result, r#"Hello Alice, here is JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if let Some((name, after)) = placeholder(tail) {
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&tail[..tail.len() - after.len()]),
            }
            rest = after;
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Split `{name}rest` into `(name, rest)` when `name` is an identifier.
fn placeholder(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_prefix('{')?;
    let end = body.find('}')?;
    let name = &body[..end];
    let is_ident = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then(|| (name, &body[end + 1..]))
}

/// The templates used by the stages, overridable one by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub draft: String,
    pub refine: String,
    pub queries: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            draft: DRAFT_TEMPLATE.to_string(),
            refine: REFINE_TEMPLATE.to_string(),
            queries: QUERIES_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    pub fn with_draft(mut self, template: impl Into<String>) -> Self {
        self.draft = template.into();
        self
    }

    pub fn with_refine(mut self, template: impl Into<String>) -> Self {
        self.refine = template.into();
        self
    }

    pub fn with_queries(mut self, template: impl Into<String>) -> Self {
        self.queries = template.into();
        self
    }

    pub fn draft_prompt(&self, subject_text: &str) -> String {
        render(&self.draft, &[("subject_text", subject_text)])
    }

    pub fn refine_prompt(&self, protocol_json: &str) -> String {
        render(&self.refine, &[("protocol_json", protocol_json)])
    }

    pub fn queries_prompt(&self, protocol_json: &str) -> String {
        render(&self.queries, &[("protocol_json", protocol_json)])
    }
}
