//! Parsing of `"provider:model_name"` identifiers.
//!
//! Provider tags are a closed set. Anything that does not name one of
//! them is treated as a bare OpenAI model name, which keeps older
//! configurations like `"gpt-4o-mini"` working.

use std::fmt;
use std::str::FromStr;

/// Provider tags accepted in model strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Gemini,
    /// Alias of [`Provider::Gemini`]; same backend, different tag.
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Gemini, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "google" => Ok(Provider::Google),
            other => Err(format!("unknown provider tag: '{}'", other)),
        }
    }
}

/// A resolved `(provider, model_name)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: Provider,
    pub name: String,
}

/// Split a model identifier into provider and model name.
///
/// Never fails. Unknown tags and strings without `:` resolve to
/// [`Provider::OpenAi`] with the whole input as the model name.
///
/// ```
/// use protocol_wizard::model::{parse_model_string, Provider};
///
/// let spec = parse_model_string("gemini:gemini-1.5-flash");
/// assert_eq!(spec.provider, Provider::Gemini);
/// assert_eq!(spec.name, "gemini-1.5-flash");
///
/// let bare = parse_model_string("gpt-4o-mini");
/// assert_eq!(bare.provider, Provider::OpenAi);
/// assert_eq!(bare.name, "gpt-4o-mini");
/// ```
pub fn parse_model_string(model: &str) -> ModelSpec {
    if let Some((tag, name)) = model.split_once(':') {
        if let Ok(provider) = tag.parse::<Provider>() {
            return ModelSpec {
                provider,
                name: name.to_string(),
            };
        }
    }

    ModelSpec {
        provider: Provider::OpenAi,
        name: model.to_string(),
    }
}
