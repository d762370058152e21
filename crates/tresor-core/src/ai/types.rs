//! AI backend request/response types
//!
//! These types are provider-agnostic and used across all backend implementations.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Hosted model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Generative Language API (Gemini)
    GoogleAI,
    /// Any server implementing the OpenAI chat completions API
    OpenAI,
    /// Ollama HTTP API
    Ollama,
    /// Scripted in-process backend for tests and offline development
    Mock,
}

impl Provider {
    /// Prefix used in model identifiers (`googleai/gemini-2.0-flash`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleAI => "googleai",
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }

    pub fn all() -> &'static [Provider] {
        &[Self::GoogleAI, Self::OpenAI, Self::Ollama, Self::Mock]
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "googleai" | "google" | "gemini" => Ok(Self::GoogleAI),
            "openai" | "openai_compatible" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("Unknown provider: {}", other))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model identifier qualified by its provider, e.g. `googleai/gemini-2.0-flash`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Shorthand for a mock model (tests)
    pub fn mock(model: impl Into<String>) -> Self {
        Self::new(Provider::Mock, model)
    }
}

impl FromStr for ModelRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (provider, model) = s
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("Model '{}' must be written provider/model", s)))?;
        let model = model.trim();
        if model.is_empty() {
            return Err(Error::Config(format!("Model '{}' has an empty model name", s)));
        }
        Ok(Self::new(provider.trim().parse()?, model))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl Serialize for ModelRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One segment of a prompt
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    /// Inlined media (images), raw bytes plus MIME type
    Media { mime_type: String, data: Vec<u8> },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Base64 payload for providers that inline media
    pub fn base64_data(&self) -> Option<String> {
        match self {
            Self::Media { data, .. } => Some(base64::engine::general_purpose::STANDARD.encode(data)),
            Self::Text(_) => None,
        }
    }

    /// `data:` URI for providers that take media as URLs
    pub fn data_uri(&self) -> Option<String> {
        match self {
            Self::Media { mime_type, .. } => self
                .base64_data()
                .map(|b64| format!("data:{};base64,{}", mime_type, b64)),
            Self::Text(_) => None,
        }
    }
}

/// What shape the caller expects back
#[derive(Debug, Clone, PartialEq)]
pub enum OutputContract {
    /// Free text
    Text,
    /// A single JSON value conforming to `schema`
    Json { name: String, schema: Value },
}

impl OutputContract {
    pub fn json(name: impl Into<String>, schema: Value) -> Self {
        Self::Json {
            name: name.into(),
            schema,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json { .. })
    }
}

/// A provider-agnostic generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub parts: Vec<PromptPart>,
    pub contract: OutputContract,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    /// Plain text request (text contract)
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::text(prompt)],
            contract: OutputContract::Text,
            temperature: None,
        }
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_contract(mut self, contract: OutputContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// All text parts joined, used by backends without multi-part input
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::Media { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn media(&self) -> impl Iterator<Item = &PromptPart> {
        self.parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Media { .. }))
    }
}

/// Decoded model output
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    Json(Value),
}

impl ModelOutput {
    /// Whether there is no usable content
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::Json(v) => v.is_null(),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(t) => t,
            Self::Json(v) => v.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_parse() {
        let model: ModelRef = "googleai/gemini-2.0-flash".parse().unwrap();
        assert_eq!(model.provider, Provider::GoogleAI);
        assert_eq!(model.model, "gemini-2.0-flash");
        assert_eq!(model.to_string(), "googleai/gemini-2.0-flash");
    }

    #[test]
    fn test_model_ref_keeps_nested_slashes() {
        let model: ModelRef = "openai/meta-llama/Llama-3.2-3B-Instruct".parse().unwrap();
        assert_eq!(model.provider, Provider::OpenAI);
        assert_eq!(model.model, "meta-llama/Llama-3.2-3B-Instruct");
    }

    #[test]
    fn test_model_ref_parse_errors() {
        assert!("gemini-2.0-flash".parse::<ModelRef>().is_err());
        assert!("googleai/".parse::<ModelRef>().is_err());
        assert!("anthropic/claude".parse::<ModelRef>().is_err());
    }

    #[test]
    fn test_model_ref_serde_as_string() {
        let model = ModelRef::mock("primary");
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json, "mock/primary");
        let back: ModelRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_media_data_uri() {
        let part = PromptPart::Media {
            mime_type: "image/png".to_string(),
            data: b"abc".to_vec(),
        };
        assert_eq!(part.data_uri().unwrap(), "data:image/png;base64,YWJj");
        assert!(PromptPart::text("hello").data_uri().is_none());
    }

    #[test]
    fn test_prompt_text_skips_media() {
        let request = GenerateRequest::text("first")
            .with_part(PromptPart::Media {
                mime_type: "image/jpeg".to_string(),
                data: vec![1, 2, 3],
            })
            .with_part(PromptPart::text("second"));
        assert_eq!(request.prompt_text(), "first\n\nsecond");
        assert_eq!(request.media().count(), 1);
    }

    #[test]
    fn test_model_output_is_empty() {
        assert!(ModelOutput::Text("  \n".to_string()).is_empty());
        assert!(ModelOutput::Json(Value::Null).is_empty());
        assert!(!ModelOutput::Json(serde_json::json!({})).is_empty());
        assert!(!ModelOutput::Text("ok".to_string()).is_empty());
    }
}
