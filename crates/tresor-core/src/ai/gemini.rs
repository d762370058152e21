//! Google Gemini backend implementation
//!
//! Calls `models/{model}:generateContent` on the Generative Language API.
//! Images are sent as `inline_data` parts. JSON contracts set
//! `responseMimeType: application/json` plus a `responseSchema`.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`): API key (required)
//! - `GEMINI_BASE_URL`: API root (default: https://generativelanguage.googleapis.com/v1beta)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::truncate;
use super::types::{GenerateRequest, ModelOutput, ModelRef, OutputContract, PromptPart};
use super::{decode_output, ModelBackend};

const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Schema keywords accepted by Gemini's `responseSchema` (OpenAPI subset)
const SUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "type",
    "format",
    "description",
    "nullable",
    "enum",
    "properties",
    "required",
    "items",
    "minItems",
    "maxItems",
    "minimum",
    "maximum",
];

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(GEMINI_DEFAULT_BASE_URL, api_key)
    }

    /// Point at a different API root (proxies, test servers)
    pub fn with_base_url(base_url: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())?;
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| GEMINI_DEFAULT_BASE_URL.to_string());
        Some(Self::with_base_url(&base_url, &api_key))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn build_request(request: &GenerateRequest) -> GeminiRequest {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => GeminiPart::Text { text: text.clone() },
                PromptPart::Media { mime_type, .. } => GeminiPart::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.clone(),
                        data: part.base64_data().unwrap_or_default(),
                    },
                },
            })
            .collect();

        let (response_mime_type, response_schema) = match &request.contract {
            OutputContract::Text => (None, None),
            OutputContract::Json { schema, .. } => (
                Some("application/json".to_string()),
                Some(to_gemini_schema(schema)),
            ),
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                response_mime_type,
                response_schema,
            }),
        }
    }
}

/// Reduce a JSON Schema to the subset Gemini's `responseSchema` accepts
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if !SUPPORTED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let converted = match key.as_str() {
                    "properties" => match value {
                        Value::Object(props) => Value::Object(
                            props
                                .iter()
                                .map(|(name, prop)| (name.clone(), to_gemini_schema(prop)))
                                .collect(),
                        ),
                        other => other.clone(),
                    },
                    "items" => to_gemini_schema(value),
                    _ => value.clone(),
                };
                out.insert(key.clone(), converted);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        GeminiPart::Text { text } => Some(text.as_str()),
                        GeminiPart::InlineData { .. } => None,
                    })
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model.model);
        let body = Self::build_request(request);

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                model: model.to_string(),
                message: format!("Gemini API error {}: {}", status, truncate(&body)),
            });
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let text = gemini_response.text();
        debug!(
            model = %model,
            finish_reason = ?gemini_response.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            "Gemini response: {}",
            truncate(&text)
        );

        decode_output(model, &text, &request.contract)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", &self.api_key)])
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "googleai"
    }
}
