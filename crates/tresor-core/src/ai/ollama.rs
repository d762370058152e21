//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint. Vision models receive
//! images as base64 strings; JSON contracts are passed through `format` so
//! Ollama constrains decoding to the schema.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::truncate;
use super::types::{GenerateRequest, ModelOutput, ModelRef, OutputContract};
use super::{decode_output, ModelBackend};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from `OLLAMA_HOST`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        Some(Self::new(&host))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn build_request(model: &ModelRef, request: &GenerateRequest) -> OllamaRequest {
        OllamaRequest {
            model: model.model.clone(),
            prompt: request.prompt_text(),
            images: request.media().filter_map(|p| p.base64_data()).collect(),
            format: match &request.contract {
                OutputContract::Text => None,
                OutputContract::Json { schema, .. } => Some(schema.clone()),
            },
            options: request.temperature.map(|temperature| OllamaOptions { temperature }),
            stream: false,
        }
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput> {
        let body = Self::build_request(model, request);

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                model: model.to_string(),
                message: format!("Ollama error {}: {}", status, truncate(&body)),
            });
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = %model, "Ollama response: {}", truncate(&ollama_response.response));

        decode_output(model, &ollama_response.response, &request.contract)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{PromptPart, Provider};
    use serde_json::json;

    #[test]
    fn test_new_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/");
        assert_eq!(backend.host(), "http://localhost:11434");
    }

    #[test]
    fn test_text_request_omits_optional_fields() {
        let model = ModelRef::new(Provider::Ollama, "llama3.2");
        let json = serde_json::to_value(OllamaBackend::build_request(
            &model,
            &GenerateRequest::text("Bonjour"),
        ))
        .unwrap();

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["prompt"], "Bonjour");
        assert_eq!(json["stream"], false);
        assert!(json.get("images").is_none());
        assert!(json.get("format").is_none());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_vision_request_with_schema() {
        let model = ModelRef::new(Provider::Ollama, "llama3.2-vision");
        let request = GenerateRequest::text("Transcris")
            .with_part(PromptPart::Media {
                mime_type: "image/jpeg".to_string(),
                data: b"abc".to_vec(),
            })
            .with_contract(OutputContract::json("ocr", json!({"type": "object"})))
            .with_temperature(0.0);

        let json = serde_json::to_value(OllamaBackend::build_request(&model, &request)).unwrap();
        assert_eq!(json["images"], json!(["YWJj"]));
        assert_eq!(json["format"], json!({"type": "object"}));
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("http://localhost:99999");
        assert!(!backend.health_check().await);
    }
}
