//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI (https://api.openai.com)
//! - vLLM (http://localhost:8000)
//! - LocalAI / llama-server (http://localhost:8080)
//! - Docker Model Runner (http://localhost:12434)
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default: https://api.openai.com when
//!   `OPENAI_API_KEY` is set)
//! - `OPENAI_API_KEY`: API key if required (optional for local servers)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::truncate;
use super::types::{GenerateRequest, ModelOutput, ModelRef, OutputContract, PromptPart};
use super::{decode_output, ModelBackend};

const OPENAI_DEFAULT_HOST: &str = "https://api.openai.com";

/// OpenAI-compatible backend
///
/// The model name comes from each [`ModelRef`], so one backend serves every
/// `openai/...` candidate in a chain.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend (no authentication)
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url)
        }
    }

    /// Create from environment variables
    ///
    /// Returns None unless `OPENAI_COMPATIBLE_HOST` or `OPENAI_API_KEY` is set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok();
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        match (host, api_key) {
            (Some(host), Some(key)) => Some(Self::with_api_key(&host, &key)),
            (Some(host), None) => Some(Self::new(&host)),
            (None, Some(key)) => Some(Self::with_api_key(OPENAI_DEFAULT_HOST, &key)),
            (None, None) => None,
        }
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn build_request(model: &ModelRef, request: &GenerateRequest) -> ChatCompletionRequest {
        let has_media = request.media().next().is_some();

        let content = if has_media {
            ChatContent::Parts(
                request
                    .parts
                    .iter()
                    .map(|part| match part {
                        PromptPart::Text(text) => ContentPart::Text { text: text.clone() },
                        PromptPart::Media { .. } => ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: part.data_uri().unwrap_or_default(),
                            },
                        },
                    })
                    .collect(),
            )
        } else {
            ChatContent::Text(request.prompt_text())
        };

        let response_format = match &request.contract {
            OutputContract::Text => None,
            OutputContract::Json { name, schema } => Some(ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: name.clone(),
                    schema: schema.clone(),
                    strict: false,
                },
            }),
        };

        ChatCompletionRequest {
            model: model.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: request.temperature,
            response_format,
            stream: false,
        }
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

/// Chat message content (text or multimodal)
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL for vision requests (data URI)
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Structured output request
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
    strict: bool,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl ModelBackend for OpenAICompatibleBackend {
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput> {
        let body = Self::build_request(model, request);

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                model: model.to_string(),
                message: format!("OpenAI API error {}: {}", status, truncate(&body)),
            });
        }

        let chat_response: ChatCompletionResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(model = %model, "OpenAI-compatible response: {}", truncate(&content));

        decode_output(model, &content, &request.contract)
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req = req.bearer_auth(api_key);
        }
        if let Ok(resp) = req.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Some local servers only expose /health
        if let Ok(resp) = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        false
    }

    fn name(&self) -> &str {
        "openai"
    }
}
