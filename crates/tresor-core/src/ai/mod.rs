//! Pluggable model backend abstraction
//!
//! This module provides a provider-agnostic way to invoke a hosted model with
//! a prompt (text and/or images) and get back free text or a JSON value.
//!
//! # Architecture
//!
//! - `ModelBackend` trait: one `generate` call per model invocation
//! - `AIClient`: registry of configured providers, dispatching each
//!   [`ModelRef`] to the backend for its provider
//! - Backend implementations: `GeminiBackend`, `OpenAICompatibleBackend`,
//!   `OllamaBackend`, `MockBackend`
//!
//! Backends hold no mutable state beyond an HTTP connection pool and never
//! retry; retrying on another model is the fallback chain's job.
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env().expect("no provider configured");
//! let model: ModelRef = "googleai/gemini-2.0-flash".parse()?;
//! let output = ai.generate(&model, &GenerateRequest::text("Bonjour")).await?;
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: set to `mock` to use only the scripted mock backend
//! - `GEMINI_API_KEY` / `GEMINI_BASE_URL`: Google Generative Language API
//! - `OPENAI_API_KEY` / `OPENAI_COMPATIBLE_HOST`: OpenAI-compatible server
//! - `OLLAMA_HOST`: Ollama server URL

mod gemini;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockCall, MockReply};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};

/// Trait defining the interface for all model backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Invoke `model` once with `request`
    ///
    /// JSON contracts are decoded into a value but not validated against the
    /// schema. Empty text is returned as-is.
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Provider name (for logging)
    fn name(&self) -> &str;
}

/// Decode a raw model reply according to the output contract
pub(crate) fn decode_output(
    model: &ModelRef,
    raw: &str,
    contract: &OutputContract,
) -> Result<ModelOutput> {
    match contract {
        OutputContract::Text => Ok(ModelOutput::Text(raw.to_string())),
        OutputContract::Json { .. } => {
            if raw.trim().is_empty() {
                return Err(Error::EmptyResponse(model.to_string()));
            }
            parsing::extract_json(raw)
                .map(ModelOutput::Json)
                .map_err(|e| Error::Generation {
                    model: model.to_string(),
                    message: e.to_string(),
                })
        }
    }
}

/// Reachability of one configured provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: Provider,
    pub host: String,
    pub healthy: bool,
}

/// Multi-provider client
///
/// Holds at most one backend per provider. Clone is cheap (backends share
/// their HTTP pools).
#[derive(Clone, Default)]
pub struct AIClient {
    gemini: Option<GeminiBackend>,
    openai: Option<OpenAICompatibleBackend>,
    ollama: Option<OllamaBackend>,
    mock: Option<MockBackend>,
}

impl AIClient {
    /// A client with no providers (every call fails with `ProviderNotConfigured`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client from environment variables
    ///
    /// `AI_BACKEND=mock` registers only the mock backend, which then answers
    /// for every model in the configured chains. Otherwise every provider
    /// whose variables are set is registered. Returns None when no provider
    /// is configured.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_default();
        if backend.eq_ignore_ascii_case("mock") {
            return Some(Self::mock(MockBackend::new()));
        }

        let client = Self {
            gemini: GeminiBackend::from_env(),
            openai: OpenAICompatibleBackend::from_env(),
            ollama: OllamaBackend::from_env(),
            mock: None,
        };

        if client.providers().is_empty() {
            None
        } else {
            Some(client)
        }
    }

    /// Create a client backed only by a mock backend
    ///
    /// Calls for any provider are served by the mock.
    pub fn mock(mock: MockBackend) -> Self {
        Self::new().with_mock(mock)
    }

    pub fn with_gemini(mut self, backend: GeminiBackend) -> Self {
        self.gemini = Some(backend);
        self
    }

    pub fn with_openai(mut self, backend: OpenAICompatibleBackend) -> Self {
        self.openai = Some(backend);
        self
    }

    pub fn with_ollama(mut self, backend: OllamaBackend) -> Self {
        self.ollama = Some(backend);
        self
    }

    pub fn with_mock(mut self, backend: MockBackend) -> Self {
        self.mock = Some(backend);
        self
    }

    /// Configured providers, in a stable order
    pub fn providers(&self) -> Vec<Provider> {
        Provider::all()
            .iter()
            .copied()
            .filter(|p| self.backend(*p).is_some())
            .collect()
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.backend(provider).is_some()
    }

    /// Probe every configured provider
    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::new();
        for provider in self.providers() {
            let healthy = match self.backend(provider) {
                Some(backend) => backend.health_check().await,
                None => false,
            };
            report.push(ProviderHealth {
                provider,
                host: self.host(provider),
                healthy,
            });
        }
        report
    }

    fn host(&self, provider: Provider) -> String {
        match provider {
            Provider::GoogleAI => self.gemini.as_ref().map(|b| b.host().to_string()),
            Provider::OpenAI => self.openai.as_ref().map(|b| b.host().to_string()),
            Provider::Ollama => self.ollama.as_ref().map(|b| b.host().to_string()),
            Provider::Mock => self.mock.as_ref().map(|_| "mock://localhost".to_string()),
        }
        .unwrap_or_default()
    }

    /// True when the mock is the only registered backend
    pub fn is_mock_only(&self) -> bool {
        self.mock.is_some()
            && self.gemini.is_none()
            && self.openai.is_none()
            && self.ollama.is_none()
    }

    /// Backend serving `provider`, with the offline mock standing in for all
    fn route(&self, provider: Provider) -> Option<&dyn ModelBackend> {
        if self.is_mock_only() {
            return self.backend(Provider::Mock);
        }
        self.backend(provider)
    }

    fn backend(&self, provider: Provider) -> Option<&dyn ModelBackend> {
        match provider {
            Provider::GoogleAI => self.gemini.as_ref().map(|b| b as &dyn ModelBackend),
            Provider::OpenAI => self.openai.as_ref().map(|b| b as &dyn ModelBackend),
            Provider::Ollama => self.ollama.as_ref().map(|b| b as &dyn ModelBackend),
            Provider::Mock => self.mock.as_ref().map(|b| b as &dyn ModelBackend),
        }
    }
}

#[async_trait]
impl ModelBackend for AIClient {
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput> {
        match self.route(model.provider) {
            Some(backend) => backend.generate(model, request).await,
            None => Err(Error::ProviderNotConfigured(model.to_string())),
        }
    }

    /// True if at least one configured provider answers
    async fn health_check(&self) -> bool {
        self.provider_health().await.iter().any(|h| h.healthy)
    }

    fn name(&self) -> &str {
        "client"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_has_no_providers() {
        let client = AIClient::new();
        assert!(client.providers().is_empty());
        assert!(!client.is_configured(Provider::GoogleAI));
    }

    #[test]
    fn test_mock_client() {
        let client = AIClient::mock(MockBackend::new());
        assert_eq!(client.providers(), vec![Provider::Mock]);
        assert_eq!(client.host(Provider::Mock), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_only_client_answers_for_every_provider() {
        let mock = MockBackend::new().on("gemini-2.5-flash", MockReply::Text("bonjour".into()));
        let client = AIClient::mock(mock.clone());
        assert!(client.is_mock_only());

        let model: ModelRef = "googleai/gemini-2.5-flash".parse().unwrap();
        let output = client.generate(&model, &GenerateRequest::text("x")).await.unwrap();
        assert_eq!(output.into_text(), "bonjour");

        let model: ModelRef = "openai/gpt-4o-mini".parse().unwrap();
        assert!(client.generate(&model, &GenerateRequest::text("y")).await.is_ok());
        assert_eq!(mock.called_models(), vec!["gemini-2.5-flash", "gpt-4o-mini"]);
    }

    #[tokio::test]
    async fn test_mock_does_not_shadow_real_providers() {
        let client = AIClient::new()
            .with_ollama(OllamaBackend::new("http://localhost:11434"))
            .with_mock(MockBackend::new());
        assert!(!client.is_mock_only());

        let model: ModelRef = "googleai/gemini-2.5-flash".parse().unwrap();
        let err = client.generate(&model, &GenerateRequest::text("x")).await.unwrap_err();
        assert!(matches!(err, Error::ProviderNotConfigured(_)));
    }

    #[test]
    fn test_registered_providers_in_stable_order() {
        let client = AIClient::new()
            .with_ollama(OllamaBackend::new("http://localhost:11434"))
            .with_gemini(GeminiBackend::new("key"));
        assert_eq!(client.providers(), vec![Provider::GoogleAI, Provider::Ollama]);
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_an_error() {
        let client = AIClient::mock(MockBackend::new());
        let model: ModelRef = "googleai/gemini-2.0-flash".parse().unwrap();
        let err = client
            .generate(&model, &GenerateRequest::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderNotConfigured(m) if m == "googleai/gemini-2.0-flash"));
    }

    #[tokio::test]
    async fn test_dispatch_to_mock() {
        let mock = MockBackend::new().on("primary", MockReply::Text("ok".into()));
        let client = AIClient::mock(mock.clone());
        let output = client
            .generate(&ModelRef::mock("primary"), &GenerateRequest::text("x"))
            .await
            .unwrap();
        assert_eq!(output.into_text(), "ok");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AIClient::mock(MockBackend::new());
        assert!(client.health_check().await);
        let report = client.provider_health().await;
        assert_eq!(report.len(), 1);
        assert!(report[0].healthy);
    }

    #[test]
    fn test_decode_json_output() {
        let model = ModelRef::mock("m");
        let contract = OutputContract::json("s", serde_json::json!({"type": "object"}));
        let output = decode_output(&model, "```json\n{\"a\": 1}\n```", &contract).unwrap();
        assert_eq!(output, ModelOutput::Json(serde_json::json!({"a": 1})));

        assert!(matches!(
            decode_output(&model, "  ", &contract),
            Err(Error::EmptyResponse(_))
        ));
        assert!(matches!(
            decode_output(&model, "pas de json", &contract),
            Err(Error::Generation { .. })
        ));
    }

    #[test]
    fn test_decode_text_output_keeps_whitespace() {
        let model = ModelRef::mock("m");
        let output = decode_output(&model, "  \n", &OutputContract::Text).unwrap();
        assert_eq!(output, ModelOutput::Text("  \n".to_string()));
    }
}
