//! Image transcription
//!
//! The OCR stage sends one image with a fixed verbatim-transcription
//! instruction to a single model. There is no fallback here: if that call
//! fails, the request fails.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use base64::Engine;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::ai::{GenerateRequest, ModelBackend, ModelRef, PromptPart};
use crate::error::{Error, Result};
use crate::fallback::FallbackChain;
use crate::prompts::Prompt;

/// An image (or scanned PDF) to read
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    mime_type: String,
    data: Vec<u8>,
}

impl ImageInput {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let mime_type = mime_type.into().to_lowercase();
        if !is_supported_mime(&mime_type) {
            return Err(Error::InvalidData(format!(
                "Unsupported document type: {}",
                mime_type
            )));
        }
        if data.is_empty() {
            return Err(Error::InvalidData("Image is empty".into()));
        }
        Ok(Self { mime_type, data })
    }

    /// Parse a `data:<mime>;base64,<payload>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        static DATA_URI_RE: OnceLock<Regex> = OnceLock::new();
        let re = DATA_URI_RE.get_or_init(|| {
            Regex::new(r"(?s)^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,(.*)$")
                .expect("valid regex")
        });

        let caps = re
            .captures(uri.trim())
            .ok_or_else(|| Error::InvalidData("Expected a base64 data URI (data:image/...;base64,...)".into()))?;

        let payload: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| Error::InvalidData(format!("Invalid base64 image data: {}", e)))?;

        Self::new(&caps[1], data)
    }

    /// Read an image file, inferring the MIME type from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let mime_type = match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "heif" => "image/heif",
            "pdf" => "application/pdf",
            other => {
                return Err(Error::InvalidData(format!(
                    "Unsupported file extension: .{}",
                    other
                )))
            }
        };
        Self::new(mime_type, std::fs::read(path)?)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn to_part(&self) -> PromptPart {
        PromptPart::Media {
            mime_type: self.mime_type.clone(),
            data: self.data.clone(),
        }
    }
}

fn is_supported_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}

/// Single-model transcription stage
#[derive(Clone)]
pub struct OcrStage {
    backend: Arc<dyn ModelBackend>,
    model: ModelRef,
    timeout: Duration,
    prompt: Prompt,
}

impl OcrStage {
    pub fn new(backend: Arc<dyn ModelBackend>, model: ModelRef, timeout: Duration, prompt: Prompt) -> Self {
        Self {
            backend,
            model,
            timeout,
            prompt,
        }
    }

    /// Use the first candidate of a configured chain
    pub fn from_chain(backend: Arc<dyn ModelBackend>, chain: &FallbackChain, prompt: Prompt) -> Self {
        Self::new(backend, chain.primary().clone(), chain.attempt_timeout(), prompt)
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Transcribe all visible text
    ///
    /// An empty or whitespace-only transcription is returned as-is.
    pub async fn transcribe(&self, image: &ImageInput) -> Result<String> {
        let request = GenerateRequest::text(self.prompt.render_message(&HashMap::new()))
            .with_part(image.to_part())
            .with_temperature(0.0);

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.backend.generate(&self.model, &request))
            .await
            .map_err(|_| Error::Timeout {
                model: self.model.to_string(),
                timeout_ms: self.timeout.as_millis(),
            })
            .and_then(|r| r);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let text = output.into_text();
                info!(model = %self.model, elapsed_ms, chars = text.chars().count(), "OCR transcription complete");
                debug!("OCR transcript: {}", crate::ai::parsing::truncate(&text));
                Ok(text)
            }
            Err(e) => {
                warn!(model = %self.model, elapsed_ms, error = %e, "OCR transcription failed");
                Err(e)
            }
        }
    }
}
