//! Error types for Tresor

use thiserror::Error;

use crate::fallback::ModelAttempt;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Generation failed for {model}: {message}")]
    Generation { model: String, message: String },

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Output does not match schema: {0}")]
    Schema(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Model {model} timed out after {timeout_ms}ms")]
    Timeout { model: String, timeout_ms: u128 },

    #[error(
        "All {} model candidates failed; last error: {}",
        .attempts.len(),
        last_failure(.attempts)
    )]
    AllCandidatesFailed { attempts: Vec<ModelAttempt> },
}

fn last_failure(attempts: &[ModelAttempt]) -> &str {
    attempts
        .iter()
        .rev()
        .find_map(|a| a.error.as_deref())
        .unwrap_or("no candidates attempted")
}

pub type Result<T> = std::result::Result<T, Error>;
