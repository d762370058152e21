//! Ordered model fallback
//!
//! A [`FallbackChain`] tries its candidates strictly in order and returns the
//! first output that is non-empty, matches the request's schema, and passes
//! the caller's acceptance check. Worst-case latency is bounded by
//! `candidates × attempt_timeout`.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ai::parsing::normalize_json;
use crate::ai::{GenerateRequest, ModelBackend, ModelOutput, ModelRef, OutputContract};
use crate::error::{Error, Result};

/// Default per-attempt timeout
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// One candidate try
#[derive(Debug, Clone, Serialize)]
pub struct ModelAttempt {
    pub model: ModelRef,
    pub success: bool,
    pub error: Option<String>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

/// Result of a successful chain run
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    /// The candidate that produced `value`
    pub model: ModelRef,
    /// Every attempt made, the last one being the success
    pub attempts: Vec<ModelAttempt>,
}

/// Ordered list of candidate models
#[derive(Debug, Clone)]
pub struct FallbackChain {
    candidates: Vec<ModelRef>,
    attempt_timeout: Duration,
}

impl FallbackChain {
    /// Build a chain; an empty candidate list is a configuration error
    pub fn new(candidates: Vec<ModelRef>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::Config("Fallback chain has no candidate models".into()));
        }
        Ok(Self {
            candidates,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn candidates(&self) -> &[ModelRef] {
        &self.candidates
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// First candidate (stages that never fall back use only this one)
    pub fn primary(&self) -> &ModelRef {
        // Non-empty by construction
        &self.candidates[0]
    }

    /// Run the chain
    ///
    /// `accept` turns a schema-valid output into the caller's type; returning
    /// an error rejects the candidate and moves on to the next one.
    pub async fn generate<B, T, F>(
        &self,
        backend: &B,
        request: &GenerateRequest,
        accept: F,
    ) -> Result<Generated<T>>
    where
        B: ModelBackend + ?Sized,
        F: Fn(ModelOutput) -> Result<T>,
    {
        let validator = match &request.contract {
            OutputContract::Json { name, schema } => Some(SchemaValidator::compile(name, schema)?),
            OutputContract::Text => None,
        };

        let mut attempts = Vec::with_capacity(self.candidates.len());

        for model in &self.candidates {
            let started = Instant::now();
            let outcome = self
                .attempt(backend, model, request, validator.as_ref())
                .await
                .and_then(&accept);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(value) => {
                    info!(model = %model, elapsed_ms, "Model candidate succeeded");
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        success: true,
                        error: None,
                        elapsed_ms,
                    });
                    return Ok(Generated {
                        value,
                        model: model.clone(),
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(model = %model, elapsed_ms, error = %e, "Model candidate failed");
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        success: false,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        Err(Error::AllCandidatesFailed { attempts })
    }

    async fn attempt<B>(
        &self,
        backend: &B,
        model: &ModelRef,
        request: &GenerateRequest,
        validator: Option<&SchemaValidator>,
    ) -> Result<ModelOutput>
    where
        B: ModelBackend + ?Sized,
    {
        let output = tokio::time::timeout(self.attempt_timeout, backend.generate(model, request))
            .await
            .map_err(|_| Error::Timeout {
                model: model.to_string(),
                timeout_ms: self.attempt_timeout.as_millis(),
            })??;

        if output.is_empty() {
            return Err(Error::EmptyResponse(model.to_string()));
        }

        match (output, validator) {
            (ModelOutput::Json(value), Some(validator)) => {
                let value = normalize_json(value);
                validator.validate(&value)?;
                Ok(ModelOutput::Json(value))
            }
            (ModelOutput::Text(text), Some(_)) => Err(Error::Schema(format!(
                "{} returned text for a JSON contract",
                model
            ))),
            (output, None) => Ok(output),
        }
    }
}

/// Compiled JSON schema for one output contract
struct SchemaValidator {
    name: String,
    schema: jsonschema::JSONSchema,
}

impl SchemaValidator {
    fn compile(name: &str, schema: &Value) -> Result<Self> {
        let compiled = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| Error::Config(format!("Invalid schema '{}': {}", name, e)))?;
        Ok(Self {
            name: name.to_string(),
            schema: compiled,
        })
    }

    fn validate(&self, value: &Value) -> Result<()> {
        if let Err(errors) = self.schema.validate(value) {
            let details: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            debug!(schema = %self.name, "Schema violations: {:?}", details);
            return Err(Error::Schema(format!("{} ({})", self.name, details.join("; "))));
        }
        Ok(())
    }
}
