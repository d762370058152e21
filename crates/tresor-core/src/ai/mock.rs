//! Mock backend for testing
//!
//! Replies are scripted per model name, and every call is recorded so tests
//! can assert which candidates were tried and in what order. Useful for unit
//! tests and for running the CLI or server without provider credentials.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::types::{GenerateRequest, ModelOutput, ModelRef, OutputContract};
use super::ModelBackend;

/// A scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Free text (returned as-is, even for JSON contracts, so decoding is exercised)
    Text(String),
    /// An already-decoded JSON value
    Json(Value),
    /// Provider error
    Fail(String),
    /// Empty body
    Empty,
    /// The inner reply, after sleeping
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// One recorded call
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: ModelRef,
    pub prompt: String,
    pub media_count: usize,
    pub json: bool,
}

#[derive(Default)]
struct Script {
    /// One-shot replies, consumed first
    queued: HashMap<String, VecDeque<MockReply>>,
    /// Replies repeated for every call once the queue is empty
    sticky: HashMap<String, MockReply>,
}

/// Mock AI backend for testing
///
/// Clones share the same script and call log.
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            script: Arc::new(Mutex::new(Script::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Reply to every call for `model` with `reply`
    pub fn on(self, model: &str, reply: MockReply) -> Self {
        lock(&self.script).sticky.insert(model.to_string(), reply);
        self
    }

    /// Queue a one-shot reply for `model`
    pub fn push(&self, model: &str, reply: MockReply) {
        lock(&self.script)
            .queued
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Model names called, in order
    pub fn called_models(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.model.model.clone()).collect()
    }

    fn next_reply(&self, model: &str) -> Option<MockReply> {
        let mut script = lock(&self.script);
        if let Some(reply) = script.queued.get_mut(model).and_then(VecDeque::pop_front) {
            return Some(reply);
        }
        script.sticky.get(model).cloned()
    }
}

/// Lock, recovering from poisoning (a panicking test must not cascade)
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Minimal value conforming to a schema's shape (unscripted JSON calls)
///
/// Numbers are positive and date-patterned strings hold today's date, so the
/// skeleton also passes the amount and date checks.
fn skeleton(schema: &Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut out = Map::new();
            let required = schema
                .get("required")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for name in required.iter().filter_map(Value::as_str) {
                    if let Some(prop) = props.get(name) {
                        out.insert(name.to_string(), skeleton(prop));
                    }
                }
            }
            Value::Object(out)
        }
        Some("array") => Value::Array(vec![]),
        Some("number") | Some("integer") => Value::from(1),
        Some("boolean") => Value::Bool(false),
        Some("string") if schema.get("pattern").is_some() => {
            Value::String(chrono::Local::now().format("%Y-%m-%d").to_string())
        }
        Some("string") => Value::String(String::new()),
        _ => Value::Null,
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(&self, model: &ModelRef, request: &GenerateRequest) -> Result<ModelOutput> {
        lock(&self.calls).push(MockCall {
            model: model.clone(),
            prompt: request.prompt_text(),
            media_count: request.media().count(),
            json: request.contract.is_json(),
        });

        let mut reply = match self.next_reply(&model.model) {
            Some(reply) => reply,
            None => {
                return Ok(match &request.contract {
                    OutputContract::Text => ModelOutput::Text("mock".to_string()),
                    OutputContract::Json { schema, .. } => ModelOutput::Json(skeleton(schema)),
                })
            }
        };

        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Text(text) => {
                    return super::decode_output(model, &text, &request.contract)
                }
                MockReply::Json(value) => return Ok(ModelOutput::Json(value)),
                MockReply::Fail(message) => {
                    return Err(Error::Generation {
                        model: model.to_string(),
                        message,
                    })
                }
                MockReply::Empty => return super::decode_output(model, "", &request.contract),
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        "mock"
    }
}
