//! Test utilities for tresor-core
//!
//! [`MockProviderServer`] speaks just enough of the Gemini and
//! OpenAI-compatible HTTP APIs to drive the real backends end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// What the server answers for a model
#[derive(Debug, Clone)]
pub enum ProviderReply {
    /// 200 with this text as the model output
    Text(String),
    /// An HTTP error status with a message body
    Status(u16, String),
}

/// A request the server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `gemini` or `openai`
    pub api: &'static str,
    pub model: String,
    pub body: Value,
}

#[derive(Default)]
struct ServerState {
    replies: Mutex<HashMap<String, ProviderReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock provider server for integration tests
pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/v1beta/models", get(handle_gemini_models))
            .route("/v1beta/models/:call", post(handle_gemini_generate))
            .route("/v1/models", get(handle_openai_models))
            .route("/v1/chat/completions", post(handle_openai_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL; the Gemini root is `{url}/v1beta`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn gemini_url(&self) -> String {
        format!("{}/v1beta", self.url())
    }

    /// Answer every request for `model` with `reply`
    ///
    /// Unscripted models get a 404.
    pub fn reply(&self, model: &str, reply: ProviderReply) {
        lock(&self.state.replies).insert(model.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Models requested, in order
    pub fn requested_models(&self) -> Vec<String> {
        lock(&self.state.requests).iter().map(|r| r.model.clone()).collect()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ServerState {
    fn record(&self, api: &'static str, model: &str, body: Value) -> Option<ProviderReply> {
        lock(&self.requests).push(RecordedRequest {
            api,
            model: model.to_string(),
            body,
        });
        lock(&self.replies).get(model).cloned()
    }
}

fn error_response(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

async fn handle_gemini_models() -> Json<Value> {
    Json(json!({"models": [{"name": "models/gemini-2.5-flash"}]}))
}

/// `POST /v1beta/models/{model}:generateContent`
async fn handle_gemini_generate(
    State(state): State<Arc<ServerState>>,
    Path(call): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(model) = call.strip_suffix(":generateContent") else {
        return error_response(404, "unknown method");
    };

    match state.record("gemini", model, body) {
        Some(ProviderReply::Text(text)) => Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        }))
        .into_response(),
        Some(ProviderReply::Status(status, message)) => error_response(status, &message),
        None => error_response(404, &format!("models/{} is not found", model)),
    }
}

async fn handle_openai_models() -> Json<Value> {
    Json(json!({"object": "list", "data": [{"id": "gpt-4o-mini", "object": "model"}]}))
}

async fn handle_openai_chat(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match state.record("openai", &model, body) {
        Some(ProviderReply::Text(text)) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Some(ProviderReply::Status(status, message)) => error_response(status, &message),
        None => error_response(404, &format!("The model `{}` does not exist", model)),
    }
}
