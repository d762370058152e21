//! Tresor Web Server
//!
//! Axum-based REST API in front of the Tresor extraction pipeline.
//!
//! - Restrictive CORS policy and security headers
//! - Request body size limit for image uploads
//! - Sanitized error responses (provider errors are logged, never returned)

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tresor_core::{
    AIClient, CategorySuggester, CategoryVocabulary, ExtractionPipeline, ModelBackend,
    ModelRouter, PromptLibrary, ReceiptScanner, DEFAULT_CURRENCY,
};

mod handlers;

/// Maximum request body size (15 MB, base64 images included)
pub const MAX_UPLOAD_SIZE: usize = 15 * 1024 * 1024;

/// Message returned for every failed model call
pub const PROCESSING_FAILED_MESSAGE: &str = "Le traitement a échoué, veuillez réessayer.";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Currency used when a request does not name one
    pub default_currency: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            default_currency: std::env::var("TRESOR_CURRENCY")
                .ok()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub ai: AIClient,
    pub vocabulary: Arc<CategoryVocabulary>,
    pub pipeline: ExtractionPipeline,
    pub receipts: ReceiptScanner,
    pub categorizer: CategorySuggester,
}

impl AppState {
    /// Wire every stage to `ai` using the configured chains and prompts
    pub fn new(
        ai: AIClient,
        router: &ModelRouter,
        prompts: &PromptLibrary,
        config: ServerConfig,
    ) -> anyhow::Result<Self> {
        let backend: Arc<dyn ModelBackend> = Arc::new(ai.clone());
        Ok(Self {
            pipeline: ExtractionPipeline::from_config(backend.clone(), router, prompts)?,
            receipts: ReceiptScanner::from_config(backend.clone(), router, prompts)?,
            categorizer: CategorySuggester::from_config(backend, router, prompts)?,
            vocabulary: Arc::new(CategoryVocabulary::default()),
            ai,
            config,
        })
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/categories", get(handlers::list_categories))
        .route("/categorize", post(handlers::categorize))
        .route("/extract/text", post(handlers::extract_text))
        .route("/extract/image", post(handlers::extract_image))
        .route("/receipts/scan", post(handlers::scan_receipt));

    let cors = if state.config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    check_ai_connection(&state.ai).await;

    let app = create_router(Arc::new(state));
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log provider reachability at startup
async fn check_ai_connection(ai: &AIClient) {
    let report = ai.provider_health().await;
    if report.is_empty() {
        warn!("No AI provider configured (set GEMINI_API_KEY, OPENAI_API_KEY, OLLAMA_HOST or AI_BACKEND=mock)");
        return;
    }
    for provider in report {
        if provider.healthy {
            info!(provider = %provider.provider, host = %provider.host, "AI provider reachable");
        } else {
            warn!(provider = %provider.provider, host = %provider.host, "AI provider configured but not responding");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// A model call that could not produce a usable answer
    pub fn processing_failed(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: PROCESSING_FAILED_MESSAGE.to_string(),
            internal: Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(error = %err, "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        // Rejected input is the caller's fault; anything else came from the models
        if let Some(tresor_core::Error::InvalidData(msg)) = err.downcast_ref::<tresor_core::Error>() {
            return Self::bad_request(msg);
        }
        Self::processing_failed(err)
    }
}

#[cfg(test)]
mod tests;
