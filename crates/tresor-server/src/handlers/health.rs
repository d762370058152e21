//! Health handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use tresor_core::ProviderHealth;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealth>,
}

/// GET /api/health - Configured providers and their reachability
///
/// `status` is `degraded` when no configured provider answers.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let providers = state.ai.provider_health().await;
    let status = if providers.iter().any(|p| p.healthy) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse { status, providers })
}
