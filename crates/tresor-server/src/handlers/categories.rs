//! Category vocabulary and suggestion handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use tresor_core::{CategoryKind, CategorySuggestion, CategoryVocabulary};

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct CategorizeRequest {
    pub description: String,
    pub kind: CategoryKind,
    pub amount: Option<f64>,
}

/// GET /api/categories - The expense and income vocabularies
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryVocabulary> {
    Json(state.vocabulary.as_ref().clone())
}

/// POST /api/categorize - Suggest a category for a description
pub async fn categorize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CategorizeRequest>,
) -> Result<Json<CategorySuggestion>, AppError> {
    let suggestion = state
        .categorizer
        .suggest(&body.description, body.kind, body.amount, &state.vocabulary)
        .await?;
    Ok(Json(suggestion))
}
