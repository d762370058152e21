//! Extraction handlers (free text and images)

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use tresor_core::{ExtractionRequest, ExtractionResult, ImageInput};

use super::request_context;
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextRequest {
    pub text: String,
    pub current_date: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractImageRequest {
    pub image_data_uri: String,
    pub current_date: Option<String>,
    pub currency: Option<String>,
}

/// POST /api/extract/text - Extract financial actions from a sentence or paragraph
pub async fn extract_text(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractTextRequest>,
) -> Result<Json<ExtractionResult>, AppError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("text is required"));
    }
    let context = request_context(&state, body.current_date.as_deref(), body.currency.as_deref())?;

    let result = state.pipeline.run(&ExtractionRequest::text(text, context)).await?;
    info!(actions = result.len(), "Extracted actions from text");

    Ok(Json(result))
}

/// POST /api/extract/image - Transcribe a screenshot or receipt, then extract
pub async fn extract_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractImageRequest>,
) -> Result<Json<ExtractionResult>, AppError> {
    let image = ImageInput::from_data_uri(&body.image_data_uri)?;
    let context = request_context(&state, body.current_date.as_deref(), body.currency.as_deref())?;

    let result = state.pipeline.run(&ExtractionRequest::image(image, context)).await?;
    info!(actions = result.len(), "Extracted actions from image");

    Ok(Json(result))
}
