//! Receipt scanning handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use tresor_core::{ImageInput, ScannedReceipt};

use super::request_context;
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReceiptRequest {
    pub image_data_uri: String,
    pub current_date: Option<String>,
    pub currency: Option<String>,
}

/// POST /api/receipts/scan - Read one receipt into a single expense
pub async fn scan_receipt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanReceiptRequest>,
) -> Result<Json<ScannedReceipt>, AppError> {
    let image = ImageInput::from_data_uri(&body.image_data_uri)?;
    let context = request_context(&state, body.current_date.as_deref(), body.currency.as_deref())?;

    let receipt = state.receipts.scan(&image, &context).await?;
    Ok(Json(receipt))
}
