//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod categories;
pub mod extract;
pub mod health;
pub mod receipts;

// Re-export all handlers for use in router
pub use categories::*;
pub use extract::*;
pub use health::*;
pub use receipts::*;

use chrono::NaiveDate;
use tresor_core::ExtractionContext;

use crate::{AppError, AppState};

/// Build the per-request context from optional `currentDate` / `currency` fields
pub(crate) fn request_context(
    state: &AppState,
    current_date: Option<&str>,
    currency: Option<&str>,
) -> Result<ExtractionContext, AppError> {
    let date = match current_date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request("currentDate must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };
    let currency = currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(state.config.default_currency.as_str());

    Ok(ExtractionContext::new(date)
        .with_currency(currency)
        .with_vocabulary(state.vocabulary.clone()))
}
