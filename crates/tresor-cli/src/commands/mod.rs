//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `extract` - Extraction, receipt scan and category suggestion commands
//! - `categories` - Category vocabulary listing
//! - `prompts` - Prompt library management commands
//! - `status` - Model chain and provider health commands
//! - `serve` - Web server command

pub mod categories;
pub mod extract;
pub mod prompts;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use categories::*;
pub use extract::*;
pub use prompts::*;
pub use serve::*;
pub use status::*;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tresor_core::{AIClient, ModelRouter, DEFAULT_CURRENCY};

/// Load the model router from `--config`, or the override/built-in config
pub fn load_router(config: Option<&Path>) -> Result<ModelRouter> {
    match config {
        Some(path) => ModelRouter::with_config_path(path.to_path_buf())
            .with_context(|| format!("Failed to load model config {}", path.display())),
        None => ModelRouter::new().context("Failed to load model config"),
    }
}

/// AI client from the environment
pub fn load_client() -> Result<AIClient> {
    AIClient::from_env().context(
        "No AI provider configured. Set GEMINI_API_KEY, OPENAI_API_KEY, OPENAI_COMPATIBLE_HOST \
         or OLLAMA_HOST (or AI_BACKEND=mock for offline testing)",
    )
}

/// Parse `--date`, defaulting to today
pub fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw)),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// `--currency`, then TRESOR_CURRENCY, then the built-in default
pub fn resolve_currency(currency: Option<&str>) -> String {
    currency
        .map(str::to_string)
        .or_else(|| std::env::var("TRESOR_CURRENCY").ok())
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
