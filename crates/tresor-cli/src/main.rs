//! Tresor CLI - AI extraction for everyday finance
//!
//! Usage:
//!   tresor extract --text "..."     Extract actions from a sentence
//!   tresor extract --image FILE     Extract actions from a receipt or screenshot
//!   tresor scan-receipt --file FILE Read one receipt
//!   tresor serve --port 3000        Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Extract {
            text,
            image,
            date,
            currency,
            json,
        } => {
            commands::cmd_extract(
                config,
                text.as_deref(),
                image.as_deref(),
                date.as_deref(),
                currency.as_deref(),
                json,
            )
            .await
        }
        Commands::ScanReceipt { file, date, json } => {
            commands::cmd_scan_receipt(config, &file, date.as_deref(), json).await
        }
        Commands::Categorize {
            description,
            kind,
            amount,
        } => commands::cmd_categorize(config, &description, &kind, amount).await,
        Commands::Categories => commands::cmd_categories(),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Models => commands::cmd_models(config),
        Commands::Health => commands::cmd_health().await,
        Commands::Serve {
            port,
            host,
            allowed_origins,
        } => commands::cmd_serve(config, &host, port, allowed_origins).await,
    }
}
