//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tresor - Turn everyday sentences and receipts into bookkeeping entries
#[derive(Parser)]
#[command(name = "tresor")]
#[command(about = "AI extraction pipeline for personal and small-business finance", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Model chain config file (defaults to the override in the data directory, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract incomes, expenses, budgets and savings actions
    Extract {
        /// Free text to analyze (e.g. "J'ai acheté du pain à 500 hier")
        #[arg(short, long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,

        /// Image of a receipt, invoice or screenshot
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Reference date for relative expressions (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Currency of the amounts (defaults to TRESOR_CURRENCY or XOF)
        #[arg(long)]
        currency: Option<String>,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },

    /// Read one receipt into a single expense
    ScanReceipt {
        /// Receipt image file
        #[arg(short, long)]
        file: PathBuf,

        /// Reference date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },

    /// Suggest a category for a transaction description
    Categorize {
        /// Transaction description
        description: String,

        /// Category kind: expense or income
        #[arg(short, long, default_value = "expense")]
        kind: String,

        /// Transaction amount (optional hint)
        #[arg(short, long)]
        amount: Option<f64>,
    },

    /// List the category vocabulary
    Categories,

    /// Manage AI prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show the resolved model chain for every task
    Models,

    /// Check reachability of the configured AI providers
    Health,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allowed-origin")]
        allowed_origins: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all available prompts and their override status
    List,

    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (e.g., extract_transactions, scan_receipt)
        prompt_id: String,
    },

    /// Show the path where prompt overrides should be placed
    Path,
}
