//! Server command implementation

use std::path::Path;

use anyhow::Result;
use tresor_core::PromptLibrary;
use tresor_server::{AppState, ServerConfig};

use super::{load_client, load_router};

pub async fn cmd_serve(
    config: Option<&Path>,
    host: &str,
    port: u16,
    allowed_origins: Vec<String>,
) -> Result<()> {
    let router = load_router(config)?;
    let client = load_client()?;

    let server_config = ServerConfig {
        allowed_origins,
        ..ServerConfig::default()
    };

    println!("🚀 Starting Tresor web server...");
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Providers: {}",
        client
            .providers()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   Default currency: {}", server_config.default_currency);
    if !server_config.allowed_origins.is_empty() {
        println!("   CORS origins: {}", server_config.allowed_origins.join(", "));
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let state = AppState::new(client, &router, &PromptLibrary::new(), server_config)?;
    tresor_server::serve(state, host, port).await?;

    Ok(())
}
