//! Model chain and provider health commands

use std::path::Path;

use anyhow::Result;
use tresor_core::{AIClient, TaskType};

use super::load_router;

/// Print the resolved chain for every task
pub fn cmd_models(config: Option<&Path>) -> Result<()> {
    let router = load_router(config)?;

    println!();
    println!("🧭 Model chains");
    match router.config_path() {
        Some(path) if router.is_override() => println!("   Config: {}", path.display()),
        _ => println!("   Config: built-in defaults"),
    }
    println!();

    for task in TaskType::all() {
        let chain = router.config().chain_config(*task);
        println!("   {} (timeout {}s)", task.as_str(), chain.timeout.as_secs());
        for (i, model) in chain.models.iter().enumerate() {
            println!("      {}. {}", i + 1, model);
        }
        if *task == TaskType::Ocr && chain.models.len() > 1 {
            println!("      (only the first model is used for OCR)");
        }
    }

    Ok(())
}

/// Probe every configured provider
pub async fn cmd_health() -> Result<()> {
    println!("🔍 Checking AI providers...\n");

    let Some(client) = AIClient::from_env() else {
        println!("❌ No AI provider configured");
        println!();
        println!("Set one of:");
        println!("  GEMINI_API_KEY          Google Gemini");
        println!("  OPENAI_API_KEY          OpenAI (or OPENAI_COMPATIBLE_HOST for a compatible server)");
        println!("  OLLAMA_HOST             Local Ollama");
        println!("  AI_BACKEND=mock         Offline mock backend");
        return Ok(());
    };

    for provider in client.provider_health().await {
        let status = if provider.healthy { "✅" } else { "❌" };
        println!("  {} {:<10} {}", status, provider.provider, provider.host);
    }

    Ok(())
}
