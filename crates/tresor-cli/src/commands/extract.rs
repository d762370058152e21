//! Extraction, receipt and categorization command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tresor_core::{
    CategoryKind, CategorySuggester, CategoryVocabulary, ExtractionContext, ExtractionPipeline,
    ExtractionRequest, ExtractionResult, ImageInput, ModelBackend, PromptLibrary, ReceiptScanner,
};

use super::{load_client, load_router, parse_date, resolve_currency, truncate};

pub async fn cmd_extract(
    config: Option<&Path>,
    text: Option<&str>,
    image: Option<&Path>,
    date: Option<&str>,
    currency: Option<&str>,
    json: bool,
) -> Result<()> {
    let context = ExtractionContext::new(parse_date(date)?).with_currency(resolve_currency(currency));

    let request = match (text, image) {
        (Some(text), None) => {
            if text.trim().is_empty() {
                bail!("--text is empty");
            }
            ExtractionRequest::text(text, context)
        }
        (None, Some(path)) => {
            let image = ImageInput::from_path(path)
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            ExtractionRequest::image(image, context)
        }
        _ => bail!("Provide exactly one of --text or --image"),
    };

    let backend: Arc<dyn ModelBackend> = Arc::new(load_client()?);
    let pipeline = ExtractionPipeline::from_config(backend, &load_router(config)?, &PromptLibrary::new())?;
    let result = pipeline.run(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, request.context().currency());
    }

    Ok(())
}

fn print_result(result: &ExtractionResult, currency: &str) {
    if result.is_empty() {
        println!("No financial actions found.");
        return;
    }

    println!();
    println!(
        "{:<22} {:<30} {:>12}  {:<20} {}",
        "KIND", "DESCRIPTION", "AMOUNT", "CATEGORY", "DATE"
    );
    println!("{}", "-".repeat(100));

    for action in result.actions() {
        println!(
            "{:<22} {:<30} {:>12.0}  {:<20} {}",
            action.kind(),
            truncate(action.description(), 30),
            action.amount(),
            truncate(action.category(), 20),
            action.date().unwrap_or("-")
        );
    }

    println!();
    println!("{} action(s), amounts in {}", result.len(), currency);
}

pub async fn cmd_scan_receipt(
    config: Option<&Path>,
    file: &Path,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let image = ImageInput::from_path(file)
        .with_context(|| format!("Failed to read image {}", file.display()))?;
    let context = ExtractionContext::new(parse_date(date)?).with_currency(resolve_currency(None));

    let backend: Arc<dyn ModelBackend> = Arc::new(load_client()?);
    let scanner = ReceiptScanner::from_config(backend, &load_router(config)?, &PromptLibrary::new())?;
    let generated = scanner.scan_generated(&image, &context).await?;
    let receipt = &generated.value;

    if json {
        println!("{}", serde_json::to_string_pretty(receipt)?);
        return Ok(());
    }

    println!();
    println!("🧾 {}", receipt.merchant);
    println!("   Amount:   {:.0} {}", receipt.amount, context.currency());
    println!("   Date:     {}", receipt.date);
    println!("   Category: {}", receipt.category);
    println!("   Model:    {}", generated.model);

    Ok(())
}

pub async fn cmd_categorize(
    config: Option<&Path>,
    description: &str,
    kind: &str,
    amount: Option<f64>,
) -> Result<()> {
    let kind: CategoryKind = kind.parse().map_err(anyhow::Error::msg)?;

    let backend: Arc<dyn ModelBackend> = Arc::new(load_client()?);
    let suggester =
        CategorySuggester::from_config(backend, &load_router(config)?, &PromptLibrary::new())?;
    let suggestion = suggester
        .suggest(description, kind, amount, &CategoryVocabulary::default())
        .await?;

    println!(
        "{} {}{}",
        suggestion.category.emoji,
        suggestion.category.name,
        if suggestion.matched {
            ""
        } else {
            " (no exact match, using catch-all)"
        }
    );
    println!("   Model: {}", suggestion.model);

    Ok(())
}
