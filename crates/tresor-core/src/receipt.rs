//! Single receipt scanning
//!
//! Reads one receipt or invoice image straight into a single expense shape
//! (merchant, total, date, suggested category) with a vision model chain.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::{GenerateRequest, ModelBackend, ModelOutput, OutputContract};
use crate::categories::CategoryKind;
use crate::error::{Error, Result};
use crate::extraction::{check_amount, check_date, ExtractionContext};
use crate::fallback::{FallbackChain, Generated};
use crate::model_router::{ModelRouter, TaskType};
use crate::ocr::ImageInput;
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// A scanned receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedReceipt {
    pub merchant: String,
    pub amount: f64,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Expense category name from the vocabulary
    pub category: String,
}

pub fn receipt_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "merchant": {"type": "string"},
            "amount": {"type": "number"},
            "date": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"},
            "category": {"type": "string"}
        },
        "required": ["merchant", "amount", "date", "category"]
    })
}

#[derive(Clone)]
pub struct ReceiptScanner {
    backend: Arc<dyn ModelBackend>,
    chain: FallbackChain,
    prompt: Prompt,
}

impl ReceiptScanner {
    pub fn new(backend: Arc<dyn ModelBackend>, chain: FallbackChain, prompt: Prompt) -> Self {
        Self {
            backend,
            chain,
            prompt,
        }
    }

    pub fn from_config(
        backend: Arc<dyn ModelBackend>,
        router: &ModelRouter,
        prompts: &PromptLibrary,
    ) -> Result<Self> {
        Ok(Self::new(
            backend,
            router.chain_for(TaskType::Receipt)?,
            prompts.load(PromptId::ScanReceipt)?,
        ))
    }

    pub async fn scan(&self, image: &ImageInput, context: &ExtractionContext) -> Result<ScannedReceipt> {
        self.scan_generated(image, context).await.map(|g| g.value)
    }

    pub async fn scan_generated(
        &self,
        image: &ImageInput,
        context: &ExtractionContext,
    ) -> Result<Generated<ScannedReceipt>> {
        let current_date = context.current_date().format("%Y-%m-%d").to_string();
        let categories = context.vocabulary().prompt_list(CategoryKind::Expense);

        let mut vars = HashMap::new();
        vars.insert("current_date", current_date.as_str());
        vars.insert("currency", context.currency());
        vars.insert("expense_categories", categories.as_str());

        let request = GenerateRequest::text(self.prompt.render_message(&vars))
            .with_part(image.to_part())
            .with_contract(OutputContract::json("scanned_receipt", receipt_schema()))
            .with_temperature(0.0);

        self.chain
            .generate(self.backend.as_ref(), &request, |output| {
                let receipt = decode_receipt(output)?;
                check_amount("receipt", &receipt.merchant, receipt.amount)?;
                check_date("receipt", &receipt.merchant, &receipt.date)?;
                Ok(canonical_category(receipt, context))
            })
            .await
    }
}

fn decode_receipt(output: ModelOutput) -> Result<ScannedReceipt> {
    match output {
        ModelOutput::Json(value) => serde_json::from_value(value)
            .map_err(|e| Error::Schema(format!("scanned_receipt: {}", e))),
        ModelOutput::Text(_) => Err(Error::Schema("scanned_receipt: expected a JSON object".into())),
    }
}

/// Snap the category onto the vocabulary, or the catch-all if it is unknown
fn canonical_category(mut receipt: ScannedReceipt, context: &ExtractionContext) -> ScannedReceipt {
    let vocabulary = context.vocabulary();
    receipt.category = vocabulary
        .find_case_insensitive(CategoryKind::Expense, &receipt.category)
        .unwrap_or_else(|| vocabulary.catch_all(CategoryKind::Expense))
        .name
        .clone();
    receipt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockReply, ModelRef};
    use chrono::NaiveDate;

    fn scanner(mock: &MockBackend, models: &[&str]) -> ReceiptScanner {
        let chain =
            FallbackChain::new(models.iter().map(|m| ModelRef::mock(*m)).collect()).unwrap();
        let prompt = PromptLibrary::embedded_only().load(PromptId::ScanReceipt).unwrap();
        ReceiptScanner::new(Arc::new(mock.clone()), chain, prompt)
    }

    fn context() -> ExtractionContext {
        ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 7, 28).unwrap())
    }

    fn image() -> ImageInput {
        ImageInput::new("image/jpeg", vec![0xff, 0xd8, 0xff]).unwrap()
    }

    #[tokio::test]
    async fn test_scan_receipt() {
        let mock = MockBackend::new().on(
            "vision",
            MockReply::Json(json!({
                "merchant": "Supermarché Casino",
                "amount": 12500,
                "date": "2024-07-26",
                "category": "alimentation"
            })),
        );

        let receipt = scanner(&mock, &["vision"]).scan(&image(), &context()).await.unwrap();
        assert_eq!(
            receipt,
            ScannedReceipt {
                merchant: "Supermarché Casino".into(),
                amount: 12500.0,
                date: "2024-07-26".into(),
                category: "Alimentation".into(),
            }
        );
        let calls = mock.calls();
        assert_eq!(calls[0].media_count, 1);
        assert!(calls[0].json);
        assert!(calls[0].prompt.contains("2024-07-28"));
    }

    #[tokio::test]
    async fn test_unknown_category_maps_to_catch_all() {
        let mock = MockBackend::new().on(
            "vision",
            MockReply::Json(json!({
                "merchant": "Quincaillerie",
                "amount": 3000,
                "date": "2024-07-28",
                "category": "Bricolage"
            })),
        );
        let receipt = scanner(&mock, &["vision"]).scan(&image(), &context()).await.unwrap();
        assert_eq!(receipt.category, "Autres dépenses");
    }

    #[tokio::test]
    async fn test_zero_total_falls_back() {
        let mock = MockBackend::new()
            .on(
                "a",
                MockReply::Json(json!({"merchant": "X", "amount": 0, "date": "2024-07-28", "category": "Shopping"})),
            )
            .on(
                "b",
                MockReply::Json(json!({"merchant": "X", "amount": 900, "date": "2024-07-28", "category": "Shopping"})),
            );
        let generated = scanner(&mock, &["a", "b"])
            .scan_generated(&image(), &context())
            .await
            .unwrap();
        assert_eq!(generated.model, ModelRef::mock("b"));
        assert_eq!(generated.value.amount, 900.0);
    }

    #[tokio::test]
    async fn test_missing_field_falls_back() {
        let mock = MockBackend::new()
            .on("a", MockReply::Json(json!({"merchant": "X", "amount": 10})))
            .on("b", MockReply::Fail("unavailable".into()));
        let err = scanner(&mock, &["a", "b"]).scan(&image(), &context()).await.unwrap_err();
        assert!(matches!(err, Error::AllCandidatesFailed { .. }));
    }
}
