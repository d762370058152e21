//! Structured transaction extraction ("Agent W")
//!
//! Turns free-form text (typed notes, OCR transcripts, statement extracts)
//! into an [`ExtractionResult`]: the incomes, expenses, budgets, savings goals
//! and savings contributions it mentions. The model is constrained by a JSON
//! schema and every decoded result passes through the configured
//! [`ResultValidator`]s before the fallback chain accepts it.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::{GenerateRequest, ModelBackend, ModelOutput, OutputContract};
use crate::categories::{CategoryKind, CategoryVocabulary};
use crate::error::{Error, Result};
use crate::fallback::{FallbackChain, Generated};
use crate::prompts::Prompt;

/// Currency assumed when the caller does not provide one
pub const DEFAULT_CURRENCY: &str = "XOF";

const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// An income or expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub description: String,
    pub amount: f64,
    pub category: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

/// A budget, savings goal or savings contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub description: String,
    pub amount: f64,
    pub category: String,
}

/// Everything extracted from one text
///
/// All five sequences are always present; missing fields decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionResult {
    pub incomes: Vec<TransactionEntry>,
    pub expenses: Vec<TransactionEntry>,
    pub new_budgets: Vec<PlanEntry>,
    pub new_savings_goals: Vec<PlanEntry>,
    pub savings_contributions: Vec<PlanEntry>,
}

/// One extracted action, borrowed from an [`ExtractionResult`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractedAction<'a> {
    Income(&'a TransactionEntry),
    Expense(&'a TransactionEntry),
    NewBudget(&'a PlanEntry),
    NewSavingsGoal(&'a PlanEntry),
    SavingsContribution(&'a PlanEntry),
}

impl<'a> ExtractedAction<'a> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Income(_) => "income",
            Self::Expense(_) => "expense",
            Self::NewBudget(_) => "newBudget",
            Self::NewSavingsGoal(_) => "newSavingsGoal",
            Self::SavingsContribution(_) => "savingsContribution",
        }
    }

    pub fn description(&self) -> &'a str {
        match self {
            Self::Income(t) | Self::Expense(t) => &t.description,
            Self::NewBudget(p) | Self::NewSavingsGoal(p) | Self::SavingsContribution(p) => {
                &p.description
            }
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Self::Income(t) | Self::Expense(t) => t.amount,
            Self::NewBudget(p) | Self::NewSavingsGoal(p) | Self::SavingsContribution(p) => p.amount,
        }
    }

    pub fn category(&self) -> &'a str {
        match self {
            Self::Income(t) | Self::Expense(t) => &t.category,
            Self::NewBudget(p) | Self::NewSavingsGoal(p) | Self::SavingsContribution(p) => {
                &p.category
            }
        }
    }

    /// Only incomes and expenses are dated
    pub fn date(&self) -> Option<&'a str> {
        match self {
            Self::Income(t) | Self::Expense(t) => Some(&t.date),
            _ => None,
        }
    }
}

impl ExtractionResult {
    /// Every action, in field order
    pub fn actions(&self) -> impl Iterator<Item = ExtractedAction<'_>> {
        self.incomes
            .iter()
            .map(ExtractedAction::Income)
            .chain(self.expenses.iter().map(ExtractedAction::Expense))
            .chain(self.new_budgets.iter().map(ExtractedAction::NewBudget))
            .chain(self.new_savings_goals.iter().map(ExtractedAction::NewSavingsGoal))
            .chain(
                self.savings_contributions
                    .iter()
                    .map(ExtractedAction::SavingsContribution),
            )
    }

    pub fn len(&self) -> usize {
        self.actions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request-scoped extraction parameters
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    current_date: NaiveDate,
    currency: String,
    vocabulary: Arc<CategoryVocabulary>,
}

impl ExtractionContext {
    /// Context for `current_date` with the default currency and vocabulary
    pub fn new(current_date: NaiveDate) -> Self {
        Self {
            current_date,
            currency: DEFAULT_CURRENCY.to_string(),
            vocabulary: Arc::new(CategoryVocabulary::default()),
        }
    }

    /// Context for the local current date
    pub fn today() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: Arc<CategoryVocabulary>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn vocabulary(&self) -> &CategoryVocabulary {
        &self.vocabulary
    }
}

/// Post-generation check on a decoded result
///
/// Returning an error rejects the candidate's output; the fallback chain then
/// tries the next candidate.
pub trait ResultValidator: Send + Sync {
    fn validate(&self, result: &ExtractionResult, context: &ExtractionContext) -> Result<()>;
}

/// Amounts are positive and income/expense dates are real `YYYY-MM-DD` dates
#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantValidator;

impl ResultValidator for InvariantValidator {
    fn validate(&self, result: &ExtractionResult, _context: &ExtractionContext) -> Result<()> {
        for action in result.actions() {
            check_amount(action.kind(), action.description(), action.amount())?;
            if let Some(date) = action.date() {
                check_date(action.kind(), action.description(), date)?;
            }
        }
        Ok(())
    }
}

/// Rejects income/expense categories outside the vocabulary
///
/// Opt-in: the default pipeline trusts the model to pick from the list.
#[derive(Debug, Clone, Copy, Default)]
pub struct VocabularyValidator;

impl ResultValidator for VocabularyValidator {
    fn validate(&self, result: &ExtractionResult, context: &ExtractionContext) -> Result<()> {
        let vocabulary = context.vocabulary();
        let checks = result
            .incomes
            .iter()
            .map(|t| (CategoryKind::Income, t))
            .chain(result.expenses.iter().map(|t| (CategoryKind::Expense, t)));

        for (kind, entry) in checks {
            if !vocabulary.contains(kind, &entry.category) {
                return Err(Error::Validation(format!(
                    "{} '{}' has unknown category '{}'",
                    kind.as_str(),
                    entry.description,
                    entry.category
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn check_amount(kind: &str, description: &str, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::Validation(format!(
            "{} '{}' has non-positive amount {}",
            kind, description, amount
        )));
    }
    Ok(())
}

pub(crate) fn check_date(kind: &str, description: &str, date: &str) -> Result<()> {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

    if !re.is_match(date) || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(Error::Validation(format!(
            "{} '{}' has invalid date '{}' (expected YYYY-MM-DD)",
            kind, description, date
        )));
    }
    Ok(())
}

/// JSON schema for [`ExtractionResult`]
///
/// The top-level fields are not required: missing ones default to empty.
pub fn extraction_schema() -> Value {
    let transaction = json!({
        "type": "object",
        "properties": {
            "description": {"type": "string"},
            "amount": {"type": "number"},
            "category": {"type": "string"},
            "date": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"}
        },
        "required": ["description", "amount", "category", "date"]
    });
    let plan = json!({
        "type": "object",
        "properties": {
            "description": {"type": "string"},
            "amount": {"type": "number"},
            "category": {"type": "string"}
        },
        "required": ["description", "amount", "category"]
    });

    json!({
        "type": "object",
        "properties": {
            "incomes": {"type": "array", "items": transaction},
            "expenses": {"type": "array", "items": transaction},
            "newBudgets": {"type": "array", "items": plan},
            "newSavingsGoals": {"type": "array", "items": plan},
            "savingsContributions": {"type": "array", "items": plan}
        }
    })
}

/// The Agent W stage
#[derive(Clone)]
pub struct ExtractionStage {
    backend: Arc<dyn ModelBackend>,
    chain: FallbackChain,
    prompt: Prompt,
    validators: Vec<Arc<dyn ResultValidator>>,
}

impl ExtractionStage {
    /// Stage with the default [`InvariantValidator`]
    pub fn new(backend: Arc<dyn ModelBackend>, chain: FallbackChain, prompt: Prompt) -> Self {
        Self {
            backend,
            chain,
            prompt,
            validators: vec![Arc::new(InvariantValidator)],
        }
    }

    /// Add a post-generation hook
    pub fn with_validator(mut self, validator: impl ResultValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Render the instruction text and attach the output contract
    pub fn build_request(&self, text: &str, context: &ExtractionContext) -> GenerateRequest {
        let current_date = context.current_date().format("%Y-%m-%d").to_string();
        let expense = context.vocabulary().prompt_list(CategoryKind::Expense);
        let income = context.vocabulary().prompt_list(CategoryKind::Income);

        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("current_date", current_date.as_str());
        vars.insert("currency", context.currency());
        vars.insert("expense_categories", expense.as_str());
        vars.insert("income_categories", income.as_str());

        GenerateRequest::text(self.prompt.render_message(&vars))
            .with_contract(OutputContract::json("extraction_result", extraction_schema()))
            .with_temperature(EXTRACTION_TEMPERATURE)
    }

    /// Extract actions from `text`
    pub async fn extract(&self, text: &str, context: &ExtractionContext) -> Result<ExtractionResult> {
        self.extract_generated(text, context).await.map(|g| g.value)
    }

    /// Like [`extract`](Self::extract), also returning the winning model and attempts
    pub async fn extract_generated(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<Generated<ExtractionResult>> {
        let request = self.build_request(text, context);
        self.chain
            .generate(self.backend.as_ref(), &request, |output| {
                let result = decode_result(output)?;
                for validator in &self.validators {
                    validator.validate(&result, context)?;
                }
                Ok(result)
            })
            .await
    }
}

fn decode_result(output: ModelOutput) -> Result<ExtractionResult> {
    match output {
        ModelOutput::Json(value) => serde_json::from_value(value)
            .map_err(|e| Error::Schema(format!("extraction_result: {}", e))),
        ModelOutput::Text(_) => Err(Error::Schema(
            "extraction_result: expected a JSON object".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockReply, ModelRef};
    use crate::categories::Category;
    use crate::prompts::{PromptId, PromptLibrary};

    fn stage(mock: &MockBackend, models: &[&str]) -> ExtractionStage {
        let chain =
            FallbackChain::new(models.iter().map(|m| ModelRef::mock(*m)).collect()).unwrap();
        let prompt = PromptLibrary::embedded_only()
            .load(PromptId::ExtractTransactions)
            .unwrap();
        ExtractionStage::new(Arc::new(mock.clone()), chain, prompt)
    }

    fn context() -> ExtractionContext {
        ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 7, 28).unwrap())
    }

    fn french_scenario() -> Value {
        json!({
            "incomes": [{
                "description": "Salaire",
                "amount": 10000.0,
                "category": "Salaire",
                "date": "2024-07-28"
            }],
            "expenses": [{
                "description": "Pain",
                "amount": 500.0,
                "category": "Alimentation",
                "date": "2024-07-27"
            }],
            "newBudgets": [],
            "newSavingsGoals": [],
            "savingsContributions": []
        })
    }

    #[tokio::test]
    async fn test_french_scenario_round_trips_unchanged() {
        let mock = MockBackend::new().on("primary", MockReply::Json(french_scenario()));
        let result = stage(&mock, &["primary"])
            .extract(
                "hier j'ai acheté du pain pour 500, et j'ai reçu 10000 de salaire",
                &context(),
            )
            .await
            .unwrap();

        assert_eq!(serde_json::to_value(&result).unwrap(), french_scenario());
        assert_eq!(result.expenses[0].date, "2024-07-27");
        assert_eq!(result.incomes[0].category, "Salaire");
        assert!(context().vocabulary().contains(CategoryKind::Expense, &result.expenses[0].category));
    }

    #[tokio::test]
    async fn test_prompt_interpolates_context() {
        let mock = MockBackend::new().on("primary", MockReply::Json(json!({})));
        stage(&mock, &["primary"])
            .extract("j'ai payé le taxi 2000", &context().with_currency("EUR"))
            .await
            .unwrap();

        let calls = mock.calls();
        let prompt = &calls[0].prompt;
        assert!(calls[0].json);
        assert!(prompt.contains("j'ai payé le taxi 2000"));
        assert!(prompt.contains("2024-07-28"));
        assert!(prompt.contains("EUR"));
        assert!(prompt.contains("\"Alimentation\""));
        assert!(prompt.contains("\"Salaire\""));
        assert!(!prompt.contains("{{"));
    }

    #[tokio::test]
    async fn test_missing_fields_default_to_empty() {
        let mock = MockBackend::new().on(
            "primary",
            MockReply::Json(json!({
                "expenses": [{"description": "Taxi", "amount": 2000, "category": "Transport", "date": "2024-07-28"}],
                "newBudgets": null
            })),
        );
        let result = stage(&mock, &["primary"]).extract("taxi 2000", &context()).await.unwrap();

        assert_eq!(result.expenses.len(), 1);
        assert!(result.incomes.is_empty());
        assert!(result.new_budgets.is_empty());
        let json = serde_json::to_value(&result).unwrap();
        for field in ["incomes", "expenses", "newBudgets", "newSavingsGoals", "savingsContributions"] {
            assert!(json[field].is_array(), "{} missing", field);
        }
    }

    #[tokio::test]
    async fn test_placeholder_objects_pruned() {
        let mock = MockBackend::new().on(
            "primary",
            MockReply::Text(
                r#"```json
{"incomes": [{}], "expenses": [], "newBudgets": [{}], "newSavingsGoals": [], "savingsContributions": [{}]}
```"#
                    .into(),
            ),
        );
        let result = stage(&mock, &["primary"]).extract("rien", &context()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_negative_amount_falls_back_to_next_candidate() {
        let mut bad = french_scenario();
        bad["expenses"][0]["amount"] = json!(-500);
        let mock = MockBackend::new()
            .on("primary", MockReply::Json(bad))
            .on("backup", MockReply::Json(french_scenario()));

        let generated = stage(&mock, &["primary", "backup"])
            .extract_generated("pain 500", &context())
            .await
            .unwrap();

        assert_eq!(generated.model, ModelRef::mock("backup"));
        assert_eq!(generated.value.expenses[0].amount, 500.0);
        assert!(generated.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("non-positive amount"));
    }

    #[tokio::test]
    async fn test_bad_date_rejected_and_all_fail_is_terminal() {
        let mut bad = french_scenario();
        bad["incomes"][0]["date"] = json!("28/07/2024");
        let mut impossible = french_scenario();
        impossible["incomes"][0]["date"] = json!("2024-02-30");
        let mock = MockBackend::new()
            .on("a", MockReply::Json(bad))
            .on("b", MockReply::Json(impossible));

        let err = stage(&mock, &["a", "b"])
            .extract("salaire", &context())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AllCandidatesFailed { ref attempts } if attempts.len() == 2));
        assert_eq!(mock.called_models(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_vocabulary_validator_is_opt_in() {
        let mut off_list = french_scenario();
        off_list["expenses"][0]["category"] = json!("Boulangerie");

        let mock = MockBackend::new().on("primary", MockReply::Json(off_list.clone()));
        let permissive = stage(&mock, &["primary"]).extract("pain", &context()).await;
        assert_eq!(permissive.unwrap().expenses[0].category, "Boulangerie");

        let mock = MockBackend::new()
            .on("primary", MockReply::Json(off_list))
            .on("backup", MockReply::Json(french_scenario()));
        let strict = stage(&mock, &["primary", "backup"])
            .with_validator(VocabularyValidator)
            .extract_generated("pain", &context())
            .await
            .unwrap();
        assert_eq!(strict.model, ModelRef::mock("backup"));
        assert_eq!(strict.value.expenses[0].category, "Alimentation");
    }

    #[test]
    fn test_vocabulary_validator_uses_context_vocabulary() {
        let vocabulary = CategoryVocabulary::new(
            vec![Category::new("Food", "🍔")],
            vec![Category::new("Salary", "💼")],
        )
        .unwrap();
        let ctx = context().with_vocabulary(Arc::new(vocabulary));
        let result = ExtractionResult {
            expenses: vec![TransactionEntry {
                description: "Bread".into(),
                amount: 2.0,
                category: "Food".into(),
                date: "2024-07-28".into(),
            }],
            ..Default::default()
        };
        assert!(VocabularyValidator.validate(&result, &ctx).is_ok());
        assert!(VocabularyValidator.validate(&result, &context()).is_err());
    }

    #[test]
    fn test_plan_entries_are_checked_for_amount() {
        let result = ExtractionResult {
            new_savings_goals: vec![PlanEntry {
                description: "Voyage".into(),
                amount: 0.0,
                category: "Voyage".into(),
            }],
            ..Default::default()
        };
        assert!(InvariantValidator.validate(&result, &context()).is_err());
    }

    #[test]
    fn test_actions_iterates_all_kinds() {
        let value = json!({
            "incomes": [{"description": "a", "amount": 1, "category": "Salaire", "date": "2024-01-01"}],
            "newBudgets": [{"description": "b", "amount": 2, "category": "Transport"}],
            "savingsContributions": [{"description": "c", "amount": 3, "category": "Voyage"}]
        });
        let result: ExtractionResult = serde_json::from_value(value).unwrap();
        let kinds: Vec<&str> = result.actions().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["income", "newBudget", "savingsContribution"]);
        assert_eq!(result.actions().nth(1).unwrap().date(), None);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_schema_compiles() {
        assert!(jsonschema::JSONSchema::compile(&extraction_schema()).is_ok());
    }
}
