//! Category suggestion for a single transaction description

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::ai::{GenerateRequest, ModelBackend, ModelRef};
use crate::categories::{Category, CategoryKind, CategoryVocabulary};
use crate::error::{Error, Result};
use crate::fallback::FallbackChain;
use crate::model_router::{ModelRouter, TaskType};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Suggested category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySuggestion {
    pub category: Category,
    /// False when the model's answer was outside the vocabulary and the
    /// catch-all was substituted
    pub matched: bool,
    pub model: ModelRef,
}

#[derive(Clone)]
pub struct CategorySuggester {
    backend: Arc<dyn ModelBackend>,
    chain: FallbackChain,
    prompt: Prompt,
}

impl CategorySuggester {
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
            router.chain_for(TaskType::Completion)?,
            prompts.load(PromptId::SuggestCategory)?,
        ))
    }

    pub async fn suggest(
        &self,
        description: &str,
        kind: CategoryKind,
        amount: Option<f64>,
        vocabulary: &CategoryVocabulary,
    ) -> Result<CategorySuggestion> {
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::InvalidData("Description is empty".into()));
        }

        let categories = vocabulary.prompt_list(kind);
        let amount = amount.map(|a| a.to_string()).unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("description", description);
        vars.insert("kind_label", kind.as_str());
        vars.insert("amount", amount.as_str());
        vars.insert("categories", categories.as_str());

        let request =
            GenerateRequest::text(self.prompt.render_message(&vars)).with_temperature(0.0);

        let generated = self
            .chain
            .generate(self.backend.as_ref(), &request, |output| {
                let answer = clean_answer(&output.into_text());
                if answer.is_empty() {
                    return Err(Error::Validation("Empty category answer".into()));
                }
                Ok(answer)
            })
            .await?;

        let suggestion = match vocabulary.find_case_insensitive(kind, &generated.value) {
            Some(category) => CategorySuggestion {
                category: category.clone(),
                matched: true,
                model: generated.model,
            },
            None => {
                tracing::debug!(answer = %generated.value, "Suggested category not in vocabulary");
                CategorySuggestion {
                    category: vocabulary.catch_all(kind).clone(),
                    matched: false,
                    model: generated.model,
                }
            }
        };
        Ok(suggestion)
    }
}

/// First line of the answer, without surrounding quotes or punctuation
fn clean_answer(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '.' || c == '`')
        .trim()
        .to_string()
}
