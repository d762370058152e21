//! Tresor Core Library
//!
//! AI extraction pipeline for the Tresor finance app:
//! - Provider backends (Gemini, OpenAI-compatible, Ollama, mock) behind one trait
//! - Ordered model fallback with per-attempt timeouts and schema validation
//! - OCR of receipts and screenshots
//! - Structured extraction of incomes, expenses, budgets and savings actions
//! - Single receipt scanning and category suggestion
//! - Prompt library and model chain configuration with user overrides

pub mod ai;
pub mod categories;
pub mod categorize;
pub mod error;
pub mod extraction;
pub mod fallback;
pub mod model_router;
pub mod ocr;
pub mod pipeline;
pub mod prompts;
pub mod receipt;

/// Test utilities including a mock provider HTTP server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIClient, GeminiBackend, GenerateRequest, MockBackend, MockReply, ModelBackend, ModelOutput,
    ModelRef, OllamaBackend, OpenAICompatibleBackend, OutputContract, PromptPart, Provider,
    ProviderHealth,
};
pub use categories::{Category, CategoryKind, CategoryVocabulary};
pub use categorize::{CategorySuggester, CategorySuggestion};
pub use error::{Error, Result};
pub use extraction::{
    ExtractedAction, ExtractionContext, ExtractionResult, ExtractionStage, InvariantValidator,
    PlanEntry, ResultValidator, TransactionEntry, VocabularyValidator, DEFAULT_CURRENCY,
};
pub use fallback::{FallbackChain, Generated, ModelAttempt};
pub use model_router::{ChainConfig, ModelRouter, RouterConfig, TaskType};
pub use ocr::{ImageInput, OcrStage};
pub use pipeline::{ExtractionInput, ExtractionPipeline, ExtractionRequest};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use receipt::{ReceiptScanner, ScannedReceipt};
