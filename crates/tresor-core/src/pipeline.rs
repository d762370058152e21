//! Extraction pipeline
//!
//! Text goes straight to the extraction stage. Images are transcribed first;
//! a blank transcript ends the request with an empty result.

use std::sync::Arc;

use tracing::info;

use crate::ai::ModelBackend;
use crate::error::Result;
use crate::extraction::{ExtractionContext, ExtractionResult, ExtractionStage};
use crate::model_router::{ModelRouter, TaskType};
use crate::ocr::{ImageInput, OcrStage};
use crate::prompts::{PromptId, PromptLibrary};

/// What the user submitted
#[derive(Debug, Clone)]
pub enum ExtractionInput {
    Text(String),
    Image(ImageInput),
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    input: ExtractionInput,
    context: ExtractionContext,
}

impl ExtractionRequest {
    pub fn text(text: impl Into<String>, context: ExtractionContext) -> Self {
        Self {
            input: ExtractionInput::Text(text.into()),
            context,
        }
    }

    pub fn image(image: ImageInput, context: ExtractionContext) -> Self {
        Self {
            input: ExtractionInput::Image(image),
            context,
        }
    }

    pub fn input(&self) -> &ExtractionInput {
        &self.input
    }

    pub fn context(&self) -> &ExtractionContext {
        &self.context
    }
}

#[derive(Clone)]
pub struct ExtractionPipeline {
    ocr: OcrStage,
    extraction: ExtractionStage,
}

impl ExtractionPipeline {
    pub fn new(ocr: OcrStage, extraction: ExtractionStage) -> Self {
        Self { ocr, extraction }
    }

    /// Build both stages from the configured chains and prompts
    pub fn from_config(
        backend: Arc<dyn ModelBackend>,
        router: &ModelRouter,
        prompts: &PromptLibrary,
    ) -> Result<Self> {
        let ocr = OcrStage::from_chain(
            backend.clone(),
            &router.chain_for(TaskType::Ocr)?,
            prompts.load(PromptId::TranscribeImage)?,
        );
        let extraction = ExtractionStage::new(
            backend,
            router.chain_for(TaskType::Extraction)?,
            prompts.load(PromptId::ExtractTransactions)?,
        );
        Ok(Self::new(ocr, extraction))
    }

    pub async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionResult> {
        match request.input() {
            ExtractionInput::Text(text) => self.extraction.extract(text, request.context()).await,
            ExtractionInput::Image(image) => {
                let transcript = self.ocr.transcribe(image).await?;
                if transcript.trim().is_empty() {
                    info!("OCR found no text, skipping extraction");
                    return Ok(ExtractionResult::default());
                }
                self.extraction.extract(&transcript, request.context()).await
            }
        }
    }
}
