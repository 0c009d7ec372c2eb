//! Optional LLM pass that annotates a geometry summary with design intent.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::ForgeError;
use crate::llm::{CompletionModel, CompletionRequest};

const ENHANCER_SYSTEM: &str = "You annotate textual summaries of 2D engineering drawings. \
Given the summary and the user's request, describe in a few short bullet points which \
drawing features matter for the requested 3D part and how they map to modeling operations. \
Never change or invent dimensions.";

pub const INTENT_HEADING: &str = "## Design Intent";

pub struct DescriptionEnhancer {
    model: Arc<dyn CompletionModel>,
}

impl DescriptionEnhancer {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    async fn annotate(&self, summary: &str, user_request: &str) -> Result<String, ForgeError> {
        let request = CompletionRequest {
            system: Some(ENHANCER_SYSTEM.to_string()),
            prompt: format!(
                "User request: {}\n\nGeometry summary:\n{}",
                user_request.trim(),
                summary
            ),
            temperature: 0.0,
            max_tokens: 800,
        };
        let text = self.model.complete(request).await?;
        if text.trim().is_empty() {
            return Err(ForgeError::LlmFailure("enhancer returned nothing".into()));
        }
        Ok(text)
    }

    /// The summary with an appended intent section; the raw summary when the
    /// model call fails.
    #[instrument(name = "describe.enhance", skip_all)]
    pub async fn enhance(&self, summary: &str, user_request: &str) -> String {
        match self.annotate(summary, user_request).await {
            Ok(intent) => format!("{}\n\n{}\n{}", summary.trim_end(), INTENT_HEADING, intent.trim()),
            Err(e) => {
                warn!(error = %e, "Description enhancement failed, using raw summary");
                summary.to_string()
            }
        }
    }
}
