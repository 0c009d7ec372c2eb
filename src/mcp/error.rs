use crate::error::ForgeError;
use rmcp::model::{Content, IntoContents};
use serde::Serialize;

/// Structured error response for MCP tool calls.
/// Carries error_code + suggestion so the calling model can decide its next step.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub error_code: String,
    pub message: String,
    pub suggestion: String,
    /// Whether one more generate + execute pass is allowed for this failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repairable: Option<bool>,
}

impl IntoContents for ToolError {
    fn into_contents(self) -> Vec<Content> {
        let json = serde_json::to_string(&self).unwrap_or_else(|_| self.message.clone());
        vec![Content::text(json)]
    }
}

fn suggestion_for(err: &ForgeError) -> &'static str {
    match err {
        ForgeError::LlmFailure(_) => "The model call failed. Report the failure to the user; do not retry automatically.",
        ForgeError::IndexUnavailable(_) | ForgeError::EmbeddingFailure(_) => {
            "Continue with generate_code; the script will be written without reference examples."
        }
        ForgeError::NoArtifact(_) => "Call generate_code again; the failed script and error are passed along, then execute_code once more.",
        ForgeError::ContainerFailure { .. } => "Call generate_code again to repair the script using the error output, then execute_code once more.",
        ForgeError::TimeoutExceeded { .. } => "The script ran too long. Call generate_code again for a simpler script, then execute_code once more.",
        ForgeError::UploadFailed(_) => "The object store rejected the upload. End the turn and report the failure.",
        ForgeError::AuthMissing(_) => "Credentials are missing. Tell the user which key to configure.",
        ForgeError::StructureCorrupt(_) => "The file could not be interpreted. Ask the user for a different drawing.",
        ForgeError::FileUnreadable { .. } => "Check that the path exists and is readable by the server.",
        ForgeError::EmptyModel(_) => "The model has no geometry; skip previews and return the artifact URL.",
        ForgeError::Config(_) => "Fix the server configuration and restart it.",
        ForgeError::Validation(_) => "Check the turn id and call the tools in pipeline order.",
        ForgeError::TurnLimit(_) => "The repair budget for this turn is spent. Call end_turn and report the last error.",
        ForgeError::Io(_) => "Retry the operation; if it keeps failing, end the turn.",
    }
}

impl From<ForgeError> for ToolError {
    fn from(err: ForgeError) -> Self {
        let repairable = matches!(
            err,
            ForgeError::NoArtifact(_)
                | ForgeError::ContainerFailure { .. }
                | ForgeError::TimeoutExceeded { .. }
        )
        .then_some(true);
        ToolError {
            error_code: err.label().to_string(),
            suggestion: suggestion_for(&err).to_string(),
            message: err.to_string(),
            repairable,
        }
    }
}
