use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Message, PipelineState, Role, TurnOutcome, TurnReport};

/// Open a turn.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StartTurnInput {
    /// Natural-language description of the part to build
    pub prompt: String,
    /// Object-store key (or `/files/by-key/...` URL) of an uploaded DWG drawing
    #[serde(default)]
    pub drawing_key: Option<String>,
    /// Path to a DXF file readable by the server, when no DWG is attached
    #[serde(default)]
    pub dxf_path: Option<String>,
}

/// Identifies the turn a tool call belongs to.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TurnInput {
    pub turn_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeInput {
    pub turn_id: String,
    /// Describe this DXF instead of the turn's converted drawing
    #[serde(default)]
    pub dxf_path: Option<String>,
    /// Keep every entity (disables type and layer filters)
    #[serde(default)]
    pub include_all: bool,
    /// Extra layers to drop, case-insensitive
    #[serde(default)]
    pub exclude_layers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RetrieveInput {
    pub turn_id: String,
    /// Search text; defaults to the turn's prompt
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunPipelineInput {
    pub prompt: String,
    #[serde(default)]
    pub drawing_key: Option<String>,
    #[serde(default)]
    pub dxf_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StartTurnResponse {
    pub turn_id: String,
    /// Suggested tool order for this turn
    pub next_tools: Vec<String>,
}

/// Result of one pipeline tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StepResponse {
    pub turn_id: String,
    pub tool: String,
    pub message: String,
    pub executor_calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<String>,
}

impl StepResponse {
    pub fn from_state(state: &PipelineState, tool: &str, message: String) -> Self {
        Self {
            turn_id: state.turn_id.to_string(),
            tool: tool.to_string(),
            message,
            executor_calls: state.executor_calls,
            artifact_url: state.artifact.as_ref().map(|a| a.url.clone()),
            previews: state.previews.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TranscriptEntry {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub content: String,
}

impl From<&Message> for TranscriptEntry {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string(),
            tool: m.tool.clone(),
            content: m.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EndTurnResponse {
    pub turn_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    pub executor_calls: usize,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TurnReportResponse {
    pub turn_id: String,
    /// `completed` or `failed`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub executor_calls: usize,
    pub reply: String,
}

impl From<TurnReport> for TurnReportResponse {
    fn from(report: TurnReport) -> Self {
        let (status, artifact_url, previews, error_code) = match report.outcome {
            TurnOutcome::Completed { url, previews, .. } => {
                ("completed", Some(url), previews, None)
            }
            TurnOutcome::Failed { label, .. } => ("failed", None, Vec::new(), Some(label)),
        };
        Self {
            turn_id: report.turn_id.to_string(),
            status: status.to_string(),
            artifact_url,
            previews,
            error_code,
            executor_calls: report.executor_calls,
            reply: report.reply,
        }
    }
}
