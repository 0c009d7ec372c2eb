//! Turn-scoped pipeline state.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use uuid::Uuid;

use crate::codegen::GeneratedScript;
use crate::error::ForgeError;
use crate::executor::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    /// Tool name for tool-result messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            tool: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            tool: None,
            content: content.into(),
        }
    }

    pub fn tool(name: &str, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            tool: Some(name.to_string()),
            content: content.into(),
        }
    }
}

/// State changes a tool may request alongside its result message.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    SemanticContext(Option<String>),
}

/// What a tool hands back: a plain value for the message stream, or a
/// command that also mutates state.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Value(String),
    Command { message: String, update: StateUpdate },
}

impl ToolOutput {
    pub fn message(&self) -> &str {
        match self {
            ToolOutput::Value(text) => text,
            ToolOutput::Command { message, .. } => message,
        }
    }
}

/// The script that failed last and what it failed with.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub script: GeneratedScript,
    pub error: String,
}

/// Everything one user turn accumulates. Never shared between turns.
#[derive(Debug)]
pub struct PipelineState {
    pub turn_id: Uuid,
    pub user_request: String,
    pub messages: Vec<Message>,
    pub semantic_context: Option<String>,
    pub input_artifact_key: Option<String>,
    pub dxf_path: Option<PathBuf>,
    pub geometry: Option<String>,
    pub script: Option<GeneratedScript>,
    pub last_failure: Option<FailedAttempt>,
    pub executor_calls: usize,
    pub artifact: Option<ExecutionResult>,
    pub previews: Vec<String>,
    workdir: TempDir,
}

impl PipelineState {
    pub fn new(user_request: impl Into<String>) -> Result<Self, ForgeError> {
        let user_request = user_request.into();
        let workdir = tempfile::Builder::new().prefix("cadforge-turn-").tempdir()?;
        Ok(Self {
            turn_id: Uuid::new_v4(),
            messages: vec![Message::user(user_request.clone())],
            user_request,
            semantic_context: None,
            input_artifact_key: None,
            dxf_path: None,
            geometry: None,
            script: None,
            last_failure: None,
            executor_calls: 0,
            artifact: None,
            previews: Vec::new(),
            workdir,
        })
    }

    /// Attach an uploaded binary drawing by object-store key.
    pub fn with_drawing_key(mut self, key: impl Into<String>) -> Self {
        self.input_artifact_key = Some(key.into());
        self
    }

    /// Attach an already-converted DXF file.
    pub fn with_dxf(mut self, path: impl Into<PathBuf>) -> Self {
        self.dxf_path = Some(path.into());
        self
    }

    /// Exclusive scratch directory, removed when the state drops.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Append a tool result and apply any state change it carries.
    pub fn apply(&mut self, tool: &str, output: ToolOutput) {
        match output {
            ToolOutput::Value(text) => self.messages.push(Message::tool(tool, text)),
            ToolOutput::Command { message, update } => {
                match update {
                    StateUpdate::SemanticContext(context) => self.semantic_context = context,
                }
                self.messages.push(Message::tool(tool, message));
            }
        }
    }

    pub fn record_error(&mut self, tool: &str, err: &ForgeError) {
        self.messages
            .push(Message::tool(tool, format!("ERROR [{}]: {}", err.label(), err)));
    }

    pub fn final_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_updates_context() {
        let mut state = PipelineState::new("a bracket").unwrap();
        state.apply(
            "retrieve_examples",
            ToolOutput::Command {
                message: "4 examples".into(),
                update: StateUpdate::SemanticContext(Some("ctx".into())),
            },
        );
        assert_eq!(state.semantic_context.as_deref(), Some("ctx"));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].tool.as_deref(), Some("retrieve_examples"));
    }

    #[test]
    fn test_value_leaves_context() {
        let mut state = PipelineState::new("a bracket").unwrap();
        state.semantic_context = Some("kept".into());
        state.apply("describe_dxf", ToolOutput::Value("summary".into()));
        assert_eq!(state.semantic_context.as_deref(), Some("kept"));
    }

    #[test]
    fn test_error_message_carries_label() {
        let mut state = PipelineState::new("x").unwrap();
        state.record_error("execute_code", &ForgeError::NoArtifact("/output".into()));
        assert!(state.messages[1].content.starts_with("ERROR [NO_ARTIFACT]"));
    }

    #[test]
    fn test_workdir_removed_on_drop() {
        let state = PipelineState::new("x").unwrap();
        let dir = state.workdir().to_path_buf();
        assert!(dir.exists());
        drop(state);
        assert!(!dir.exists());
    }
}
