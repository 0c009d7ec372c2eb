//! Fixed-order dispatcher driving one turn through the pipeline tools.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Disposition, ForgeError};
use crate::pipeline::state::{Message, PipelineState, ToolOutput};
use crate::pipeline::tools::{PipelineTools, MAX_EXECUTIONS_PER_TURN};
use crate::progress::ProgressReporter;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed {
        url: String,
        key: String,
        previews: Vec<String>,
    },
    Failed {
        label: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub outcome: TurnOutcome,
    pub executor_calls: usize,
    pub reply: String,
}

impl TurnReport {
    pub fn url(&self) -> Option<&str> {
        match &self.outcome {
            TurnOutcome::Completed { url, .. } => Some(url),
            TurnOutcome::Failed { .. } => None,
        }
    }
}

fn reply_for(outcome: &TurnOutcome, executor_calls: usize) -> String {
    match outcome {
        TurnOutcome::Completed { url, previews, .. } => {
            let mut reply = format!("Your 3D model is ready: {}", url);
            if !previews.is_empty() {
                reply.push_str("\n\nPreviews:");
                for preview in previews {
                    reply.push_str("\n- ");
                    reply.push_str(preview);
                }
            }
            reply
        }
        TurnOutcome::Failed { label, message } => {
            let attempts = if executor_calls > 1 {
                format!(" after {} attempts", executor_calls)
            } else {
                String::new()
            };
            format!("I could not build the model{} [{}]: {}", attempts, label, message)
        }
    }
}

pub struct Agent {
    tools: Arc<PipelineTools>,
}

impl Agent {
    pub fn new(tools: Arc<PipelineTools>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &Arc<PipelineTools> {
        &self.tools
    }

    /// Drive `state` through every stage and commit the final assistant
    /// message. Never fails: errors become a `Failed` outcome.
    #[instrument(name = "pipeline.turn", skip_all, fields(turn = %state.turn_id))]
    pub async fn run_turn(
        &self,
        state: &mut PipelineState,
        progress: &dyn ProgressReporter,
    ) -> TurnReport {
        let started = Instant::now();
        let outcome = match self.drive(state, progress).await {
            Ok(outcome) => outcome,
            Err(err) => TurnOutcome::Failed {
                label: err.label().to_string(),
                message: err.to_string(),
            },
        };
        let reply = reply_for(&outcome, state.executor_calls);
        state.messages.push(Message::assistant(reply.clone()));
        progress
            .report(1.0, 1.0, Some("turn finished".to_string()))
            .await;
        info!(
            executor_calls = state.executor_calls,
            ok = matches!(outcome, TurnOutcome::Completed { .. }),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn finished"
        );
        TurnReport {
            turn_id: state.turn_id,
            outcome,
            executor_calls: state.executor_calls,
            reply,
        }
    }

    async fn drive(
        &self,
        state: &mut PipelineState,
        progress: &dyn ProgressReporter,
    ) -> Result<TurnOutcome, ForgeError> {
        if state.input_artifact_key.is_some() {
            progress.stage("convert").await;
            let started = Instant::now();
            let result = self.tools.convert_dwg(state).await;
            settle(state, "convert_dwg", started, result)?;
        }

        if state.dxf_path.is_some() {
            progress.stage("describe").await;
            let started = Instant::now();
            let result = self.tools.describe_dxf(state, None).await;
            settle(state, "describe_dxf", started, result)?;
        }

        progress.stage("retrieve").await;
        let started = Instant::now();
        let result = self.tools.retrieve_examples(state, None).await;
        if let Err(err) = settle(state, "retrieve_examples", started, result) {
            if err.disposition() != Disposition::Skippable {
                return Err(err);
            }
            warn!(error = %err, "Retrieval failed, continuing without reference examples");
            state.semantic_context = None;
        }

        loop {
            progress.stage("generate").await;
            let started = Instant::now();
            let result = self.tools.generate_code(state).await;
            settle(state, "generate_code", started, result)?;

            progress.stage("execute").await;
            let started = Instant::now();
            let result = self.tools.execute_code(state).await;
            match settle(state, "execute_code", started, result) {
                Ok(()) => break,
                Err(err)
                    if err.disposition() == Disposition::Repairable
                        && state.executor_calls < MAX_EXECUTIONS_PER_TURN =>
                {
                    info!(error = %err, "Execution failed, attempting one repair");
                }
                Err(err) => return Err(err),
            }
        }

        if self.tools.renders() {
            progress.stage("render").await;
            let started = Instant::now();
            let result = self.tools.render_previews(state).await;
            if let Err(err) = settle(state, "render_previews", started, result) {
                warn!(error = %err, "Skipping previews");
            }
        }

        let artifact = state.artifact.as_ref().ok_or_else(|| {
            ForgeError::NoArtifact("executor finished without recording an artifact".into())
        })?;
        Ok(TurnOutcome::Completed {
            url: artifact.url.clone(),
            key: artifact.key.clone(),
            previews: state.previews.clone(),
        })
    }
}

/// Append a tool's result (or error) to the message stream and log the stage.
fn settle(
    state: &mut PipelineState,
    tool: &str,
    started: Instant,
    result: Result<ToolOutput, ForgeError>,
) -> Result<(), ForgeError> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            info!(turn = %state.turn_id, stage = tool, elapsed_ms, "Stage finished");
            state.apply(tool, output);
            Ok(())
        }
        Err(err) => {
            warn!(turn = %state.turn_id, stage = tool, elapsed_ms, label = err.label(), "Stage failed");
            state.record_error(tool, &err);
            Err(err)
        }
    }
}
