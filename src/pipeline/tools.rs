//! The pipeline's tools. Each takes the turn state, does one step and hands
//! back a [`ToolOutput`]; the caller appends it to the message stream.

use std::sync::Arc;

use tracing::warn;

use crate::codegen::{CodeGenerator, GenerationInput, PreviousAttempt};
use crate::dxf::{describe_file, FilterConfig};
use crate::error::{Disposition, ForgeError};
use crate::executor::CodeExecutor;
use crate::pipeline::convert::DwgConverter;
use crate::pipeline::enhance::DescriptionEnhancer;
use crate::pipeline::state::{FailedAttempt, PipelineState, StateUpdate, ToolOutput};
use crate::render::Renderer;
use crate::retrieval::Retriever;
use crate::storage::{key_from_reference, mime_for, ArtifactStore};

/// Upper bound on code-executor calls inside one turn.
pub const MAX_EXECUTIONS_PER_TURN: usize = 2;

/// Geometry text used when the turn carries no drawing.
pub const NO_DRAWING: &str =
    "No drawing was attached. Build the part from the user request alone.";

pub struct PipelineTools {
    store: ArtifactStore,
    converter: DwgConverter,
    filter: FilterConfig,
    enhancer: Option<DescriptionEnhancer>,
    retriever: Option<Arc<Retriever>>,
    generator: CodeGenerator,
    executor: CodeExecutor,
    renderer: Option<Renderer>,
}

impl PipelineTools {
    pub fn new(
        store: ArtifactStore,
        converter: DwgConverter,
        generator: CodeGenerator,
        executor: CodeExecutor,
    ) -> Self {
        Self {
            store,
            converter,
            filter: FilterConfig::default(),
            enhancer: None,
            retriever: None,
            generator,
            executor,
            renderer: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_enhancer(mut self, enhancer: DescriptionEnhancer) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn renders(&self) -> bool {
        self.renderer.is_some()
    }

    /// Download the attached drawing and convert it to DXF.
    pub async fn convert_dwg(&self, state: &mut PipelineState) -> Result<ToolOutput, ForgeError> {
        let reference = state
            .input_artifact_key
            .clone()
            .ok_or_else(|| ForgeError::Validation("no drawing is attached to this turn".into()))?;
        let key = key_from_reference(&reference).to_string();
        let work = state.workdir().join("convert");
        tokio::fs::create_dir_all(&work).await?;

        let file_name = key.rsplit('/').next().unwrap_or("drawing.dwg").to_string();
        let dwg = self.store.download_into(&key, &work, &file_name).await?;
        let dxf = self.converter.convert(&dwg, &work).await?;
        let message = format!("Converted {} to {}", key, dxf.display());
        state.dxf_path = Some(dxf);
        Ok(ToolOutput::Value(message))
    }

    /// Summarize the turn's DXF. `filter` overrides the configured filter.
    pub async fn describe_dxf(
        &self,
        state: &mut PipelineState,
        filter: Option<FilterConfig>,
    ) -> Result<ToolOutput, ForgeError> {
        let path = state.dxf_path.clone().ok_or_else(|| {
            ForgeError::Validation("no DXF available; attach a drawing or convert one first".into())
        })?;
        let filter = filter.unwrap_or_else(|| self.filter.clone());
        let summary = describe_file(&path, &filter)?;

        let document = match &self.enhancer {
            Some(enhancer) if !summary.is_empty() => {
                enhancer
                    .enhance(&summary.document, &state.user_request)
                    .await
            }
            _ => summary.document,
        };
        state.geometry = Some(document.clone());
        Ok(ToolOutput::Value(document))
    }

    /// Fetch reference examples for `query` (the user request by default)
    /// and replace the turn's semantic context.
    pub async fn retrieve_examples(
        &self,
        state: &PipelineState,
        query: Option<&str>,
    ) -> Result<ToolOutput, ForgeError> {
        let retriever = self
            .retriever
            .as_ref()
            .ok_or_else(|| ForgeError::IndexUnavailable("no vector index is configured".into()))?;
        let outcome = retriever
            .retrieve(query.unwrap_or(&state.user_request))
            .await?;

        let message = match (&outcome.context, &outcome.warning) {
            (Some(context), _) => format!(
                "Retrieved {} reference examples.\n\n{}",
                outcome.hits.len(),
                context
            ),
            (None, Some(warning)) => warning.clone(),
            (None, None) => "No reference examples retrieved.".to_string(),
        };
        Ok(ToolOutput::Command {
            message,
            update: StateUpdate::SemanticContext(outcome.context),
        })
    }

    /// Generate a script. After a repairable execution failure the failed
    /// script and its error are passed along.
    pub async fn generate_code(&self, state: &mut PipelineState) -> Result<ToolOutput, ForgeError> {
        let geometry = state.geometry.as_deref().unwrap_or(NO_DRAWING);
        let input = GenerationInput {
            user_request: &state.user_request,
            geometry,
            semantic_context: state.semantic_context.as_deref(),
            previous: state.last_failure.as_ref().map(|f| PreviousAttempt {
                script: f.script.as_str(),
                error: &f.error,
            }),
        };
        let script = self.generator.generate(&input).await?;
        let message = format!(
            "Generated script ({} lines):\n{}",
            script.as_str().lines().count(),
            script.as_str()
        );
        state.script = Some(script);
        Ok(ToolOutput::Value(message))
    }

    /// Run the current script. Refuses once the turn's budget is spent.
    pub async fn execute_code(&self, state: &mut PipelineState) -> Result<ToolOutput, ForgeError> {
        if state.executor_calls >= MAX_EXECUTIONS_PER_TURN {
            return Err(ForgeError::TurnLimit(format!(
                "code executor already ran {} times this turn",
                state.executor_calls
            )));
        }
        let script = state
            .script
            .clone()
            .ok_or_else(|| ForgeError::Validation("no script has been generated yet".into()))?;

        state.executor_calls += 1;
        match self.executor.execute(&script).await {
            Ok(result) => {
                let message = format!("3D model stored at {}", result.url);
                state.last_failure = None;
                state.artifact = Some(result);
                Ok(ToolOutput::Value(message))
            }
            Err(err) => {
                if err.disposition() == Disposition::Repairable {
                    state.last_failure = Some(FailedAttempt {
                        script,
                        error: err.repair_context(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Capture previews of the turn's artifact and upload them.
    pub async fn render_previews(
        &self,
        state: &mut PipelineState,
    ) -> Result<ToolOutput, ForgeError> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| ForgeError::Validation("preview rendering is disabled".into()))?;
        let artifact = state
            .artifact
            .as_ref()
            .ok_or_else(|| ForgeError::Validation("no artifact to render yet".into()))?;

        let prefix = artifact
            .key
            .rsplit('/')
            .next()
            .and_then(|name| name.split('.').next())
            .unwrap_or("preview")
            .to_string();
        let frames = renderer
            .render_async(
                artifact.artifact.clone(),
                state.workdir().join("previews"),
                prefix,
            )
            .await?;

        let uploads = frames.frames.iter().map(|frame| async move {
            let bytes = tokio::fs::read(&frame.path).await?;
            self.store.upload_new("png", bytes, mime_for("png")).await
        });
        // join_all keeps pose order
        let uploaded = futures::future::join_all(uploads).await;

        let mut urls = Vec::with_capacity(frames.len());
        for (frame, result) in frames.frames.iter().zip(uploaded) {
            match result {
                Ok(stored) => urls.push(stored.url),
                Err(e) => warn!(frame = frame.name, error = %e, "Preview upload failed"),
            }
        }
        let message = format!("Captured {} preview image(s):\n{}", urls.len(), urls.join("\n"));
        state.previews = urls;
        Ok(ToolOutput::Value(message))
    }
}
