//! Shared initialization logic for MCP and CLI modes.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codegen::CodeGenerator;
use crate::config::{resolve_data_path, Settings};
use crate::container::docker::DockerCli;
use crate::container::{ContainerBridge, ContainerRunner};
use crate::dxf::FilterConfig;
use crate::embedding::{EmbeddingService, LocalEmbeddingService};
use crate::executor::CodeExecutor;
use crate::llm::{completion_model, CompletionModel};
use crate::pipeline::{Agent, DescriptionEnhancer, DwgConverter, PipelineTools};
use crate::render::Renderer;
use crate::retrieval::qdrant::QdrantIndex;
use crate::retrieval::{Retriever, VectorIndex};
use crate::storage::ArtifactStore;

/// Application context holding every pipeline component.
///
/// Shared between MCP server and CLI commands. Nothing here touches the
/// network on construction; models and connections are established on
/// first use.
pub struct AppContext {
    pub data_path: PathBuf,
    pub settings: Settings,
    pub store: ArtifactStore,
    pub runner: Arc<dyn ContainerRunner>,
    pub embedding_service: Arc<dyn EmbeddingService>,
    pub index: Arc<dyn VectorIndex>,
    pub retriever: Arc<Retriever>,
    pub completion: Arc<dyn CompletionModel>,
    pub renderer: Renderer,
    pub tools: Arc<PipelineTools>,
    pub agent: Arc<Agent>,
}

impl AppContext {
    /// Initialize application context.
    ///
    /// Data path priority: explicit path > CADFORGE_DATA_PATH env > ./.cadforge (if exists) > ~/.cadforge
    pub async fn new(explicit_path: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        tracing::info!("Using data path: {}", data_path.display());
        tokio::fs::create_dir_all(&data_path).await?;

        let settings = Settings::load(&data_path, config.as_deref())?;
        Ok(Self::from_settings(data_path, settings))
    }

    pub fn from_settings(data_path: PathBuf, settings: Settings) -> Self {
        let store = ArtifactStore::from_settings(&settings.storage, &data_path);
        tracing::info!(backend = ?settings.storage.backend, "Object store configured");

        let runner: Arc<dyn ContainerRunner> = Arc::new(ContainerBridge::new(DockerCli::new(
            settings.containers.engine.clone(),
        )));

        let embedding_service: Arc<dyn EmbeddingService> =
            Arc::new(LocalEmbeddingService::new(&settings.embedding));
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&settings.index));
        let retriever = Arc::new(Retriever::new(
            embedding_service.clone(),
            index.clone(),
            settings.index.top_k,
        ));

        let completion = completion_model(&settings.llm);
        tracing::info!(model = completion.model_name(), "Completion model configured");

        let renderer = Renderer::new(&settings.render);
        let tools = Arc::new(build_tools(
            &settings,
            store.clone(),
            runner.clone(),
            retriever.clone(),
            completion.clone(),
            renderer.clone(),
        ));
        let agent = Arc::new(Agent::new(tools.clone()));

        Self {
            data_path,
            settings,
            store,
            runner,
            embedding_service,
            index,
            retriever,
            completion,
            renderer,
            tools,
            agent,
        }
    }

    pub fn converter(&self) -> DwgConverter {
        DwgConverter::new(self.runner.clone(), &self.settings.containers)
    }
}

/// Wire the pipeline tools from settings and already-built components.
pub fn build_tools(
    settings: &Settings,
    store: ArtifactStore,
    runner: Arc<dyn ContainerRunner>,
    retriever: Arc<Retriever>,
    completion: Arc<dyn CompletionModel>,
    renderer: Renderer,
) -> PipelineTools {
    let converter = DwgConverter::new(runner.clone(), &settings.containers);
    let generator = CodeGenerator::new(completion.clone(), &settings.llm);
    let executor = CodeExecutor::new(runner, store.clone(), &settings.containers);

    let mut tools = PipelineTools::new(store, converter, generator, executor)
        .with_filter(FilterConfig {
            include_all: false,
            exclude_layers: settings.describe.exclude_layers.clone(),
        })
        .with_retriever(retriever);
    if settings.describe.enhance {
        tools = tools.with_enhancer(DescriptionEnhancer::new(completion));
    }
    if settings.render.enabled {
        tools = tools.with_renderer(renderer);
    }
    tools
}
