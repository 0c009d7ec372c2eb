//! Test harness wiring the real pipeline to in-process fakes.
//!
//! Each TestHarness owns a temporary directory holding the local object
//! store and any drawings a test writes. Everything is removed on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use cadforge::config::Settings;
use cadforge::container::ContainerRunner;
use cadforge::embedding::EmbeddingService;
use cadforge::init::build_tools;
use cadforge::llm::CompletionModel;
use cadforge::mcp::ForgeServer;
use cadforge::pipeline::{Agent, PipelineTools};
use cadforge::render::Renderer;
use cadforge::retrieval::{Retriever, VectorIndex};
use cadforge::storage::{ArtifactStore, LocalObjectStore};

use super::fakes::{FixedEmbedder, MemoryIndex, RunBehavior, ScriptedCompletion, ScriptedRunner};
use super::fixtures::GOOD_SCRIPT;

pub struct TestHarness {
    pub runner: Arc<ScriptedRunner>,
    pub completion: Arc<ScriptedCompletion>,
    pub store: ArtifactStore,
    pub tools: Arc<PipelineTools>,
    pub agent: Arc<Agent>,
    pub objects: PathBuf,
    pub temp_dir: TempDir,
}

/// Builder for [`TestHarness`]; defaults to a healthy pipeline with four
/// indexed examples and rendering switched off.
pub struct HarnessBuilder {
    runs: Vec<RunBehavior>,
    replies: Vec<String>,
    index: MemoryIndex,
    render: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            replies: Vec::new(),
            index: MemoryIndex::with_examples(4),
            render: false,
        }
    }
}

impl HarnessBuilder {
    pub fn runs(mut self, runs: impl IntoIterator<Item = RunBehavior>) -> Self {
        self.runs.extend(runs);
        self
    }

    pub fn replies(mut self, replies: &[&str]) -> Self {
        self.replies.extend(replies.iter().map(|r| r.to_string()));
        self
    }

    pub fn index(mut self, index: MemoryIndex) -> Self {
        self.index = index;
        self
    }

    pub fn render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    pub fn build(self) -> TestHarness {
        let temp_dir = TempDir::new().expect("Failed to create temp directory for test harness");
        let objects = temp_dir.path().join("objects");
        let store = ArtifactStore::new(Arc::new(LocalObjectStore::new(&objects)));

        let mut settings = Settings::default();
        settings.render.enabled = self.render;
        settings.render.width = 64;
        settings.render.height = 48;
        settings.index.top_k = 4;

        let runner = Arc::new(ScriptedRunner::new(self.runs));
        let replies: Vec<&str> = self.replies.iter().map(String::as_str).collect();
        let completion = Arc::new(ScriptedCompletion::new(&replies, GOOD_SCRIPT));

        let embedder: Arc<dyn EmbeddingService> = Arc::new(FixedEmbedder);
        let index: Arc<dyn VectorIndex> = Arc::new(self.index);
        let retriever = Arc::new(Retriever::new(embedder, index, settings.index.top_k));

        let tools = Arc::new(build_tools(
            &settings,
            store.clone(),
            runner.clone() as Arc<dyn ContainerRunner>,
            retriever,
            completion.clone() as Arc<dyn CompletionModel>,
            Renderer::new(&settings.render),
        ));
        let agent = Arc::new(Agent::new(tools.clone()));

        TestHarness {
            runner,
            completion,
            store,
            tools,
            agent,
            objects,
            temp_dir,
        }
    }
}

impl TestHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Write `content` under the harness directory and return its path.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.objects.join(key)
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn server(&self) -> ForgeServer {
        ForgeServer::new(self.agent.clone())
    }
}
