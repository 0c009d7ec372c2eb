//! Deterministic stand-ins for the container engine, the vector index, the
//! embedding model and the completion model.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use cadforge::container::{ContainerRunner, RunOutput, RunSpec};
use cadforge::embedding::{EmbeddingService, EMBEDDING_DIMENSIONS};
use cadforge::executor::OUTPUT_MOUNT;
use cadforge::llm::{CompletionModel, CompletionRequest};
use cadforge::pipeline::convert::CONVERT_MOUNT;
use cadforge::retrieval::{ExamplePayload, IndexPoint, ScoredPoint, VectorIndex};
use cadforge::ForgeError;

use super::fixtures::CUBE_VTP;

/// What the next container run does.
#[derive(Debug, Clone)]
pub enum RunBehavior {
    /// Write `model.vtp` into the output mount and exit 0
    WriteArtifact,
    /// Exit 0 without writing anything
    WriteNothing,
    /// Exit non-zero with the given stderr
    Fail { exit_code: i64, stderr: String },
    /// Write the given DXF text as the converter output
    Convert(String),
}

/// Container runner that plays back a queue of behaviors. An empty queue
/// behaves like [`RunBehavior::WriteArtifact`].
#[derive(Default)]
pub struct ScriptedRunner {
    queue: Mutex<VecDeque<RunBehavior>>,
    specs: Mutex<Vec<RunSpec>>,
}

impl ScriptedRunner {
    pub fn new(behaviors: impl IntoIterator<Item = RunBehavior>) -> Self {
        Self {
            queue: Mutex::new(behaviors.into_iter().collect()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn specs(&self) -> Vec<RunSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Runs whose argv starts with the python interpreter.
    pub fn executor_runs(&self) -> usize {
        self.specs()
            .iter()
            .filter(|s| s.argv.first().map(String::as_str) == Some("python3"))
            .count()
    }

    fn mount(spec: &RunSpec, container: &str) -> Option<PathBuf> {
        spec.mounts
            .iter()
            .find(|m| m.container == container)
            .map(|m| m.host.clone())
    }
}

#[async_trait]
impl ContainerRunner for ScriptedRunner {
    async fn run(&self, spec: RunSpec) -> Result<RunOutput, ForgeError> {
        let behavior = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunBehavior::WriteArtifact);
        self.specs.lock().unwrap().push(spec.clone());

        match behavior {
            RunBehavior::WriteArtifact => {
                let out = Self::mount(&spec, OUTPUT_MOUNT).expect("executor output mount");
                std::fs::write(out.join("model.vtp"), CUBE_VTP)?;
                std::fs::write(out.join("model.step"), "ISO-10303-21;")?;
            }
            RunBehavior::WriteNothing => {}
            RunBehavior::Fail { exit_code, stderr } => {
                return Err(ForgeError::ContainerFailure {
                    exit_code,
                    stdout: String::new(),
                    stderr,
                });
            }
            RunBehavior::Convert(dxf) => {
                let data = Self::mount(&spec, CONVERT_MOUNT).expect("converter data mount");
                let target = spec
                    .argv
                    .last()
                    .and_then(|p| p.strip_prefix(&format!("{}/", CONVERT_MOUNT)))
                    .expect("converter output argument")
                    .to_string();
                std::fs::write(data.join(target), dxf)?;
            }
        }

        Ok(RunOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(3),
        })
    }
}

/// Completion model returning queued replies, then `fallback`.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[&str], fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ForgeError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Returns the same unit vector for every text.
pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ForgeError> {
        let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
        v[0] = 1.0;
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ForgeError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed_text(t).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

/// In-memory index returning its points in insertion order, scored by
/// position so the retriever's ordering is observable.
#[derive(Default)]
pub struct MemoryIndex {
    points: Mutex<Vec<ExamplePayload>>,
    unavailable: bool,
}

impl MemoryIndex {
    pub fn with_examples(count: usize) -> Self {
        let points = (0..count)
            .map(|i| ExamplePayload {
                description: format!("example part {}", i),
                script: format!("result = cq.Workplane('XY').box({}, 1, 1)", i + 1),
            })
            .collect();
        Self {
            points: Mutex::new(points),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            unavailable: true,
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(&self, _vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, ForgeError> {
        if self.unavailable {
            return Err(ForgeError::IndexUnavailable("connection refused".into()));
        }
        let points = self.points.lock().unwrap();
        // Lowest score first, to check the retriever sorts
        Ok(points
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, payload)| ScoredPoint {
                score: 0.5 + i as f32 * 0.1,
                payload: payload.clone(),
            })
            .collect())
    }

    async fn ensure_collection(&self, _dimensions: usize) -> Result<(), ForgeError> {
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), ForgeError> {
        self.points
            .lock()
            .unwrap()
            .extend(points.into_iter().map(|p| p.payload));
        Ok(())
    }
}
