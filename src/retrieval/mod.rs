//! Semantic retrieval of prior (description, script) examples.

pub mod qdrant;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingService;
use crate::error::ForgeError;

pub use qdrant::QdrantIndex;

/// Separator placed between hits in the context block.
pub const HIT_DELIMITER: &str = "-----";

/// Payload stored with every point of the example collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplePayload {
    pub description: String,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub score: f32,
    pub payload: ExamplePayload,
}

#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ExamplePayload,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `vector`, at most `limit`.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, ForgeError>;

    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), ForgeError>;

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), ForgeError>;
}

/// One retrieved example.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub description: String,
    pub script: String,
    pub score: f32,
}

impl RetrievalHit {
    fn render(&self) -> String {
        format!(
            "prompt: {}\n{}\nGenerated script is\n{}\n",
            self.description, HIT_DELIMITER, self.script
        )
    }
}

/// Result of one retrieval.
///
/// `context` is `Some` only when exactly `top_k` hits came back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalOutcome {
    pub hits: Vec<RetrievalHit>,
    pub context: Option<String>,
    pub warning: Option<String>,
}

/// Join hits into the block handed to the code generator.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(RetrievalHit::render)
        .collect::<Vec<_>>()
        .join(&format!("{}\n", HIT_DELIMITER))
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[instrument(name = "retrieval.search", skip_all, fields(k = self.top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalOutcome, ForgeError> {
        let vector = self.embedder.embed_text(query).await?;
        let mut points = self.index.search(&vector, self.top_k).await?;
        points.sort_by(|a, b| b.score.total_cmp(&a.score));
        points.truncate(self.top_k);

        let hits: Vec<RetrievalHit> = points
            .into_iter()
            .map(|p| RetrievalHit {
                description: p.payload.description,
                script: p.payload.script,
                score: p.score,
            })
            .collect();

        if hits.len() < self.top_k {
            let warning = format!(
                "Index returned {} of {} requested examples; continuing without reference examples",
                hits.len(),
                self.top_k
            );
            warn!("{}", warning);
            return Ok(RetrievalOutcome {
                hits,
                context: None,
                warning: Some(warning),
            });
        }

        info!(
            best = hits.first().map(|h| h.score).unwrap_or_default(),
            "Retrieved reference examples"
        );
        Ok(RetrievalOutcome {
            context: Some(format_context(&hits)),
            hits,
            warning: None,
        })
    }

    /// Embed and upsert examples, creating the collection when missing.
    #[instrument(name = "retrieval.index", skip_all, fields(count = examples.len()))]
    pub async fn index_examples(&self, examples: Vec<ExamplePayload>) -> Result<usize, ForgeError> {
        self.index
            .ensure_collection(self.embedder.dimensions())
            .await?;
        let descriptions: Vec<String> = examples.iter().map(|e| e.description.clone()).collect();
        let vectors = self.embedder.embed_batch(&descriptions).await?;
        if vectors.len() != examples.len() {
            return Err(ForgeError::EmbeddingFailure(format!(
                "Expected {} embeddings, got {}",
                examples.len(),
                vectors.len()
            )));
        }

        let points: Vec<IndexPoint> = examples
            .into_iter()
            .zip(vectors)
            .map(|(payload, vector)| IndexPoint {
                id: Uuid::new_v4(),
                vector,
                payload,
            })
            .collect();
        let count = points.len();
        self.index.upsert(points).await?;
        info!(count, "Indexed examples");
        Ok(count)
    }
}

/// Parse a JSON-lines file of `{"description": .., "script": ..}` records.
/// Blank lines are ignored.
pub fn parse_examples_jsonl(text: &str) -> Result<Vec<ExamplePayload>, ForgeError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<ExamplePayload>(line).map_err(|e| {
                ForgeError::Validation(format!("Line {}: invalid example record: {}", idx + 1, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NoopEmbeddingService;
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingService for FixedEmbedder {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ForgeError> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ForgeError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    #[derive(Default)]
    struct MemoryIndex {
        points: Mutex<Vec<ScoredPoint>>,
    }

    impl MemoryIndex {
        fn with_scores(scores: &[f32]) -> Self {
            let points = scores
                .iter()
                .enumerate()
                .map(|(i, s)| ScoredPoint {
                    score: *s,
                    payload: ExamplePayload {
                        description: format!("example {}", i),
                        script: format!("result = {}", i),
                    },
                })
                .collect();
            Self {
                points: Mutex::new(points),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn search(&self, _v: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, ForgeError> {
            let points = self.points.lock().unwrap();
            Ok(points.iter().take(limit).cloned().collect())
        }
        async fn ensure_collection(&self, _dimensions: usize) -> Result<(), ForgeError> {
            Ok(())
        }
        async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), ForgeError> {
            let mut stored = self.points.lock().unwrap();
            stored.extend(points.into_iter().map(|p| ScoredPoint {
                score: 0.5,
                payload: p.payload,
            }));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hits_sorted_descending_with_context() {
        let retriever = Retriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(MemoryIndex::with_scores(&[0.2, 0.9, 0.5, 0.7])),
            4,
        );
        let outcome = retriever.retrieve("bracket with holes").await.unwrap();
        let scores: Vec<f32> = outcome.hits.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5, 0.2]);

        let context = outcome.context.unwrap();
        assert!(context.starts_with("prompt: example 1\n-----\nGenerated script is\nresult = 1\n"));
        assert_eq!(context.matches("Generated script is").count(), 4);
    }

    #[tokio::test]
    async fn test_fewer_than_k_leaves_context_empty() {
        let retriever = Retriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(MemoryIndex::with_scores(&[0.9, 0.8])),
            4,
        );
        let outcome = retriever.retrieve("plate").await.unwrap();
        assert!(outcome.context.is_none());
        assert!(outcome.warning.is_some());
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let retriever = Retriever::new(
            Arc::new(NoopEmbeddingService),
            Arc::new(MemoryIndex::default()),
            4,
        );
        let err = retriever.retrieve("plate").await.unwrap_err();
        assert_eq!(err.label(), "EMBEDDING_FAILURE");
    }

    #[tokio::test]
    async fn test_index_examples_upserts_all() {
        let index = Arc::new(MemoryIndex::default());
        let retriever = Retriever::new(Arc::new(FixedEmbedder), index.clone(), 4);
        let examples = parse_examples_jsonl(
            "{\"description\":\"a\",\"script\":\"x\"}\n\n{\"description\":\"b\",\"script\":\"y\"}\n",
        )
        .unwrap();
        assert_eq!(retriever.index_examples(examples).await.unwrap(), 2);
        assert_eq!(index.points.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_jsonl_error_names_line() {
        let err = parse_examples_jsonl("{\"description\":\"a\",\"script\":\"x\"}\nnot json").unwrap_err();
        assert!(err.to_string().contains("Line 2"));
    }
}
