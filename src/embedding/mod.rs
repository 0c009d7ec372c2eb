//! Sentence embeddings for example retrieval.
//!
//! [`EmbeddingService`] abstracts the encoder so the retriever can be tested
//! with deterministic fakes; [`LocalEmbeddingService`] runs the MiniLM model
//! in-process through candle.

pub mod candle_backend;
pub mod model;

use async_trait::async_trait;

use crate::error::ForgeError;

pub use model::LocalEmbeddingService;

/// Output width of all-MiniLM-L6-v2, and the width of the example collection.
pub const EMBEDDING_DIMENSIONS: usize = 384;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed one text into an L2-normalized vector.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ForgeError>;

    /// Embed several texts; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ForgeError>;

    fn dimensions(&self) -> usize;
}

/// Embedding service that always fails; used when retrieval is switched off.
pub struct NoopEmbeddingService;

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ForgeError> {
        Err(ForgeError::EmbeddingFailure(
            "Embedding service is not available (noop)".to_string(),
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ForgeError> {
        Err(ForgeError::EmbeddingFailure(
            "Embedding service is not available (noop)".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}
