//! In-process embedding service backed by candle.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::EmbeddingSettings;
use crate::embedding::candle_backend::{download_model, select_device, BertEmbedder};
use crate::embedding::{EmbeddingService, EMBEDDING_DIMENSIONS};
use crate::error::ForgeError;

/// Lazily loaded local model with a query-embedding cache.
///
/// The model is fetched and loaded on first use inside `spawn_blocking`, so
/// commands that never embed (describe, render) pay nothing for it.
pub struct LocalEmbeddingService {
    model_id: String,
    embedder: OnceCell<Arc<BertEmbedder>>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl LocalEmbeddingService {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            model_id: settings.model.clone(),
            embedder: OnceCell::new(),
            cache: Cache::builder()
                .max_capacity(settings.cache_capacity)
                .build(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embedder(&self) -> Result<Arc<BertEmbedder>, ForgeError> {
        self.embedder
            .get_or_try_init(|| async {
                let repo_id = self.model_id.clone();
                info!(model = %repo_id, "Loading embedding model");
                let loaded = tokio::task::spawn_blocking(move || {
                    let files = download_model(&repo_id)?;
                    BertEmbedder::new(&files, select_device())
                })
                .await
                .map_err(|e| ForgeError::EmbeddingFailure(format!("Task join error: {}", e)))?
                .map_err(|e| ForgeError::EmbeddingFailure(format!("{:#}", e)))?;

                if loaded.hidden_size() != EMBEDDING_DIMENSIONS {
                    return Err(ForgeError::EmbeddingFailure(format!(
                        "Model {} produces {}-dim vectors, index expects {}",
                        self.model_id,
                        loaded.hidden_size(),
                        EMBEDDING_DIMENSIONS
                    )));
                }
                Ok(Arc::new(loaded))
            })
            .await
            .cloned()
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ForgeError> {
        let embedder = self.embedder().await?;
        tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| ForgeError::EmbeddingFailure(format!("Task join error: {}", e)))?
            .map_err(|e| ForgeError::EmbeddingFailure(format!("{:#}", e)))
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ForgeError> {
        if let Some(cached) = self.cache.get(text).await {
            debug!("Query embedding cache hit");
            return Ok(cached.as_ref().clone());
        }

        let vector = self
            .run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ForgeError::EmbeddingFailure("No embedding returned".to_string()))?;

        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ForgeError> {
        // Keeps peak activation memory bounded for large index files
        const CHUNK: usize = 32;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(CHUNK) {
            out.extend(self.run(chunk.to_vec()).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}
