//! Candle inference backend for the sentence-embedding model.
//!
//! Pure-Rust BERT forward pass with mean pooling and L2 normalization, which
//! is how the MiniLM sentence-transformers checkpoints are meant to be pooled.
//! Metal is used on macOS and CUDA behind the `cuda` feature when available.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Token window of the MiniLM sentence models; longer inputs are truncated.
pub const MAX_SEQUENCE_TOKENS: usize = 256;

/// Local paths of a checkpoint fetched from the HuggingFace Hub.
pub struct ModelFiles {
    pub config_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub weights_path: PathBuf,
}

/// Fetch (or reuse from `~/.cache/huggingface/hub/`) the files of `repo_id`.
///
/// Performs synchronous network and disk I/O; call from `spawn_blocking`.
pub fn download_model(repo_id: &str) -> Result<ModelFiles> {
    let api = hf_hub::api::sync::Api::new().context("Failed to initialize HuggingFace Hub API")?;
    let repo = api.model(repo_id.to_string());

    let fetch = |name: &str| {
        repo.get(name)
            .with_context(|| format!("Failed to download {} from {}", name, repo_id))
    };

    Ok(ModelFiles {
        config_path: fetch("config.json")?,
        tokenizer_path: fetch("tokenizer.json")?,
        weights_path: fetch("model.safetensors")?,
    })
}

/// Pick a GPU when one is usable for BERT, else the CPU.
pub fn select_device() -> Device {
    #[cfg(target_os = "macos")]
    {
        if let Ok(device) = Device::new_metal(0) {
            if supports_layer_norm(&device) {
                tracing::info!("Using Metal GPU for embeddings");
                return device;
            }
            tracing::warn!("Metal GPU lacks layer-norm support, embedding on CPU");
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            if supports_layer_norm(&device) {
                tracing::info!("Using CUDA GPU for embeddings");
                return device;
            }
            tracing::warn!("CUDA GPU lacks layer-norm support, embedding on CPU");
        }
    }
    tracing::info!("Using CPU for embeddings");
    Device::Cpu
}

#[allow(dead_code)]
fn supports_layer_norm(device: &Device) -> bool {
    let probe = || -> candle_core::Result<()> {
        let ln = LayerNorm::new(
            Tensor::ones(4, DType::F32, device)?,
            Tensor::zeros(4, DType::F32, device)?,
            1e-5,
        );
        ln.forward(&Tensor::randn(0f32, 1.0, (1, 4), device)?)?;
        Ok(())
    };
    probe().is_ok()
}

/// BERT sentence embedder.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl BertEmbedder {
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(&files.config_path).context("Failed to read model config")?;
        let config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&config_str)
            .ok()
            .and_then(|v| v.get("hidden_size").and_then(|h| h.as_u64()))
            .unwrap_or(384) as usize;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the safetensors file is memory-mapped read-only and the hub
        // cache does not rewrite files in place.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to construct BERT model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
            hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Embed a batch; one unit-length vector per input, in input order.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.iter().map(String::as_str).collect::<Vec<_>>(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        for enc in &encodings {
            ids.extend_from_slice(enc.get_ids());
            mask.extend_from_slice(enc.get_attention_mask());
            type_ids.extend_from_slice(enc.get_type_ids());
        }

        let ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;
        let type_ids = Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;

        // [batch, seq_len, hidden]
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        // Mean over real tokens only
        let weights = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let pooled = hidden
            .broadcast_mul(&weights)?
            .sum(1)?
            .broadcast_div(&weights.sum(1)?)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        pooled
            .broadcast_div(&norms)?
            .to_vec2::<f32>()
            .context("Failed to read embeddings back from device")
    }
}
