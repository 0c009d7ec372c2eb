//! Settings loading.
//!
//! Priority: explicit config file > `{data_path}/cadforge.toml` > defaults,
//! then environment variables overlay individual fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ForgeError;

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub containers: ContainerSettings,
    pub describe: DescribeSettings,
    pub render: RenderSettings,
}

/// Which object-store backend receives uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    /// Custom S3-compatible endpoint (path-style addressing when set)
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Root directory for the local backend (default: `{data_path}/objects`)
    pub local_root: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: "cadforge-artifacts".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            local_root: None,
        }
    }
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("local_root", &self.local_root)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub top_k: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "cad_scripts".to_string(),
            top_k: 4,
        }
    }
}

impl std::fmt::Debug for IndexSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("collection", &self.collection)
            .field("top_k", &self.top_k)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// HuggingFace repository of the sentence-embedding model
    pub model: String,
    /// Query embeddings kept in memory
    pub cache_capacity: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            cache_capacity: 1024,
        }
    }
}

/// Completion provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    /// Override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: "gpt-4o".to_string(),
            base_url: None,
            openai_api_key: None,
            anthropic_api_key: None,
            temperature: 0.1,
            max_tokens: 5000,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Container CLI binary (docker or podman)
    pub engine: String,
    pub converter_image: String,
    pub runtime_image: String,
    pub script_timeout_secs: u64,
    pub converter_timeout_secs: u64,
    /// Explicit uid:gid; defaults to the owner of the turn's temp directory
    pub user: Option<String>,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            converter_image: "cadforge/dwg2dxf:latest".to_string(),
            runtime_image: "cadforge/cadquery-runtime:latest".to_string(),
            script_timeout_secs: 30,
            converter_timeout_secs: 120,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeSettings {
    /// Run the optional LLM enhancement pass over the raw summary
    pub enhance: bool,
    /// Extra layer names excluded on top of the built-in set
    pub exclude_layers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub background: [u8; 3],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 1920,
            height: 1080,
            background: [32, 36, 44],
        }
    }
}

/// Resolve the data directory.
///
/// Priority: explicit path > CADFORGE_DATA_PATH env > ./.cadforge (if exists) > ~/.cadforge
pub fn resolve_data_path(explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| std::env::var("CADFORGE_DATA_PATH").ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".cadforge");
            if local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cadforge"))
                .unwrap_or_else(|| PathBuf::from(".cadforge"))
        })
}

impl Settings {
    /// Load settings from `explicit` or `{data_path}/cadforge.toml`, then apply env overrides.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(data_path: &Path, explicit: Option<&Path>) -> Result<Self, ForgeError> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = data_path.join("cadforge.toml");
                if default_path.exists() {
                    match Self::from_file(&default_path) {
                        Ok(settings) => settings,
                        Err(e) => {
                            warn!("{}. Using default settings.", e);
                            Settings::default()
                        }
                    }
                } else {
                    Settings::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self, ForgeError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let settings = toml::from_str::<Settings>(&contents)
            .map_err(|e| ForgeError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Overlay environment variables. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = Some(value);
            }
        };

        set(&mut self.storage.access_key, "CADFORGE_S3_ACCESS_KEY");
        set(&mut self.storage.secret_key, "CADFORGE_S3_SECRET_KEY");
        set(&mut self.storage.endpoint, "CADFORGE_S3_ENDPOINT");
        set(&mut self.index.api_key, "CADFORGE_QDRANT_API_KEY");
        set(&mut self.llm.openai_api_key, "OPENAI_API_KEY");
        set(&mut self.llm.anthropic_api_key, "ANTHROPIC_API_KEY");
        set(&mut self.llm.base_url, "CADFORGE_LLM_BASE_URL");

        if let Some(v) = lookup("CADFORGE_S3_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = lookup("CADFORGE_S3_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("CADFORGE_QDRANT_URL") {
            self.index.url = v;
        }
        if let Some(v) = lookup("CADFORGE_QDRANT_COLLECTION") {
            self.index.collection = v;
        }
        if let Some(v) = lookup("CADFORGE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("CADFORGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("CADFORGE_CONVERTER_IMAGE") {
            self.containers.converter_image = v;
        }
        if let Some(v) = lookup("CADFORGE_RUNTIME_IMAGE") {
            self.containers.runtime_image = v;
        }
        if let Some(v) = lookup("CADFORGE_LLM_PROVIDER") {
            match v.to_lowercase().as_str() {
                "openai" => self.llm.provider = LlmProvider::OpenAi,
                "anthropic" => self.llm.provider = LlmProvider::Anthropic,
                other => warn!("Unknown CADFORGE_LLM_PROVIDER '{}', keeping {:?}", other, self.llm.provider),
            }
        }
    }
}
