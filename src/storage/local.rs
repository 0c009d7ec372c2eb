//! Filesystem-backed object store for development setups.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::ForgeError;
use crate::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root, refusing anything that would escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, ForgeError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ForgeError::Validation(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _mime: &str) -> Result<(), ForgeError> {
        let path = self.resolve(key)?;
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await
        };
        write
            .await
            .map_err(|e| ForgeError::UploadFailed(format!("{}: {}", path.display(), e)))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ForgeError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ForgeError::FileUnreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
