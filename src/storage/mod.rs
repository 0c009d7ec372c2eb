//! Artifact persistence.
//!
//! [`ObjectStore`] is the byte-level backend (S3 or a local directory);
//! [`ArtifactStore`] layers key generation, retrieval URLs and temp-file
//! downloads on top of it.

pub mod local;
pub mod s3;
pub mod sigv4;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{StorageBackend, StorageSettings};
use crate::error::ForgeError;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Prefix every generated key lives under.
pub const KEY_PREFIX: &str = "user-uploads";

/// Prefix of the URL the host framework resolves to a signed link.
pub const URL_PREFIX: &str = "/files/by-key/";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, mime: &str) -> Result<(), ForgeError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ForgeError>;
    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub bytes: usize,
}

/// `user-uploads/<YYYY>/<MM>/<uuid>.<ext>` for the given UTC instant.
pub fn object_key(ext: &str, now: DateTime<Utc>, id: Uuid) -> String {
    let ext = ext.trim_start_matches('.');
    format!(
        "{}/{:04}/{:02}/{}.{}",
        KEY_PREFIX,
        now.year(),
        now.month(),
        id,
        ext
    )
}

pub fn url_for(key: &str) -> String {
    format!("{}{}", URL_PREFIX, key)
}

/// Inverse of [`url_for`]; also accepts a bare key.
pub fn key_from_reference(reference: &str) -> &str {
    reference.strip_prefix(URL_PREFIX).unwrap_or(reference)
}

/// Whether `key` follows the generated layout.
pub fn is_valid_key(key: &str) -> bool {
    let parts: Vec<&str> = key.split('/').collect();
    let [prefix, year, month, file] = parts.as_slice() else {
        return false;
    };
    let Some((stem, ext)) = file.rsplit_once('.') else {
        return false;
    };
    *prefix == KEY_PREFIX
        && year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
        && month.len() == 2
        && month.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m))
        && Uuid::parse_str(stem).is_ok_and(|u| u.get_version_num() == 4)
        && !ext.is_empty()
}

/// Suffix of a key's final path segment, without the dot.
pub fn key_extension(key: &str) -> Option<&str> {
    let file = key.rsplit('/').next()?;
    file.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
}

/// Key generation and URL formation over an [`ObjectStore`].
#[derive(Clone)]
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Build the backend selected by configuration.
    pub fn from_settings(settings: &StorageSettings, data_path: &std::path::Path) -> Self {
        let store: Arc<dyn ObjectStore> = match settings.backend {
            StorageBackend::S3 => Arc::new(S3ObjectStore::new(settings)),
            StorageBackend::Local => {
                let root = settings
                    .local_root
                    .clone()
                    .unwrap_or_else(|| data_path.join("objects"));
                Arc::new(LocalObjectStore::new(root))
            }
        };
        Self::new(store)
    }

    /// Upload under an explicit key.
    #[instrument(name = "storage.upload", skip(self, bytes), fields(backend = self.store.backend(), size = bytes.len()))]
    pub async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<StoredObject, ForgeError> {
        let size = bytes.len();
        self.store.put(key, bytes, mime).await?;
        info!(key, "Stored object");
        Ok(StoredObject {
            key: key.to_string(),
            url: url_for(key),
            bytes: size,
        })
    }

    /// Upload under a freshly generated key with extension `ext`.
    pub async fn upload_new(
        &self,
        ext: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<StoredObject, ForgeError> {
        let key = object_key(ext, Utc::now(), Uuid::new_v4());
        self.upload(&key, bytes, mime).await
    }

    /// Fetch `key` into a temporary file whose name keeps the key's suffix.
    /// The file is deleted when the returned handle drops.
    #[instrument(name = "storage.download", skip(self), fields(backend = self.store.backend()))]
    pub async fn download(&self, key: &str) -> Result<tempfile::NamedTempFile, ForgeError> {
        let bytes = self.store.get(key).await?;
        let suffix = key_extension(key)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("cadforge-")
            .suffix(&suffix)
            .tempfile()?;
        std::io::Write::write_all(&mut file, &bytes)?;
        Ok(file)
    }

    /// Fetch `key` into `dir/<file_name>`.
    pub async fn download_into(
        &self,
        key: &str,
        dir: &std::path::Path,
        file_name: &str,
    ) -> Result<std::path::PathBuf, ForgeError> {
        let bytes = self.store.get(key).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Mime type for the artifact extensions this crate writes.
pub fn mime_for(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "vtp" => "application/xml",
        "dwg" => "application/acad",
        "dxf" => "image/vnd.dxf",
        "png" => "image/png",
        "step" | "stp" => "application/step",
        "stl" => "model/stl",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_object_key_layout() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let key = object_key(".vtp", now, id);
        assert_eq!(key, format!("user-uploads/2026/03/{}.vtp", id));
        assert!(is_valid_key(&key));
        assert_eq!(url_for(&key), format!("/files/by-key/{}", key));
        assert_eq!(key_from_reference(&url_for(&key)), key);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(!is_valid_key("user-uploads/2026/13/x.vtp"));
        assert!(!is_valid_key("other/2026/01/0b0e6f0e-3c8f-4d3e-9a43-6f1d2f2b0a10.vtp"));
        assert!(!is_valid_key("user-uploads/2026/01/0b0e6f0e-3c8f-4d3e-9a43-6f1d2f2b0a10"));
    }

    #[test]
    fn test_key_extension() {
        assert_eq!(key_extension("user-uploads/2026/01/a.dwg"), Some("dwg"));
        assert_eq!(key_extension("user-uploads/2026/01/a"), None);
    }

    proptest! {
        #[test]
        fn generated_keys_always_match_layout(
            secs in 0i64..4_102_444_800,
            ext in "[a-z]{1,4}",
        ) {
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let key = object_key(&ext, now, Uuid::new_v4());
            prop_assert!(is_valid_key(&key));
            prop_assert_eq!(key_extension(&key), Some(ext.as_str()));
        }
    }

    #[tokio::test]
    async fn test_download_keeps_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Arc::new(LocalObjectStore::new(dir.path())));
        let stored = store
            .upload_new("dwg", b"AC1032".to_vec(), mime_for("dwg"))
            .await
            .unwrap();
        let file = store.download(&stored.key).await.unwrap();
        assert_eq!(
            file.path().extension().and_then(|e| e.to_str()),
            Some("dwg")
        );
        assert_eq!(std::fs::read(file.path()).unwrap(), b"AC1032");
    }
}
