//! Runs generated scripts in the modeling-runtime container and persists
//! the produced polygonal artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::codegen::GeneratedScript;
use crate::config::ContainerSettings;
use crate::container::{owner_of, ContainerRunner, Mount, RunSpec};
use crate::error::ForgeError;
use crate::storage::{mime_for, ArtifactStore};

/// Container path the script directory is mounted at.
pub const SCRIPT_MOUNT: &str = "/out";
/// Container path the script must write its artifacts to.
pub const OUTPUT_MOUNT: &str = "/output";

pub const ARTIFACT_EXTENSION: &str = "vtp";

/// Successful execution: where the artifact went, plus its bytes for previews.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub key: String,
    pub url: String,
    pub bytes: usize,
    pub artifact_name: String,
    /// Other files the script wrote (STEP, STL, ...); not uploaded
    pub extra_files: Vec<String>,
    #[serde(skip)]
    pub artifact: Vec<u8>,
}

pub struct CodeExecutor {
    runner: Arc<dyn ContainerRunner>,
    store: ArtifactStore,
    image: String,
    timeout: Duration,
    user: Option<String>,
}

impl CodeExecutor {
    pub fn new(
        runner: Arc<dyn ContainerRunner>,
        store: ArtifactStore,
        settings: &ContainerSettings,
    ) -> Self {
        Self {
            runner,
            store,
            image: settings.runtime_image.clone(),
            timeout: Duration::from_secs(settings.script_timeout_secs.max(1)),
            user: settings.user.clone(),
        }
    }

    /// Run `script` once. Temporaries are removed on every exit path when the
    /// work directory guard drops.
    #[instrument(name = "executor.execute", skip_all, fields(image = %self.image))]
    pub async fn execute(&self, script: &GeneratedScript) -> Result<ExecutionResult, ForgeError> {
        let workdir = tempfile::Builder::new()
            .prefix("cadforge-exec-")
            .tempdir()?;
        let scripts_dir = workdir.path().join("scripts");
        let output_dir = workdir.path().join("output");
        tokio::fs::create_dir_all(&scripts_dir).await?;
        tokio::fs::create_dir_all(&output_dir).await?;

        let script_name = format!("script_{}.py", Uuid::new_v4().simple());
        tokio::fs::write(scripts_dir.join(&script_name), script.as_str()).await?;

        let spec = RunSpec {
            image: self.image.clone(),
            argv: vec![
                "python3".to_string(),
                format!("{}/{}", SCRIPT_MOUNT, script_name),
            ],
            mounts: vec![
                Mount::ro(&scripts_dir, SCRIPT_MOUNT),
                Mount::rw(&output_dir, OUTPUT_MOUNT),
            ],
            timeout: self.timeout,
            user: self.user.clone().or_else(|| owner_of(workdir.path())),
        };
        self.runner.run(spec).await?;

        let (artifact_path, extra_files) = collect_outputs(&output_dir)?;
        let artifact = tokio::fs::read(&artifact_path).await?;
        let artifact_name = artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let stored = self
            .store
            .upload_new(
                ARTIFACT_EXTENSION,
                artifact.clone(),
                mime_for(ARTIFACT_EXTENSION),
            )
            .await?;
        info!(key = %stored.key, bytes = stored.bytes, "Artifact uploaded");

        Ok(ExecutionResult {
            key: stored.key,
            url: stored.url,
            bytes: stored.bytes,
            artifact_name,
            extra_files,
            artifact,
        })
    }
}

/// Pick the `.vtp` artifact in `dir` and list the other files.
///
/// No `.vtp` is `NoArtifact`; several pick the lexicographically first.
pub fn collect_outputs(dir: &Path) -> Result<(PathBuf, Vec<String>), ForgeError> {
    let mut artifacts = Vec::new();
    let mut extras = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_vtp = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ARTIFACT_EXTENSION));
        if is_vtp {
            artifacts.push(path);
        } else if let Some(name) = path.file_name() {
            extras.push(name.to_string_lossy().into_owned());
        }
    }
    artifacts.sort();
    extras.sort();

    if artifacts.len() > 1 {
        warn!(
            count = artifacts.len(),
            "Script wrote several .vtp files; using the first"
        );
    }
    let first = artifacts
        .into_iter()
        .next()
        .ok_or_else(|| ForgeError::NoArtifact(OUTPUT_MOUNT.to_string()))?;
    Ok((first, extras))
}
