//! DWG to DXF conversion through the converter container.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::ContainerSettings;
use crate::container::{owner_of, ContainerRunner, Mount, RunSpec};
use crate::error::ForgeError;

/// Container path of the single directory the converter works in.
pub const CONVERT_MOUNT: &str = "/data";

pub struct DwgConverter {
    runner: Arc<dyn ContainerRunner>,
    image: String,
    timeout: Duration,
    user: Option<String>,
}

impl DwgConverter {
    pub fn new(runner: Arc<dyn ContainerRunner>, settings: &ContainerSettings) -> Self {
        Self {
            runner,
            image: settings.converter_image.clone(),
            timeout: Duration::from_secs(settings.converter_timeout_secs.max(1)),
            user: settings.user.clone(),
        }
    }

    /// Convert `dwg` into `<work_dir>/<stem>.dxf`. The input is copied into
    /// `work_dir` first so the container sees one mounted directory.
    #[instrument(name = "converter.convert", skip_all, fields(image = %self.image))]
    pub async fn convert(&self, dwg: &Path, work_dir: &Path) -> Result<PathBuf, ForgeError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let stem = dwg
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "drawing".to_string());
        let input_name = format!("{}.dwg", stem);
        let output_name = format!("{}.dxf", stem);

        let staged = work_dir.join(&input_name);
        if staged != dwg {
            tokio::fs::copy(dwg, &staged)
                .await
                .map_err(|e| ForgeError::FileUnreadable {
                    path: dwg.display().to_string(),
                    message: e.to_string(),
                })?;
        }

        let spec = RunSpec {
            image: self.image.clone(),
            argv: vec![
                "dwg2dxf".to_string(),
                format!("{}/{}", CONVERT_MOUNT, input_name),
                "-o".to_string(),
                format!("{}/{}", CONVERT_MOUNT, output_name),
            ],
            mounts: vec![Mount::rw(work_dir, CONVERT_MOUNT)],
            timeout: self.timeout,
            user: self.user.clone().or_else(|| owner_of(work_dir)),
        };
        self.runner.run(spec).await?;

        let output = work_dir.join(&output_name);
        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(ForgeError::NoArtifact(format!(
                "{} (converter wrote no {})",
                CONVERT_MOUNT, output_name
            )));
        }
        info!(output = %output.display(), "Drawing converted");
        Ok(output)
    }
}
