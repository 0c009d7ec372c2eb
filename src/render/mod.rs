//! Multi-view preview capture for polygonal artifacts.

pub mod camera;
pub mod raster;
pub mod vtp;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::RenderSettings;
use crate::error::ForgeError;

pub use camera::{preset_poses, Bounds, Camera, Pose, POSE_NAMES};
pub use vtp::{parse_vtp, PolyData};

#[derive(Debug, Clone, Serialize)]
pub struct PreviewFrame {
    /// 1-based position in the preset order
    pub index: usize,
    pub name: &'static str,
    pub path: PathBuf,
}

/// Frames actually written, in preset order. May be shorter than the preset
/// list when individual poses fail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewFrameSet {
    pub frames: Vec<PreviewFrame>,
}

impl PreviewFrameSet {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.frames.iter().map(|f| f.path.as_path())
    }
}

pub fn frame_file_name(prefix: &str, index: usize, name: &str) -> String {
    format!("{}_{}_{}.png", prefix, index, name)
}

#[derive(Debug, Clone)]
pub struct Renderer {
    width: u32,
    height: u32,
    background: [u8; 3],
}

impl Renderer {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            width: settings.width.max(1),
            height: settings.height.max(1),
            background: settings.background,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Render every preset pose of `poly` into `out_dir`.
    ///
    /// Zero points is `EmptyModel`; a pose that fails to write is logged and
    /// left out of the returned set.
    pub fn render(
        &self,
        poly: &PolyData,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<PreviewFrameSet, ForgeError> {
        let (min, max) = poly
            .bounds()
            .ok_or_else(|| ForgeError::EmptyModel("artifact has no points".into()))?;
        std::fs::create_dir_all(out_dir)?;

        let mut set = PreviewFrameSet::default();
        for (i, pose) in preset_poses(&Bounds { min, max }).into_iter().enumerate() {
            let index = i + 1;
            let path = out_dir.join(frame_file_name(prefix, index, pose.name));
            let image =
                raster::rasterize(poly, &pose.camera, self.width, self.height, self.background);
            match image.save_with_format(&path, image::ImageFormat::Png) {
                Ok(()) => set.frames.push(PreviewFrame {
                    index,
                    name: pose.name,
                    path,
                }),
                Err(e) => warn!(pose = pose.name, error = %e, "Failed to write preview frame"),
            }
        }
        Ok(set)
    }

    pub fn render_bytes(
        &self,
        artifact: &[u8],
        out_dir: &Path,
        prefix: &str,
    ) -> Result<PreviewFrameSet, ForgeError> {
        let text = std::str::from_utf8(artifact).map_err(|_| {
            ForgeError::StructureCorrupt("artifact is not UTF-8 XML; raw appended data is unsupported".into())
        })?;
        let poly = parse_vtp(text)?;
        self.render(&poly, out_dir, prefix)
    }

    pub fn render_file(
        &self,
        path: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<PreviewFrameSet, ForgeError> {
        let bytes = std::fs::read(path).map_err(|e| ForgeError::FileUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.render_bytes(&bytes, out_dir, prefix)
    }

    /// Async wrapper running the CPU-bound work on the blocking pool.
    #[instrument(name = "render.previews", skip_all, fields(prefix = %prefix))]
    pub async fn render_async(
        &self,
        artifact: Vec<u8>,
        out_dir: PathBuf,
        prefix: String,
    ) -> Result<PreviewFrameSet, ForgeError> {
        let renderer = self.clone();
        let started = std::time::Instant::now();
        let set = tokio::task::spawn_blocking(move || {
            renderer.render_bytes(&artifact, &out_dir, &prefix)
        })
        .await
        .map_err(|e| ForgeError::Io(format!("render task failed: {}", e)))??;
        info!(
            frames = set.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Previews rendered"
        );
        Ok(set)
    }
}
