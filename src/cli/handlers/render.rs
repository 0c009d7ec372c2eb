//! `render`: preview images of a local .vtp file.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{output_json, print_success, print_warning, OutputMode};
use crate::init::AppContext;
use crate::render::POSE_NAMES;

pub async fn handle_render(
    ctx: &AppContext,
    vtp: &Path,
    out: &Path,
    prefix: &str,
    width: Option<u32>,
    height: Option<u32>,
    mode: OutputMode,
) -> Result<()> {
    let renderer = ctx.renderer.clone().with_size(
        width.unwrap_or(ctx.settings.render.width),
        height.unwrap_or(ctx.settings.render.height),
    );
    let bytes = tokio::fs::read(vtp).await?;
    let frames = renderer
        .render_async(bytes, out.to_path_buf(), prefix.to_string())
        .await?;

    match mode {
        OutputMode::Json => output_json(&frames),
        OutputMode::Human => {
            for frame in &frames.frames {
                print_success(&frame.path.display().to_string());
            }
            if frames.len() < POSE_NAMES.len() {
                print_warning(&format!(
                    "{} of {} poses rendered; see log for failures",
                    frames.len(),
                    POSE_NAMES.len()
                ));
            }
        }
    }
    Ok(())
}
