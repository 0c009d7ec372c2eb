//! `convert`: DWG to DXF through the converter container.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{output_json, print_success, OutputMode};
use crate::init::AppContext;

pub async fn handle_convert(
    ctx: &AppContext,
    dwg: &Path,
    output: Option<&Path>,
    mode: OutputMode,
) -> Result<()> {
    let target = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dwg.with_extension("dxf"));

    let work = tempfile::Builder::new().prefix("cadforge-convert-").tempdir()?;
    let converted = ctx.converter().convert(dwg, work.path()).await?;
    tokio::fs::copy(&converted, &target).await?;

    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "input": dwg.display().to_string(),
            "output": target.display().to_string(),
        })),
        OutputMode::Human => print_success(&format!("Wrote {}", target.display())),
    }
    Ok(())
}
