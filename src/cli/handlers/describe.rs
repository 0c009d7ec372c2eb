//! `describe`: print the geometry summary of a DXF file.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{output_json, print_hint, OutputMode};
use crate::dxf::{describe_file, FilterConfig};
use crate::init::AppContext;

pub fn handle_describe(
    ctx: &AppContext,
    dxf: &Path,
    all: bool,
    exclude_layers: &[String],
    mode: OutputMode,
) -> Result<()> {
    let mut layers = ctx.settings.describe.exclude_layers.clone();
    layers.extend(exclude_layers.iter().cloned());
    let config = FilterConfig {
        include_all: all,
        exclude_layers: layers,
    };

    let summary = describe_file(dxf, &config)?;
    match mode {
        OutputMode::Json => output_json(&summary),
        OutputMode::Human => {
            println!("{}", summary.document);
            if summary.is_empty() && !all {
                print_hint("Nothing survived filtering. Try --all to include annotation layers.");
            }
        }
    }
    Ok(())
}
