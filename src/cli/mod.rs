//! CLI interface for CadForge.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputMode;

/// CadForge - reconstruct 3D CAD models from engineering drawings
#[derive(Parser)]
#[command(name = "cadforge", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.cadforge)
    #[arg(long, env = "CADFORGE_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Settings file (default: <data-path>/cadforge.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start MCP server (stdio transport)
    Mcp,

    /// Print the geometry summary of a DXF file
    Describe {
        /// DXF file
        dxf: PathBuf,
        /// Keep every entity (no type or layer filtering)
        #[arg(long)]
        all: bool,
        /// Additional layer to drop (repeatable, case-insensitive)
        #[arg(long = "exclude-layer")]
        exclude_layers: Vec<String>,
    },

    /// Convert a DWG drawing to DXF in the converter container
    Convert {
        /// DWG file
        dwg: PathBuf,
        /// Output path (default: input with .dxf extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render preview images of a .vtp model
    Render {
        /// VTP file
        vtp: PathBuf,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// File name prefix
        #[arg(long, default_value = "preview")]
        prefix: String,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },

    /// Run one full turn: convert, describe, retrieve, generate, execute, render
    Run {
        /// What to build
        #[arg(long)]
        prompt: String,
        /// Object-store key of an uploaded DWG
        #[arg(long, conflicts_with_all = ["dwg", "dxf"])]
        dwg_key: Option<String>,
        /// Local DWG file; uploaded before the turn starts
        #[arg(long, conflicts_with = "dxf")]
        dwg: Option<PathBuf>,
        /// Local DXF file; skips conversion
        #[arg(long)]
        dxf: Option<PathBuf>,
        /// Skip preview rendering
        #[arg(long)]
        no_render: bool,
    },

    /// Embed and upsert reference examples into the vector collection
    Index {
        /// JSON-lines file of {"description": ..., "script": ...} records
        #[arg(long)]
        file: PathBuf,
    },
}

/// Execute a non-MCP command.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Mcp => unreachable!("MCP handled in main"),

        Commands::Describe {
            dxf,
            all,
            exclude_layers,
        } => handlers::describe::handle_describe(ctx, dxf, *all, exclude_layers, mode)?,

        Commands::Convert { dwg, output } => {
            handlers::convert::handle_convert(ctx, dwg, output.as_deref(), mode).await?
        }

        Commands::Render {
            vtp,
            out,
            prefix,
            width,
            height,
        } => {
            handlers::render::handle_render(ctx, vtp, out, prefix, *width, *height, mode).await?
        }

        Commands::Run {
            prompt,
            dwg_key,
            dwg,
            dxf,
            no_render,
        } => {
            let attachment = match (dwg_key, dwg, dxf) {
                (Some(key), _, _) => handlers::run::Attachment::DrawingKey(key.clone()),
                (None, Some(path), _) => handlers::run::Attachment::DwgFile(path.clone()),
                (None, None, Some(path)) => handlers::run::Attachment::Dxf(path.clone()),
                (None, None, None) => handlers::run::Attachment::None,
            };
            handlers::run::handle_run(ctx, prompt, attachment, *no_render, mode).await?
        }

        Commands::Index { file } => handlers::index::handle_index(ctx, file, mode).await?,
    }

    Ok(())
}
