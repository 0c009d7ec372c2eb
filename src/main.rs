//! CadForge - drawing-to-CAD reconstruction pipeline
//!
//! Usage:
//!   cadforge mcp                          Start MCP server on stdio
//!   cadforge describe part.dxf            Print the geometry summary
//!   cadforge convert part.dwg             Convert DWG to DXF
//!   cadforge render model.vtp             Capture preview images
//!   cadforge run --prompt "..." --dxf f   Run one full turn
//!   cadforge index --file examples.jsonl  Load reference examples
//!   cadforge --help                       Show all commands

use anyhow::Result;
use clap::Parser;

use cadforge::cli::output::OutputMode;
use cadforge::cli::{Cli, Commands};
use cadforge::init::AppContext;
use cadforge::mcp::run_mcp_server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr (safe for MCP stdio transport)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cadforge=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);
    let ctx = AppContext::new(cli.data_path.clone(), cli.config.clone()).await?;

    match &cli.command {
        Commands::Mcp => run_mcp_server(ctx).await?,
        cmd => cadforge::cli::execute(cmd, &ctx, mode).await?,
    }

    Ok(())
}
