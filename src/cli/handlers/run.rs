//! `run`: one deterministic turn through the whole pipeline.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::output::{
    first_line, output_json, print_error, print_header, print_kv, print_success, print_table,
    OutputMode,
};
use crate::init::{build_tools, AppContext};
use crate::pipeline::{Agent, PipelineState, Role, TurnOutcome};
use crate::progress::noop_progress;
use crate::storage::mime_for;

/// Drawing supplied with the turn.
#[derive(Debug, Clone)]
pub enum Attachment {
    None,
    DrawingKey(String),
    DwgFile(PathBuf),
    Dxf(PathBuf),
}

pub async fn handle_run(
    ctx: &AppContext,
    prompt: &str,
    attachment: Attachment,
    no_render: bool,
    mode: OutputMode,
) -> Result<()> {
    let agent = if no_render && ctx.settings.render.enabled {
        let mut settings = ctx.settings.clone();
        settings.render.enabled = false;
        Arc::new(Agent::new(Arc::new(build_tools(
            &settings,
            ctx.store.clone(),
            ctx.runner.clone(),
            ctx.retriever.clone(),
            ctx.completion.clone(),
            ctx.renderer.clone(),
        ))))
    } else {
        ctx.agent.clone()
    };

    let mut state = PipelineState::new(prompt)?;
    state = match attachment {
        Attachment::None => state,
        Attachment::DrawingKey(key) => state.with_drawing_key(key),
        Attachment::Dxf(path) => state.with_dxf(path),
        Attachment::DwgFile(path) => {
            let bytes = tokio::fs::read(&path).await?;
            let stored = ctx.store.upload_new("dwg", bytes, mime_for("dwg")).await?;
            tracing::info!(key = %stored.key, "Drawing uploaded");
            state.with_drawing_key(stored.key)
        }
    };

    let progress = noop_progress();
    let report = agent.run_turn(&mut state, progress.as_ref()).await;

    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "report": report,
            "messages": state.messages,
        })),
        OutputMode::Human => {
            print_header("Transcript");
            let rows = state
                .messages
                .iter()
                .map(|m| {
                    let role = match m.role {
                        Role::User => "user".cyan().to_string(),
                        Role::Assistant => "assistant".green().to_string(),
                        Role::Tool => "tool".normal().to_string(),
                    };
                    vec![
                        role,
                        m.tool.clone().unwrap_or_default(),
                        first_line(&m.content, 80),
                    ]
                })
                .collect();
            print_table(&["Role", "Tool", "Content"], rows);

            print_header("Result");
            print_kv("Turn", &report.turn_id.to_string());
            print_kv("Executor calls", &report.executor_calls.to_string());
            match &report.outcome {
                TurnOutcome::Completed { url, .. } => {
                    print_success(url);
                    println!("\n{}", report.reply);
                }
                TurnOutcome::Failed { .. } => print_error(&report.reply),
            }
        }
    }

    if let TurnOutcome::Failed { label, .. } = &report.outcome {
        anyhow::bail!("turn failed: {}", label);
    }
    Ok(())
}
