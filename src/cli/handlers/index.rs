//! `index`: load reference examples into the vector collection.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{output_json, print_success, OutputMode};
use crate::init::AppContext;
use crate::retrieval::parse_examples_jsonl;

pub async fn handle_index(ctx: &AppContext, file: &Path, mode: OutputMode) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let examples = parse_examples_jsonl(&text)?;
    if examples.is_empty() {
        anyhow::bail!("{} contains no examples", file.display());
    }

    let count = ctx.retriever.index_examples(examples).await?;
    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "collection": ctx.settings.index.collection,
            "indexed": count,
        })),
        OutputMode::Human => print_success(&format!(
            "Indexed {} examples into '{}'",
            count, ctx.settings.index.collection
        )),
    }
    Ok(())
}
