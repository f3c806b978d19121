//! Content commands: bulk import and the processing pipeline.

use std::path::Path;

use anyhow::{Context, Result};
use digest_hub::content::NewContentItem;
use digest_hub::processing::{ProcessingPipeline, process_pending};

use super::AppContext;

pub async fn run_import_command(ctx: &AppContext, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read import file '{}'", file.display()))?;
    let items: Vec<NewContentItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse import file '{}'", file.display()))?;

    let total = items.len();
    let inserted = ctx.store().bulk_insert(&items).await?;
    println!(
        "Imported {inserted} of {total} items ({} duplicates skipped)",
        total as u64 - inserted
    );
    Ok(())
}

pub async fn run_process_command(ctx: &AppContext, limit: u32) -> Result<()> {
    let pipeline = ProcessingPipeline::with_defaults();
    let report = process_pending(&ctx.store(), &pipeline, limit).await?;
    println!(
        "Processed {} items ({} saved without changes)",
        report.processed + report.failed,
        report.failed
    );
    Ok(())
}
