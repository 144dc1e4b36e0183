//! `load` command: run the pipeline and persist the enriched rows.

use std::path::Path;

use anyhow::Context;
use dispute_core::{batch, DisputeStore, PipelineOrchestrator};
use serde::Serialize;
use tracing::info;

use super::classify::BatchSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub batch: BatchSummary,
    /// Rows actually inserted; already-stored dispute ids are skipped.
    pub inserted: u64,
}

pub async fn load_file(
    orchestrator: &PipelineOrchestrator,
    store: &DisputeStore,
    input: &Path,
) -> anyhow::Result<LoadSummary> {
    let disputes = batch::read_disputes(input)
        .with_context(|| format!("reading batch input {}", input.display()))?;

    store.ensure_schema().await.context("creating schema")?;

    let enriched = orchestrator
        .run(disputes)
        .await
        .context("classification pipeline failed")?;

    let inserted = store
        .insert_enriched(&enriched)
        .await
        .context("storing enriched disputes")?;

    let summary = LoadSummary {
        batch: BatchSummary::of(&enriched),
        inserted,
    };
    info!(rows = summary.batch.rows, inserted, "load finished");
    Ok(summary)
}
