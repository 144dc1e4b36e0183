//! `classify` command: CSV in, two CSVs out, no database.

use std::path::Path;

use anyhow::Context;
use dispute_core::{
    batch::{self, OutputPaths},
    EnrichedDispute, PipelineOrchestrator,
};
use serde::Serialize;
use tracing::info;

/// Counts reported after a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub explanation_fallbacks: usize,
    pub justification_fallbacks: usize,
}

impl BatchSummary {
    pub fn of(enriched: &[EnrichedDispute]) -> Self {
        Self {
            rows: enriched.len(),
            explanation_fallbacks: enriched.iter().filter(|d| d.explanation.is_fallback()).count(),
            justification_fallbacks: enriched
                .iter()
                .filter(|d| d.justification.is_fallback())
                .count(),
        }
    }
}

/// Read `input`, run the pipeline, and write both output files.
///
/// Any fatal error returns before either output file is touched.
pub async fn classify_file(
    orchestrator: &PipelineOrchestrator,
    input: &Path,
    outputs: &OutputPaths,
) -> anyhow::Result<BatchSummary> {
    let disputes = batch::read_disputes(input)
        .with_context(|| format!("reading batch input {}", input.display()))?;

    let enriched = orchestrator
        .run(disputes)
        .await
        .context("classification pipeline failed")?;

    batch::write_enriched(outputs, &enriched).context("writing output files")?;

    let summary = BatchSummary::of(&enriched);
    info!(
        rows = summary.rows,
        explanation_fallbacks = summary.explanation_fallbacks,
        justification_fallbacks = summary.justification_fallbacks,
        "classify finished"
    );
    Ok(summary)
}
