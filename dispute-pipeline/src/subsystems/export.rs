//! `export` command: write the stored set back out as the two output files.

use anyhow::Context;
use dispute_core::{
    batch::{self, ClassificationRow, OutputPaths, ResolutionRow},
    DisputeStore,
};

/// Export in load order. Returns the number of rows written.
pub async fn export_store(store: &DisputeStore, outputs: &OutputPaths) -> anyhow::Result<usize> {
    let records = store
        .list_in_load_order()
        .await
        .context("reading stored disputes")?;

    let classifications: Vec<ClassificationRow> = records.iter().map(Into::into).collect();
    let resolutions: Vec<ResolutionRow> = records.iter().map(Into::into).collect();
    batch::write_outputs(outputs, &classifications, &resolutions).context("writing output files")?;

    Ok(records.len())
}
