//! Batch input and output files.
//!
//! Input is a CSV with at least `dispute_id` and `description`. Output is
//! two CSVs (classification and resolution), one row per input dispute in
//! input order. Both output files are staged next to their destination and
//! only renamed into place once both writes have succeeded.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::OutputConfig;
use crate::csv::{parse_records, write_record, CsvSyntaxError};
use crate::models::{Dispute, DisputeRecord, EnrichedDispute};

#[derive(Error, Debug)]
pub enum BatchIoError {
    #[error("input file not found: {path}")]
    NotFound { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Syntax {
        path: String,
        #[source]
        source: CsvSyntaxError,
    },

    #[error("{path}: file has no header row")]
    EmptyInput { path: String },

    #[error("{path}: missing required column {column:?}")]
    MissingColumn { path: String, column: &'static str },

    #[error("{path} line {line}: {message}")]
    Malformed {
        path: String,
        line: usize,
        message: String,
    },

    #[error("{path} line {line}: duplicate dispute_id {dispute_id:?}")]
    DuplicateId {
        path: String,
        line: usize,
        dispute_id: String,
    },
}

const CLASSIFICATION_HEADER: [&str; 4] = ["dispute_id", "predicted_category", "confidence", "explanation"];
const RESOLUTION_HEADER: [&str; 3] = ["dispute_id", "suggested_action", "justification"];

/// Read the batch input. Column order is free; unknown columns are ignored.
pub fn read_disputes(path: &Path) -> Result<Vec<Dispute>, BatchIoError> {
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(BatchIoError::NotFound { path: shown });
    }
    let text = std::fs::read_to_string(path).map_err(|source| BatchIoError::Io {
        path: shown.clone(),
        source,
    })?;
    let disputes = parse_disputes(&text, &shown)?;
    info!(path = %shown, rows = disputes.len(), "read dispute batch");
    Ok(disputes)
}

/// Parse batch input already in memory. `source` labels errors.
pub fn parse_disputes(text: &str, source: &str) -> Result<Vec<Dispute>, BatchIoError> {
    let records = parse_records(text).map_err(|e| BatchIoError::Syntax {
        path: source.to_string(),
        source: e,
    })?;
    let mut records = records.into_iter();
    let header = records.next().ok_or_else(|| BatchIoError::EmptyInput {
        path: source.to_string(),
    })?;

    let column = |name: &'static str| header.fields.iter().position(|h| h.trim() == name);
    let required = |name: &'static str| {
        column(name).ok_or_else(|| BatchIoError::MissingColumn {
            path: source.to_string(),
            column: name,
        })
    };
    let id_col = required("dispute_id")?;
    let desc_col = required("description")?;
    let customer_col = column("customer_id");
    let txn_col = column("txn_id");
    let created_col = column("created_at");

    let malformed = |line: usize, message: String| BatchIoError::Malformed {
        path: source.to_string(),
        line,
        message,
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut disputes = Vec::new();

    for record in records {
        if record.fields.len() != header.fields.len() {
            return Err(malformed(
                record.line,
                format!(
                    "expected {} fields, found {}",
                    header.fields.len(),
                    record.fields.len()
                ),
            ));
        }
        let cell = |idx: usize| record.fields[idx].as_str();
        let optional = |idx: Option<usize>| {
            idx.map(|i| cell(i).trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let dispute_id = cell(id_col).trim().to_string();
        if dispute_id.is_empty() {
            return Err(malformed(record.line, "empty dispute_id".to_string()));
        }
        if seen.insert(dispute_id.clone(), record.line).is_some() {
            return Err(BatchIoError::DuplicateId {
                path: source.to_string(),
                line: record.line,
                dispute_id,
            });
        }

        let created_at = match optional(created_col) {
            Some(raw) => Some(
                parse_timestamp(&raw)
                    .ok_or_else(|| malformed(record.line, format!("bad created_at {raw:?}")))?,
            ),
            None => None,
        };

        disputes.push(Dispute {
            dispute_id,
            customer_id: optional(customer_col),
            txn_id: optional(txn_col),
            description: cell(desc_col).to_string(),
            created_at,
        });
    }

    Ok(disputes)
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// One row of the classification output file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRow {
    pub dispute_id: String,
    pub predicted_category: String,
    pub confidence: f32,
    pub explanation: String,
}

/// One row of the resolution output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRow {
    pub dispute_id: String,
    pub suggested_action: String,
    pub justification: String,
}

impl From<&EnrichedDispute> for ClassificationRow {
    fn from(d: &EnrichedDispute) -> Self {
        Self {
            dispute_id: d.dispute.dispute_id.clone(),
            predicted_category: d.category.as_str().to_string(),
            confidence: d.confidence,
            explanation: d.explanation.text().to_string(),
        }
    }
}

impl From<&EnrichedDispute> for ResolutionRow {
    fn from(d: &EnrichedDispute) -> Self {
        Self {
            dispute_id: d.dispute.dispute_id.clone(),
            suggested_action: d.suggested_action.clone(),
            justification: d.justification.text().to_string(),
        }
    }
}

impl From<&DisputeRecord> for ClassificationRow {
    fn from(r: &DisputeRecord) -> Self {
        Self {
            dispute_id: r.dispute_id.clone(),
            predicted_category: r.predicted_category.clone(),
            confidence: r.confidence,
            explanation: r.explanation.clone(),
        }
    }
}

impl From<&DisputeRecord> for ResolutionRow {
    fn from(r: &DisputeRecord) -> Self {
        Self {
            dispute_id: r.dispute_id.clone(),
            suggested_action: r.suggested_action.clone(),
            justification: r.justification.clone(),
        }
    }
}

pub fn render_classifications(rows: &[ClassificationRow]) -> String {
    let mut out = String::new();
    write_record(&mut out, &CLASSIFICATION_HEADER);
    for row in rows {
        let confidence = format!("{:.2}", row.confidence);
        write_record(
            &mut out,
            &[
                row.dispute_id.as_str(),
                row.predicted_category.as_str(),
                confidence.as_str(),
                row.explanation.as_str(),
            ],
        );
    }
    out
}

pub fn render_resolutions(rows: &[ResolutionRow]) -> String {
    let mut out = String::new();
    write_record(&mut out, &RESOLUTION_HEADER);
    for row in rows {
        write_record(
            &mut out,
            &[
                row.dispute_id.as_str(),
                row.suggested_action.as_str(),
                row.justification.as_str(),
            ],
        );
    }
    out
}

/// Destinations for the two output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub classification: PathBuf,
    pub resolution: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path, config: &OutputConfig) -> Self {
        Self {
            classification: dir.join(&config.classification_file),
            resolution: dir.join(&config.resolution_file),
        }
    }
}

/// Write both output files, or neither.
pub fn write_outputs(
    paths: &OutputPaths,
    classifications: &[ClassificationRow],
    resolutions: &[ResolutionRow],
) -> Result<(), BatchIoError> {
    let staged_classification = stage(&paths.classification, &render_classifications(classifications))?;
    let staged_resolution = match stage(&paths.resolution, &render_resolutions(resolutions)) {
        Ok(p) => p,
        Err(e) => {
            let _ = std::fs::remove_file(&staged_classification);
            return Err(e);
        }
    };

    // Keep any previous classification file until both renames succeed.
    let backup = if paths.classification.is_file() {
        let backup = sibling(&paths.classification, "bak");
        if let Err(source) = std::fs::rename(&paths.classification, &backup) {
            discard(&[&staged_classification, &staged_resolution]);
            return Err(BatchIoError::Io {
                path: paths.classification.display().to_string(),
                source,
            });
        }
        Some(backup)
    } else {
        None
    };
    let restore = |backup: &Option<PathBuf>| {
        if let Some(backup) = backup {
            let _ = std::fs::rename(backup, &paths.classification);
        }
    };

    if let Err(source) = std::fs::rename(&staged_classification, &paths.classification) {
        discard(&[&staged_classification, &staged_resolution]);
        restore(&backup);
        return Err(BatchIoError::Io {
            path: paths.classification.display().to_string(),
            source,
        });
    }

    if let Err(source) = std::fs::rename(&staged_resolution, &paths.resolution) {
        discard(&[&staged_resolution, &paths.classification]);
        restore(&backup);
        return Err(BatchIoError::Io {
            path: paths.resolution.display().to_string(),
            source,
        });
    }

    if let Some(backup) = &backup {
        let _ = std::fs::remove_file(backup);
    }

    info!(
        classification = %paths.classification.display(),
        resolution = %paths.resolution.display(),
        rows = classifications.len(),
        "wrote output files"
    );
    Ok(())
}

/// Hidden `.{name}.{suffix}` path next to `dest`.
fn sibling(dest: &Path, suffix: &str) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.csv".to_string());
    dest.with_file_name(format!(".{file_name}.{suffix}"))
}

fn discard(paths: &[&PathBuf]) {
    for path in paths {
        let _ = std::fs::remove_file(path);
    }
}

/// Write pipeline output for an enriched batch.
pub fn write_enriched(paths: &OutputPaths, enriched: &[EnrichedDispute]) -> Result<(), BatchIoError> {
    let classifications: Vec<ClassificationRow> = enriched.iter().map(Into::into).collect();
    let resolutions: Vec<ResolutionRow> = enriched.iter().map(Into::into).collect();
    write_outputs(paths, &classifications, &resolutions)
}

fn stage(dest: &Path, contents: &str) -> Result<PathBuf, BatchIoError> {
    let staged = sibling(dest, "tmp");
    std::fs::write(&staged, contents).map_err(|source| BatchIoError::Io {
        path: staged.display().to_string(),
        source,
    })?;
    Ok(staged)
}
