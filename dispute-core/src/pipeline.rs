//! Batch orchestration: classify, map to actions, enrich, assemble.

use thiserror::Error;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::inference::{InferenceError, InferenceModels};
use crate::models::{Category, Dispute, DisputeStatus, EnrichedDispute, Enrichment};
use crate::narrative::NarrativeEnricher;
use crate::scheduler::EnrichmentScheduler;

/// Batch-fatal pipeline failures. Nothing is written when one of these is returned.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("classifier emitted unknown category {label:?} for row {row} ({dispute_id})")]
    UnknownCategory {
        row: usize,
        dispute_id: String,
        label: String,
    },

    #[error("classifier confidence {value} out of [0, 1] for row {row} ({dispute_id})")]
    InvalidConfidence {
        row: usize,
        dispute_id: String,
        value: f32,
    },

    #[error("classifier returned {actual} predictions for {expected} disputes")]
    PredictionCount { expected: usize, actual: usize },

    #[error("inference task failed: {0}")]
    Blocking(String),
}

/// Category and confidence for one dispute, validated against the enum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub confidence: f32,
}

/// Drives disputes through the inference stages and the two enrichment fan-outs.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    models: InferenceModels,
    enricher: NarrativeEnricher,
    scheduler: EnrichmentScheduler,
}

impl PipelineOrchestrator {
    pub fn new(
        models: InferenceModels,
        enricher: NarrativeEnricher,
        scheduler: EnrichmentScheduler,
    ) -> Self {
        Self {
            models,
            enricher,
            scheduler,
        }
    }

    /// Run a full batch. Output order matches `disputes`.
    pub async fn run(&self, disputes: Vec<Dispute>) -> Result<Vec<EnrichedDispute>, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id, rows = disputes.len());
        self.run_inner(disputes).instrument(span).await
    }

    async fn run_inner(&self, disputes: Vec<Dispute>) -> Result<Vec<EnrichedDispute>, PipelineError> {
        let classifications = self.classify(&disputes).await?;
        info!(rows = classifications.len(), "classified batch");

        let rules = self.enricher.rules();
        let actions: Vec<&'static str> = classifications
            .iter()
            .map(|c| rules.action(c.category))
            .collect();

        let explain_tasks: Vec<(&str, Category)> = disputes
            .iter()
            .zip(&classifications)
            .map(|(d, c)| (d.description.as_str(), c.category))
            .collect();
        let justify_tasks: Vec<(&str, Category, &'static str)> = explain_tasks
            .iter()
            .zip(&actions)
            .map(|(&(description, category), &action)| (description, category, action))
            .collect();

        info!(
            operation = "explain",
            max_workers = self.scheduler.max_workers(),
            "starting enrichment fan-out"
        );
        let explanations = self
            .scheduler
            .run("explain", explain_tasks, |_, (description, category)| {
                self.enricher.explain(description, category)
            })
            .await;
        info!(
            operation = "explain",
            fallbacks = count_fallbacks(&explanations),
            "enrichment fan-out finished"
        );

        info!(
            operation = "justify",
            max_workers = self.scheduler.max_workers(),
            "starting enrichment fan-out"
        );
        let justifications = self
            .scheduler
            .run("justify", justify_tasks, |_, (description, category, action)| {
                self.enricher.justify(description, category, action)
            })
            .await;
        info!(
            operation = "justify",
            fallbacks = count_fallbacks(&justifications),
            "enrichment fan-out finished"
        );

        let enriched = disputes
            .into_iter()
            .zip(classifications)
            .zip(actions)
            .zip(explanations.into_iter().zip(justifications))
            .map(
                |(((dispute, classification), action), (explanation, justification))| {
                    EnrichedDispute {
                        dispute,
                        category: classification.category,
                        confidence: classification.confidence,
                        explanation,
                        suggested_action: action.to_string(),
                        justification,
                        status: DisputeStatus::Open,
                    }
                },
            )
            .collect();

        Ok(enriched)
    }

    /// Encode, reduce and classify the batch on the blocking pool, then
    /// validate every label and confidence.
    pub async fn classify(&self, disputes: &[Dispute]) -> Result<Vec<Classification>, PipelineError> {
        if disputes.is_empty() {
            return Ok(Vec::new());
        }

        let models = self.models.clone();
        let texts: Vec<String> = disputes.iter().map(|d| d.description.clone()).collect();
        let predictions = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            models.predict(&refs)
        })
        .await
        .map_err(|e| PipelineError::Blocking(e.to_string()))??;

        if predictions.len() != disputes.len() {
            return Err(PipelineError::PredictionCount {
                expected: disputes.len(),
                actual: predictions.len(),
            });
        }

        predictions
            .into_iter()
            .zip(disputes)
            .enumerate()
            .map(|(row, (prediction, dispute))| {
                let category = prediction.label.parse::<Category>().map_err(|_| {
                    PipelineError::UnknownCategory {
                        row,
                        dispute_id: dispute.dispute_id.clone(),
                        label: prediction.label.clone(),
                    }
                })?;
                let confidence = prediction.confidence;
                if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                    return Err(PipelineError::InvalidConfidence {
                        row,
                        dispute_id: dispute.dispute_id.clone(),
                        value: confidence,
                    });
                }
                Ok(Classification {
                    category,
                    confidence,
                })
            })
            .collect()
    }
}

fn count_fallbacks(results: &[Enrichment]) -> usize {
    results.iter().filter(|e| e.is_fallback()).count()
}
