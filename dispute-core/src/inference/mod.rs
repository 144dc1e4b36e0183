//! Local inference stages: text encoder → dimensionality reducer → classifier.
//!
//! Each stage is a trait so the pipeline can be driven by the ONNX / JSON
//! artifact implementations in production and by small stubs in tests.
//! All stages are read-only after construction and shared behind `Arc`.

mod classifier;
mod encoder;
mod reducer;

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

pub use classifier::{ClassifierArtifact, LogisticRegressionClassifier};
pub use encoder::{default_model_dir, resolve_encoder_paths, OnnxEncoderConfig, OnnxTextEncoder};
pub use reducer::{PcaArtifact, PcaReducer};

/// Default all-MiniLM-L6-v2 embedding dimensions
pub const ENCODER_DIMENSIONS: usize = 384;

/// Errors raised while loading or running the local inference stages.
///
/// Every variant is fatal to the batch that hits it.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model artifact not found at {path}")]
    ModelNotFound { path: String },

    #[error("invalid model artifact {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("{stage} dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{stage} returned {actual} rows for {expected} inputs")]
    RowCountMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

/// Turns raw description strings into fixed-length embeddings, one row per input.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, texts: &[&str]) -> Result<Array2<f32>, InferenceError>;

    /// Output embedding dimension.
    fn dimensions(&self) -> usize;

    /// Encoder name for logging.
    fn name(&self) -> &str;
}

/// Fitted projection from encoder space into classifier space.
pub trait DimensionalityReducer: Send + Sync {
    fn reduce(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError>;
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
}

/// Raw classifier output for a single row.
///
/// `label` is the class name exactly as the model emits it; the pipeline
/// validates it against the category enum.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub label: String,
    /// Maximum posterior probability across classes.
    pub confidence: f32,
}

impl RawPrediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Predicts a category label and confidence per reduced vector.
pub trait CategoryClassifier: Send + Sync {
    fn classify(&self, features: ArrayView2<'_, f32>) -> Result<Vec<RawPrediction>, InferenceError>;
    fn input_dim(&self) -> usize;
}

/// The three loaded stages, dimension-checked against each other.
#[derive(Clone)]
pub struct InferenceModels {
    encoder: Arc<dyn TextEncoder>,
    reducer: Arc<dyn DimensionalityReducer>,
    classifier: Arc<dyn CategoryClassifier>,
}

impl std::fmt::Debug for InferenceModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceModels")
            .field("encoder", &self.encoder.name())
            .field("encoder_dim", &self.encoder.dimensions())
            .field("reduced_dim", &self.reducer.output_dim())
            .finish_non_exhaustive()
    }
}

impl InferenceModels {
    /// Wire the stages together. Fails if the encoder output does not feed
    /// the reducer input, or the reducer output does not feed the classifier.
    pub fn new(
        encoder: Arc<dyn TextEncoder>,
        reducer: Arc<dyn DimensionalityReducer>,
        classifier: Arc<dyn CategoryClassifier>,
    ) -> Result<Self, InferenceError> {
        if encoder.dimensions() != reducer.input_dim() {
            return Err(InferenceError::DimensionMismatch {
                stage: "reducer input",
                expected: encoder.dimensions(),
                actual: reducer.input_dim(),
            });
        }
        if reducer.output_dim() != classifier.input_dim() {
            return Err(InferenceError::DimensionMismatch {
                stage: "classifier input",
                expected: reducer.output_dim(),
                actual: classifier.input_dim(),
            });
        }
        Ok(Self {
            encoder,
            reducer,
            classifier,
        })
    }

    /// Encode, reduce and classify a batch in one pass, preserving order.
    pub fn predict(&self, texts: &[&str]) -> Result<Vec<RawPrediction>, InferenceError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let embeddings = self.encoder.encode(texts)?;
        check_shape("encoder", &embeddings, texts.len(), self.encoder.dimensions())?;

        let reduced = self.reducer.reduce(embeddings.view())?;
        check_shape("reducer", &reduced, texts.len(), self.reducer.output_dim())?;

        let predictions = self.classifier.classify(reduced.view())?;
        if predictions.len() != texts.len() {
            return Err(InferenceError::RowCountMismatch {
                stage: "classifier",
                expected: texts.len(),
                actual: predictions.len(),
            });
        }
        Ok(predictions)
    }
}

fn check_shape(
    stage: &'static str,
    output: &Array2<f32>,
    rows: usize,
    cols: usize,
) -> Result<(), InferenceError> {
    if output.nrows() != rows {
        return Err(InferenceError::RowCountMismatch {
            stage,
            expected: rows,
            actual: output.nrows(),
        });
    }
    if output.ncols() != cols {
        return Err(InferenceError::DimensionMismatch {
            stage,
            expected: cols,
            actual: output.ncols(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstEncoder(usize);

    impl TextEncoder for ConstEncoder {
        fn encode(&self, texts: &[&str]) -> Result<Array2<f32>, InferenceError> {
            Ok(Array2::from_elem((texts.len(), self.0), 0.5))
        }
        fn dimensions(&self) -> usize {
            self.0
        }
        fn name(&self) -> &str {
            "const"
        }
    }

    struct Truncate {
        input: usize,
        output: usize,
    }

    impl DimensionalityReducer for Truncate {
        fn reduce(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
            Ok(vectors.slice(ndarray::s![.., ..self.output]).to_owned())
        }
        fn input_dim(&self) -> usize {
            self.input
        }
        fn output_dim(&self) -> usize {
            self.output
        }
    }

    struct FixedClassifier {
        dim: usize,
        drop_last: bool,
    }

    impl CategoryClassifier for FixedClassifier {
        fn classify(
            &self,
            features: ArrayView2<'_, f32>,
        ) -> Result<Vec<RawPrediction>, InferenceError> {
            let mut out: Vec<RawPrediction> = (0..features.nrows())
                .map(|_| RawPrediction::new("OTHERS", 0.6))
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
        fn input_dim(&self) -> usize {
            self.dim
        }
    }

    fn models(
        encoder_dim: usize,
        reducer_in: usize,
        reduced: usize,
        clf_dim: usize,
    ) -> Result<InferenceModels, InferenceError> {
        InferenceModels::new(
            Arc::new(ConstEncoder(encoder_dim)),
            Arc::new(Truncate {
                input: reducer_in,
                output: reduced,
            }),
            Arc::new(FixedClassifier {
                dim: clf_dim,
                drop_last: false,
            }),
        )
    }

    #[test]
    fn rejects_encoder_reducer_mismatch() {
        let err = models(8, 6, 2, 2).unwrap_err();
        match err {
            InferenceError::DimensionMismatch { expected, actual, .. } => {
                assert_eq!(expected, 8);
                assert_eq!(actual, 6);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_reducer_classifier_mismatch() {
        assert!(matches!(
            models(8, 8, 2, 3),
            Err(InferenceError::DimensionMismatch { stage: "classifier input", .. })
        ));
    }

    #[test]
    fn predicts_one_row_per_input() {
        let m = models(8, 8, 2, 2).unwrap();
        assert_eq!(m.predict(&["a"]).unwrap().len(), 1);
        assert_eq!(m.predict(&["a", "", "c"]).unwrap().len(), 3);
        assert!(m.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn short_classifier_output_is_an_error() {
        let m = InferenceModels::new(
            Arc::new(ConstEncoder(4)),
            Arc::new(Truncate { input: 4, output: 2 }),
            Arc::new(FixedClassifier {
                dim: 2,
                drop_last: true,
            }),
        )
        .unwrap();
        assert!(matches!(
            m.predict(&["a", "b"]),
            Err(InferenceError::RowCountMismatch { stage: "classifier", .. })
        ));
    }
}
