//! PCA projection loaded from a fitted artifact.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DimensionalityReducer, InferenceError};

/// Serialized form of a fitted PCA: `components` is `[n_components][n_features]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaArtifact {
    pub mean: Vec<f32>,
    pub components: Vec<Vec<f32>>,
    #[serde(default)]
    pub explained_variance: Option<Vec<f32>>,
    #[serde(default)]
    pub whiten: bool,
}

/// Applies `(x - mean) · componentsᵀ`, optionally whitened.
#[derive(Debug, Clone)]
pub struct PcaReducer {
    mean: Array1<f32>,
    components: Array2<f32>,
    scale: Option<Array1<f32>>,
}

impl PcaReducer {
    /// Load a PCA artifact from a JSON file.
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        if !path.exists() {
            return Err(InferenceError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let source = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::Artifact {
            path: source.clone(),
            message: e.to_string(),
        })?;
        let artifact: PcaArtifact =
            serde_json::from_str(&raw).map_err(|e| InferenceError::Artifact {
                path: source.clone(),
                message: e.to_string(),
            })?;

        let reducer = Self::from_artifact(artifact, &source)?;
        info!(
            input_dim = reducer.input_dim(),
            output_dim = reducer.output_dim(),
            path = %source,
            "loaded PCA projection"
        );
        Ok(reducer)
    }

    /// Validate and build a reducer from an already-parsed artifact.
    pub fn from_artifact(artifact: PcaArtifact, source: &str) -> Result<Self, InferenceError> {
        let invalid = |message: String| InferenceError::Artifact {
            path: source.to_string(),
            message,
        };

        let n_features = artifact.mean.len();
        let n_components = artifact.components.len();
        if n_features == 0 || n_components == 0 {
            return Err(invalid("empty mean or components".to_string()));
        }
        if let Some(row) = artifact.components.iter().position(|c| c.len() != n_features) {
            return Err(invalid(format!(
                "component {row} has {} entries, expected {n_features}",
                artifact.components[row].len()
            )));
        }

        let scale = if artifact.whiten {
            let variance = artifact
                .explained_variance
                .ok_or_else(|| invalid("whiten is set but explained_variance is missing".to_string()))?;
            if variance.len() != n_components {
                return Err(invalid(format!(
                    "explained_variance has {} entries, expected {n_components}",
                    variance.len()
                )));
            }
            if variance.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err(invalid("explained_variance must be positive".to_string()));
            }
            Some(Array1::from_iter(variance.into_iter().map(f32::sqrt)))
        } else {
            None
        };

        let flat: Vec<f32> = artifact.components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((n_components, n_features), flat)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            mean: Array1::from_vec(artifact.mean),
            components,
            scale,
        })
    }
}

impl DimensionalityReducer for PcaReducer {
    fn reduce(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        if vectors.ncols() != self.input_dim() {
            return Err(InferenceError::DimensionMismatch {
                stage: "reducer",
                expected: self.input_dim(),
                actual: vectors.ncols(),
            });
        }

        let centered = &vectors - &self.mean;
        let mut projected = centered.dot(&self.components.t());

        if let Some(scale) = &self.scale {
            for mut row in projected.rows_mut() {
                row /= scale;
            }
        }
        Ok(projected)
    }

    fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    fn output_dim(&self) -> usize {
        self.components.nrows()
    }
}
