//! Multinomial logistic regression loaded from fitted weights.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CategoryClassifier, InferenceError, RawPrediction};
use crate::models::Category;

/// Serialized classifier weights: `coef` is `[n_classes][n_features]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub classes: Vec<String>,
    pub coef: Vec<Vec<f32>>,
    pub intercept: Vec<f32>,
}

/// Softmax over `x · coefᵀ + intercept`.
///
/// When two classes share the maximum posterior, the one listed first in
/// the artifact's `classes` wins. That order is whatever the training
/// library stored; it is not otherwise specified.
#[derive(Debug, Clone)]
pub struct LogisticRegressionClassifier {
    classes: Vec<Category>,
    coef: Array2<f32>,
    intercept: Array1<f32>,
}

impl LogisticRegressionClassifier {
    /// Load classifier weights from a JSON file.
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
        let artifact: ClassifierArtifact =
            serde_json::from_str(&raw).map_err(|e| InferenceError::Artifact {
                path: source.clone(),
                message: e.to_string(),
            })?;

        let classifier = Self::from_artifact(artifact, &source)?;
        info!(
            classes = classifier.classes.len(),
            input_dim = classifier.input_dim(),
            path = %source,
            "loaded category classifier"
        );
        Ok(classifier)
    }

    /// Validate and build a classifier. Every class name must be a known category.
    pub fn from_artifact(artifact: ClassifierArtifact, source: &str) -> Result<Self, InferenceError> {
        let invalid = |message: String| InferenceError::Artifact {
            path: source.to_string(),
            message,
        };

        let classes = artifact
            .classes
            .iter()
            .map(|c| c.parse::<Category>().map_err(|e| invalid(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let n_classes = classes.len();
        if n_classes < 2 {
            return Err(invalid(format!("expected at least 2 classes, got {n_classes}")));
        }
        if artifact.coef.len() != n_classes || artifact.intercept.len() != n_classes {
            return Err(invalid(format!(
                "{n_classes} classes but {} coefficient rows and {} intercepts",
                artifact.coef.len(),
                artifact.intercept.len()
            )));
        }
        let n_features = artifact.coef[0].len();
        if n_features == 0 || artifact.coef.iter().any(|row| row.len() != n_features) {
            return Err(invalid("coefficient rows must share a non-zero width".to_string()));
        }

        let flat: Vec<f32> = artifact.coef.into_iter().flatten().collect();
        let coef = Array2::from_shape_vec((n_classes, n_features), flat)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            classes,
            coef,
            intercept: Array1::from_vec(artifact.intercept),
        })
    }

    /// Posterior probability matrix, one row per input and one column per class.
    pub fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        if features.ncols() != self.input_dim() {
            return Err(InferenceError::DimensionMismatch {
                stage: "classifier",
                expected: self.input_dim(),
                actual: features.ncols(),
            });
        }

        let mut scores = features.dot(&self.coef.t()) + &self.intercept;
        for mut row in scores.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        Ok(scores)
    }
}

impl CategoryClassifier for LogisticRegressionClassifier {
    fn classify(&self, features: ArrayView2<'_, f32>) -> Result<Vec<RawPrediction>, InferenceError> {
        let posterior = self.predict_proba(features)?;

        Ok(posterior
            .axis_iter(Axis(0))
            .map(|row| {
                let (best, confidence) = row.iter().enumerate().fold(
                    (0usize, f32::NEG_INFINITY),
                    |(bi, bp), (i, &p)| if p > bp { (i, p) } else { (bi, bp) },
                );
                RawPrediction::new(self.classes[best].as_str(), confidence)
            })
            .collect())
    }

    fn input_dim(&self) -> usize {
        self.coef.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn artifact() -> ClassifierArtifact {
        ClassifierArtifact {
            classes: Category::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            coef: vec![
                vec![4.0, 0.0],
                vec![0.0, 4.0],
                vec![-4.0, 0.0],
                vec![0.0, -4.0],
                vec![0.0, 0.0],
            ],
            intercept: vec![0.0; 5],
        }
    }

    #[test]
    fn posteriors_sum_to_one() {
        let clf = LogisticRegressionClassifier::from_artifact(artifact(), "test").unwrap();
        let p = clf
            .predict_proba(array![[0.3f32, -0.7], [10.0, 10.0], [0.0, 0.0]].view())
            .unwrap();
        for row in p.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-5);
            assert!(row.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn picks_the_highest_posterior_class() {
        let clf = LogisticRegressionClassifier::from_artifact(artifact(), "test").unwrap();
        let out = clf
            .classify(array![[1.0f32, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]].view())
            .unwrap();
        let labels: Vec<&str> = out.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["DUPLICATE_CHARGE", "FAILED_TRANSACTION", "FRAUD", "REFUND_PENDING"]
        );
        for p in &out {
            assert!(p.confidence > 0.5 && p.confidence <= 1.0, "{p:?}");
        }
    }

    #[test]
    fn exact_tie_resolves_to_first_class_in_artifact_order() {
        let clf = LogisticRegressionClassifier::from_artifact(artifact(), "test").unwrap();
        let out = clf.classify(array![[0.0f32, 0.0]].view()).unwrap();
        assert_eq!(out[0].label, "DUPLICATE_CHARGE");
        assert!((out[0].confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn large_logits_stay_finite() {
        let clf = LogisticRegressionClassifier::from_artifact(artifact(), "test").unwrap();
        let out = clf.classify(array![[1000.0f32, 0.0]].view()).unwrap();
        assert_eq!(out[0].label, "DUPLICATE_CHARGE");
        assert!(out[0].confidence.is_finite());
        assert!((out[0].confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_class_name_fails_at_load() {
        let mut a = artifact();
        a.classes[4] = "CHARGEBACK".to_string();
        match LogisticRegressionClassifier::from_artifact(a, "weights.json") {
            Err(InferenceError::Artifact { path, message }) => {
                assert_eq!(path, "weights.json");
                assert!(message.contains("CHARGEBACK"), "{message}");
            }
            other => panic!("expected Artifact error, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_shapes_fail_at_load() {
        let mut a = artifact();
        a.intercept.pop();
        assert!(LogisticRegressionClassifier::from_artifact(a, "test").is_err());

        let mut b = artifact();
        b.coef[2].push(1.0);
        assert!(LogisticRegressionClassifier::from_artifact(b, "test").is_err());
    }

    #[test]
    fn wrong_feature_width_is_rejected() {
        let clf = LogisticRegressionClassifier::from_artifact(artifact(), "test").unwrap();
        assert!(matches!(
            clf.classify(array![[1.0f32, 2.0, 3.0]].view()),
            Err(InferenceError::DimensionMismatch { .. })
        ));
    }
}
