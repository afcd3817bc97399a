use anyhow::{Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the model artifact itself
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unsupported model schema version {0} (expected {SCHEMA_VERSION})")]
    SchemaVersion(u32),
    #[error("model has no classes")]
    NoClasses,
    #[error("weight row {row} has {got} values, expected {expected}")]
    WeightShape {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("expected {expected} intercepts, got {got}")]
    InterceptShape { expected: usize, got: usize },
    #[error("scaler length {got} does not match {expected} features")]
    ScalerShape { expected: usize, got: usize },
    #[error("feature vector has {got} values, model expects {expected}")]
    FeatureShape { expected: usize, got: usize },
}

const SCHEMA_VERSION: u32 = 1;

/// Optional feature standardization baked into the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl FeatureScaler {
    fn apply(&self, features: &Array1<f32>) -> Array1<f32> {
        Array1::from_iter(
            features
                .iter()
                .zip(self.mean.iter().zip(self.scale.iter()))
                .map(|(&x, (&m, &s))| if s != 0.0 { (x - m) / s } else { x - m }),
        )
    }
}

/// Pre-trained multinomial linear cry classifier
///
/// The artifact is a JSON export of the trained model: one weight row and
/// one intercept per class, scoring a feature vector as `W·x + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryClassifier {
    pub schema_version: u32,
    pub n_features: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<FeatureScaler>,
    pub weights: Vec<Vec<f32>>,
    pub intercepts: Vec<f32>,
}

/// Result of a single prediction
#[derive(Debug, Clone)]
pub struct Prediction {
    pub class_index: usize,
    pub confidence: f32,
    pub scores: Vec<f32>,
}

impl CryClassifier {
    /// Load and validate a model artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Model file not found: {:?}", path);
        }

        info!("Loading cry model from {:?}", path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {:?}", path))?;
        let model: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model file: {:?}", path))?;

        model.validate()?;

        info!(
            "Cry model loaded: {} classes, {} features",
            model.n_classes(),
            model.n_features
        );
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion(self.schema_version));
        }
        if self.weights.is_empty() {
            return Err(ModelError::NoClasses);
        }
        for (row, weights) in self.weights.iter().enumerate() {
            if weights.len() != self.n_features {
                return Err(ModelError::WeightShape {
                    row,
                    got: weights.len(),
                    expected: self.n_features,
                });
            }
        }
        if self.intercepts.len() != self.weights.len() {
            return Err(ModelError::InterceptShape {
                expected: self.weights.len(),
                got: self.intercepts.len(),
            });
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.n_features || scaler.scale.len() != self.n_features {
                return Err(ModelError::ScalerShape {
                    expected: self.n_features,
                    got: scaler.mean.len().max(scaler.scale.len()),
                });
            }
        }
        Ok(())
    }

    pub fn n_classes(&self) -> usize {
        self.weights.len()
    }

    /// Score a feature vector and return the winning class
    pub fn predict(&self, features: &Array1<f32>) -> Result<Prediction> {
        if self.weights.is_empty() {
            return Err(ModelError::NoClasses.into());
        }
        if features.len() != self.n_features {
            return Err(ModelError::FeatureShape {
                expected: self.n_features,
                got: features.len(),
            }
            .into());
        }

        let scaled = match &self.scaler {
            Some(scaler) => scaler.apply(features),
            None => features.clone(),
        };

        let scores: Vec<f32> = self
            .weights
            .iter()
            .zip(self.intercepts.iter())
            .map(|(weights, &intercept)| {
                weights
                    .iter()
                    .zip(scaled.iter())
                    .map(|(&w, &x)| w * x)
                    .sum::<f32>()
                    + intercept
            })
            .collect();

        let class_index = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("validated model has at least one class");

        let confidence = softmax_at(&scores, class_index);

        debug!(
            "Prediction: class {} (confidence {:.3})",
            class_index, confidence
        );

        Ok(Prediction {
            class_index,
            confidence,
            scores,
        })
    }
}

/// Softmax probability of one entry, computed with the max-shift trick
fn softmax_at(scores: &[f32], index: usize) -> f32 {
    let peak = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let denom: f32 = scores.iter().map(|&s| (s - peak).exp()).sum();
    (scores[index] - peak).exp() / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_model() -> CryClassifier {
        CryClassifier {
            schema_version: 1,
            n_features: 3,
            scaler: None,
            weights: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            intercepts: vec![0.0, 0.0],
        }
    }

    #[test]
    fn test_predict_argmax() {
        let model = two_class_model();

        let first = model.predict(&Array1::from(vec![2.0, 1.0, 0.0])).unwrap();
        assert_eq!(first.class_index, 0);

        let second = model.predict(&Array1::from(vec![1.0, 2.0, 0.0])).unwrap();
        assert_eq!(second.class_index, 1);
    }

    #[test]
    fn test_confidence_is_probability() {
        let model = two_class_model();
        let prediction = model.predict(&Array1::from(vec![5.0, 0.0, 0.0])).unwrap();

        assert!(prediction.confidence > 0.5);
        assert!(prediction.confidence <= 1.0);

        let total: f32 = (0..prediction.scores.len())
            .map(|i| softmax_at(&prediction.scores, i))
            .sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scaler_applied() {
        let mut model = two_class_model();
        model.scaler = Some(FeatureScaler {
            mean: vec![10.0, 0.0, 0.0],
            scale: vec![1.0, 1.0, 1.0],
        });

        // Raw features favor class 0, but standardization flips the winner
        let prediction = model.predict(&Array1::from(vec![9.0, 2.0, 0.0])).unwrap();
        assert_eq!(prediction.class_index, 1);
    }

    #[test]
    fn test_feature_length_checked() {
        let model = two_class_model();
        assert!(model.predict(&Array1::from(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_load_rejects_bad_shapes() {
        let mut model = two_class_model();
        model.weights[1] = vec![0.0, 1.0];
        assert!(model.validate().is_err());

        let mut model = two_class_model();
        model.intercepts = vec![0.0];
        assert!(model.validate().is_err());

        let mut model = two_class_model();
        model.schema_version = 9;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = two_class_model();
        std::fs::write(&path, serde_json::to_string_pretty(&model).unwrap()).unwrap();

        let loaded = CryClassifier::load(&path).unwrap();
        assert_eq!(loaded.n_classes(), 2);
        assert_eq!(loaded.n_features, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CryClassifier::load(&dir.path().join("nope.json")).is_err());
    }
}
