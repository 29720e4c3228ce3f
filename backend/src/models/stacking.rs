use std::collections::HashSet;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::StackingClassifier;
use crate::config::LabelConfig;
use crate::error::{InferenceError, ModelLoadError};

/// Number of stacked features: one score per base classifier.
pub const STACKED_FEATURES: usize = 2;

/// On-disk form of the fitted logistic regression meta model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticArtifact {
    pub classes: Vec<i64>,
    #[serde(default)]
    pub class_names: Option<Vec<String>>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

/// Logistic regression over the base scores. A single coefficient row is the
/// binary form (probability of the second class); `k` rows are multinomial.
#[derive(Debug, Clone)]
pub struct LogisticStacker {
    classes: Vec<i64>,
    class_names: Option<Vec<String>>,
    coef: Array2<f64>,
    intercept: Array1<f64>,
}

impl LogisticStacker {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: LogisticArtifact =
            serde_json::from_str(&raw).map_err(|source| ModelLoadError::Artifact {
                path: path.to_path_buf(),
                source,
            })?;
        let stacker = Self::from_artifact(artifact)?;
        log::info!(
            "Loaded meta model from {} (classes {:?})",
            path.display(),
            stacker.classes
        );
        Ok(stacker)
    }

    pub fn from_artifact(artifact: LogisticArtifact) -> Result<Self, ModelLoadError> {
        let LogisticArtifact {
            classes,
            class_names,
            coef,
            intercept,
        } = artifact;

        if classes.len() < 2 {
            return Err(ModelLoadError::Shape(format!(
                "need at least two classes, got {:?}",
                classes
            )));
        }
        let unique: HashSet<_> = classes.iter().collect();
        if unique.len() != classes.len() {
            return Err(ModelLoadError::Shape(format!(
                "duplicate class labels in {:?}",
                classes
            )));
        }

        let expected_rows = if classes.len() == 2 { 1 } else { classes.len() };
        if coef.len() != expected_rows {
            return Err(ModelLoadError::Shape(format!(
                "expected {} coefficient row(s) for {} classes, got {}",
                expected_rows,
                classes.len(),
                coef.len()
            )));
        }
        if let Some(row) = coef.iter().find(|row| row.len() != STACKED_FEATURES) {
            return Err(ModelLoadError::Shape(format!(
                "expected {} coefficients per row, got {}",
                STACKED_FEATURES,
                row.len()
            )));
        }
        if intercept.len() != expected_rows {
            return Err(ModelLoadError::Shape(format!(
                "expected {} intercept(s), got {}",
                expected_rows,
                intercept.len()
            )));
        }
        if let Some(names) = &class_names {
            if names.len() != classes.len() {
                return Err(ModelLoadError::Shape(format!(
                    "{} class names for {} classes",
                    names.len(),
                    classes.len()
                )));
            }
        }

        let flat: Vec<f64> = coef.into_iter().flatten().collect();
        let coef = Array2::from_shape_vec((expected_rows, STACKED_FEATURES), flat)
            .map_err(|e| ModelLoadError::Shape(e.to_string()))?;

        Ok(Self {
            classes,
            class_names,
            coef,
            intercept: Array1::from(intercept),
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl StackingClassifier for LogisticStacker {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn class_names(&self) -> Option<&[String]> {
        self.class_names.as_deref()
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        if features.ncols() != self.coef.ncols() {
            return Err(InferenceError::Model {
                model: "meta_model".into(),
                reason: format!(
                    "expected {} features, got {}",
                    self.coef.ncols(),
                    features.ncols()
                ),
            });
        }

        let scores = features.dot(&self.coef.t()) + &self.intercept;

        let proba = if self.coef.nrows() == 1 {
            let positive = scores.column(0).mapv(sigmoid);
            let mut proba = Array2::zeros((features.nrows(), 2));
            proba.column_mut(0).assign(&positive.mapv(|p| 1.0 - p));
            proba.column_mut(1).assign(&positive);
            proba
        } else {
            let mut proba = scores;
            for mut row in proba.axis_iter_mut(Axis(0)) {
                let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
            }
            proba
        };
        Ok(proba)
    }
}

/// Finds the output column for the anemic label and checks it against the
/// artifact's class names when present.
pub fn resolve_class_index(
    model: &dyn StackingClassifier,
    labels: &LabelConfig,
) -> Result<usize, ModelLoadError> {
    let classes = model.classes();
    let index = classes
        .iter()
        .position(|&c| c == labels.anemic_label)
        .ok_or_else(|| ModelLoadError::LabelMissing {
            label: labels.anemic_label,
            classes: classes.to_vec(),
        })?;

    if let Some(names) = model.class_names() {
        let found = names.get(index).cloned().unwrap_or_default();
        if !found.eq_ignore_ascii_case(&labels.anemic_class_name) {
            return Err(ModelLoadError::LabelMismatch {
                index,
                expected: labels.anemic_class_name.clone(),
                found,
            });
        }
    }
    Ok(index)
}
