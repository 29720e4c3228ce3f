//! Model runtimes behind the screening pipeline.
//!
//! Base classifiers take a `1×H×W×3` batch of raw RGB intensities and return
//! one anemic probability. The stacking classifier turns the two base scores
//! into a probability distribution over its own class list.

use ndarray::{Array2, Array4};

use crate::config::InputLayout;
use crate::error::InferenceError;

pub mod loader;
pub mod onnx;
pub mod stacking;
#[cfg(feature = "torch")]
pub mod torch;

pub trait BaseClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, batch: &Array4<u8>) -> Result<f32, InferenceError>;
}

pub trait StackingClassifier: Send + Sync {
    /// Label values in output column order.
    fn classes(&self) -> &[i64];

    /// Human readable names stored alongside the artifact, if any.
    fn class_names(&self) -> Option<&[String]> {
        None
    }

    /// One row of probabilities per feature row.
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
}

/// Casts the batch to `f32` without normalization and lays it out for the runtime.
pub fn to_float_input(batch: &Array4<u8>, layout: InputLayout) -> Array4<f32> {
    let input = batch.mapv(f32::from);
    match layout {
        InputLayout::Nhwc => input,
        InputLayout::Nchw => input
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned(),
    }
}

/// First element of a model output, which is the probability for a single-image
/// batch with a sigmoid head.
pub(crate) fn first_score<'a, I>(model: &str, values: I) -> Result<f32, InferenceError>
where
    I: IntoIterator<Item = &'a f32>,
{
    let score = values
        .into_iter()
        .next()
        .copied()
        .ok_or_else(|| InferenceError::EmptyOutput {
            model: model.to_string(),
        })?;
    if !score.is_finite() {
        return Err(InferenceError::NonFinite(model.to_string()));
    }
    Ok(score)
}
