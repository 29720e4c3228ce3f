use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use super::{first_score, to_float_input, BaseClassifier};
use crate::config::InputLayout;
use crate::error::{InferenceError, ModelLoadError};

/// Base classifier exported to ONNX, evaluated with onnxruntime.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    layout: InputLayout,
}

fn build_session(path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)?;
    Ok(session)
}

impl OnnxClassifier {
    pub fn load(name: &str, path: &Path, layout: InputLayout) -> Result<Self, ModelLoadError> {
        let session = build_session(path).map_err(|e| ModelLoadError::Runtime {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        log::info!("Loaded ONNX model '{}' from {}", name, path.display());

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            layout,
        })
    }

    fn model_error(&self, reason: impl ToString) -> InferenceError {
        InferenceError::Model {
            model: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl BaseClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, batch: &Array4<u8>) -> Result<f32, InferenceError> {
        let input = Tensor::from_array(to_float_input(batch, self.layout))
            .map_err(|e| self.model_error(e))?;

        // Session::run needs exclusive access
        let mut session = self
            .session
            .lock()
            .map_err(|_| self.model_error("session mutex poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| self.model_error(e))?;
        let scores = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| self.model_error(e))?;

        first_score(&self.name, scores.iter())
    }
}
