use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use tch::{CModule, Device, Kind, Tensor};

use super::{first_score, to_float_input, BaseClassifier};
use crate::config::InputLayout;
use crate::error::{InferenceError, ModelLoadError};

/// Base classifier exported as TorchScript.
pub struct TorchClassifier {
    name: String,
    model: Mutex<CModule>,
    layout: InputLayout,
    device: Device,
}

impl TorchClassifier {
    pub fn load(name: &str, path: &Path, layout: InputLayout) -> Result<Self, ModelLoadError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(path, device).map_err(|e| ModelLoadError::Runtime {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        log::info!(
            "Loaded TorchScript model '{}' from {} on {:?}",
            name,
            path.display(),
            device
        );

        Ok(Self {
            name: name.to_string(),
            model: Mutex::new(model),
            layout,
            device,
        })
    }

    fn model_error(&self, reason: impl ToString) -> InferenceError {
        InferenceError::Model {
            model: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl BaseClassifier for TorchClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, batch: &Array4<u8>) -> Result<f32, InferenceError> {
        let input = to_float_input(batch, self.layout);
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_slice(&data)
            .view(shape.as_slice())
            .to_device(self.device);

        let output = self
            .model
            .lock()
            .map_err(|_| self.model_error("model mutex poisoned"))?
            .forward_ts(&[tensor])
            .map_err(|e| self.model_error(e))?;

        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);

        first_score(&self.name, &output_vec)
    }
}
