use std::path::Path;

use super::onnx::OnnxClassifier;
use super::stacking::LogisticStacker;
use super::BaseClassifier;
use crate::config::{InputLayout, LabelConfig, ModelBackend, ModelsConfig};
use crate::error::ModelLoadError;
use crate::pipeline::ScreeningContext;

pub const EFFICIENTNET: &str = "efficientnet";
pub const RESNET: &str = "resnet";

/// Loads both base classifiers and the meta model, all or nothing.
pub fn load(
    models: &ModelsConfig,
    labels: &LabelConfig,
) -> Result<ScreeningContext, ModelLoadError> {
    let efficientnet = load_base(EFFICIENTNET, &models.efficientnet, models)?;
    let resnet = load_base(RESNET, &models.resnet, models)?;
    let meta = LogisticStacker::load(&models.meta_model)?;

    let context = ScreeningContext::new(efficientnet, resnet, Box::new(meta), labels)?;
    log::info!("All models loaded successfully.");
    log::info!(
        "Anemic class index identified as: {}",
        context.anemic_index()
    );
    Ok(context)
}

fn load_base(
    name: &str,
    path: &Path,
    models: &ModelsConfig,
) -> Result<Box<dyn BaseClassifier>, ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::Missing(path.to_path_buf()));
    }
    match models.backend {
        ModelBackend::Onnx => Ok(Box::new(OnnxClassifier::load(
            name,
            path,
            models.input_layout,
        )?)),
        ModelBackend::Torch => load_torch(name, path, models.input_layout),
    }
}

#[cfg(feature = "torch")]
fn load_torch(
    name: &str,
    path: &Path,
    layout: InputLayout,
) -> Result<Box<dyn BaseClassifier>, ModelLoadError> {
    Ok(Box::new(super::torch::TorchClassifier::load(
        name, path, layout,
    )?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(
    _name: &str,
    _path: &Path,
    _layout: InputLayout,
) -> Result<Box<dyn BaseClassifier>, ModelLoadError> {
    Err(ModelLoadError::BackendUnavailable("torch".into()))
}
