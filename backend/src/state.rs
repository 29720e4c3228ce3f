use std::sync::Arc;

use crate::error::ModelLoadError;
use crate::pipeline::{Preprocessor, ScreeningContext};

/// Shared per-app state. `context` is `None` when startup loading failed.
#[derive(Clone)]
pub struct AppState {
    context: Option<Arc<ScreeningContext>>,
    degraded_reason: Option<String>,
    pub preprocessor: Preprocessor,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn ready(context: ScreeningContext, preprocessor: Preprocessor, max_upload_bytes: usize) -> Self {
        Self {
            context: Some(Arc::new(context)),
            degraded_reason: None,
            preprocessor,
            max_upload_bytes,
        }
    }

    pub fn degraded(reason: String, preprocessor: Preprocessor, max_upload_bytes: usize) -> Self {
        Self {
            context: None,
            degraded_reason: Some(reason),
            preprocessor,
            max_upload_bytes,
        }
    }

    pub fn from_load(
        loaded: Result<ScreeningContext, ModelLoadError>,
        preprocessor: Preprocessor,
        max_upload_bytes: usize,
    ) -> Self {
        match loaded {
            Ok(context) => Self::ready(context, preprocessor, max_upload_bytes),
            Err(e) => {
                log::error!("FATAL: Could not load models. Error: {}", e);
                log::warn!("Continuing in degraded mode; /screen will answer 503");
                Self::degraded(e.to_string(), preprocessor, max_upload_bytes)
            }
        }
    }

    pub fn context(&self) -> Option<Arc<ScreeningContext>> {
        self.context.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }
}
