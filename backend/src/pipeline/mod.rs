//! The screening pipeline: pixels in, verdict out.

use ndarray::{Array2, Array3, Axis};
use shared::{RiskLevel, ScreeningResponse};

use crate::config::LabelConfig;
use crate::error::{InferenceError, ModelLoadError};
use crate::models::stacking::resolve_class_index;
use crate::models::{BaseClassifier, StackingClassifier};

pub mod preprocess;
pub mod risk;

pub use preprocess::{preprocess, Preprocessor};
pub use risk::{classify_risk, recommendation};

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub base_scores: [f32; 2],
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendation: &'static str,
}

impl Verdict {
    pub fn into_response(self, filename: String) -> ScreeningResponse {
        ScreeningResponse {
            filename,
            confidence_score: self.confidence,
            risk_level: self.risk_level,
            recommendation: self.recommendation.to_string(),
        }
    }
}

/// Read-only bundle of the loaded models, built once at startup and shared by
/// every request.
pub struct ScreeningContext {
    efficientnet: Box<dyn BaseClassifier>,
    resnet: Box<dyn BaseClassifier>,
    meta: Box<dyn StackingClassifier>,
    anemic_index: usize,
}

impl ScreeningContext {
    /// Resolves the anemic column of `meta` once; the index is fixed for the
    /// lifetime of the context.
    pub fn new(
        efficientnet: Box<dyn BaseClassifier>,
        resnet: Box<dyn BaseClassifier>,
        meta: Box<dyn StackingClassifier>,
        labels: &LabelConfig,
    ) -> Result<Self, ModelLoadError> {
        let anemic_index = resolve_class_index(meta.as_ref(), labels)?;
        Ok(Self {
            efficientnet,
            resnet,
            meta,
            anemic_index,
        })
    }

    pub fn anemic_index(&self) -> usize {
        self.anemic_index
    }

    pub fn screen(&self, pixels: Array3<u8>) -> Result<Verdict, InferenceError> {
        let batch = pixels.insert_axis(Axis(0));

        let effnet_score = self.efficientnet.predict(&batch)?;
        let resnet_score = self.resnet.predict(&batch)?;
        log::debug!(
            "Base scores: {}={:.4}, {}={:.4}",
            self.efficientnet.name(),
            effnet_score,
            self.resnet.name(),
            resnet_score
        );

        // Column order must match the order the meta model was fitted on.
        let features = Array2::from_shape_vec(
            (1, 2),
            vec![f64::from(effnet_score), f64::from(resnet_score)],
        )?;
        let proba = self.meta.predict_proba(&features)?;

        let confidence = proba
            .get((0, self.anemic_index))
            .copied()
            .ok_or(InferenceError::MissingClass {
                index: self.anemic_index,
                width: proba.ncols(),
            })?;
        if !confidence.is_finite() {
            return Err(InferenceError::NonFinite("meta_model".into()));
        }

        let risk_level = classify_risk(confidence);
        Ok(Verdict {
            base_scores: [effnet_score, resnet_score],
            confidence,
            risk_level,
            recommendation: recommendation(risk_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use std::sync::{Arc, Mutex};

    struct FixedBase {
        name: &'static str,
        score: f32,
        seen_shapes: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl FixedBase {
        fn boxed(name: &'static str, score: f32) -> Box<dyn BaseClassifier> {
            Box::new(Self {
                name,
                score,
                seen_shapes: Arc::default(),
            })
        }
    }

    impl BaseClassifier for FixedBase {
        fn name(&self) -> &str {
            self.name
        }

        fn predict(&self, batch: &Array4<u8>) -> Result<f32, InferenceError> {
            self.seen_shapes.lock().unwrap().push(batch.shape().to_vec());
            Ok(self.score)
        }
    }

    struct FailingBase;

    impl BaseClassifier for FailingBase {
        fn name(&self) -> &str {
            "broken"
        }

        fn predict(&self, _batch: &Array4<u8>) -> Result<f32, InferenceError> {
            Err(InferenceError::Model {
                model: "broken".into(),
                reason: "boom".into(),
            })
        }
    }

    /// Returns `anemic` in the column of label 0 and records the features it saw.
    struct FixedMeta {
        classes: Vec<i64>,
        anemic: f64,
        seen: Arc<Mutex<Vec<Vec<f64>>>>,
    }

    impl StackingClassifier for FixedMeta {
        fn classes(&self) -> &[i64] {
            &self.classes
        }

        fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
            self.seen
                .lock()
                .unwrap()
                .push(features.iter().copied().collect());
            let row: Vec<f64> = self
                .classes
                .iter()
                .map(|&c| if c == 0 { self.anemic } else { 1.0 - self.anemic })
                .collect();
            Ok(Array2::from_shape_vec((1, row.len()), row).unwrap())
        }
    }

    fn context(
        scores: (f32, f32),
        classes: Vec<i64>,
        anemic: f64,
    ) -> (ScreeningContext, Arc<Mutex<Vec<Vec<f64>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let meta = FixedMeta {
            classes,
            anemic,
            seen: seen.clone(),
        };
        let ctx = ScreeningContext::new(
            FixedBase::boxed("efficientnet", scores.0),
            FixedBase::boxed("resnet", scores.1),
            Box::new(meta),
            &LabelConfig::default(),
        )
        .unwrap();
        (ctx, seen)
    }

    fn pixels() -> Array3<u8> {
        Array3::zeros((224, 224, 3))
    }

    #[test]
    fn high_confidence_yields_high_risk() {
        let (ctx, _) = context((0.9, 0.8), vec![0, 1], 0.82);
        let verdict = ctx.screen(pixels()).unwrap();
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert!((verdict.confidence - 0.82).abs() < 1e-9);
        assert_eq!(verdict.recommendation, recommendation(RiskLevel::High));
    }

    #[test]
    fn low_confidence_yields_low_risk() {
        let (ctx, _) = context((0.1, 0.2), vec![0, 1], 0.05);
        let verdict = ctx.screen(pixels()).unwrap();
        assert_eq!(verdict.risk_level, RiskLevel::Low);
        assert_eq!(verdict.base_scores, [0.1, 0.2]);
    }

    #[test]
    fn features_keep_effnet_then_resnet_order() {
        let (ctx, seen) = context((0.3, 0.7), vec![0, 1], 0.5);
        ctx.screen(pixels()).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!((seen[0][0] - 0.3).abs() < 1e-6);
        assert!((seen[0][1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn reversed_class_order_still_reads_anemic_column() {
        let (ctx, _) = context((0.5, 0.5), vec![1, 0], 0.9);
        assert_eq!(ctx.anemic_index(), 1);
        let verdict = ctx.screen(pixels()).unwrap();
        assert!((verdict.confidence - 0.9).abs() < 1e-9);
        assert_eq!(verdict.risk_level, RiskLevel::High);
    }

    #[test]
    fn base_models_see_a_single_image_batch() {
        let shapes = Arc::new(Mutex::new(Vec::new()));
        let base = FixedBase {
            name: "efficientnet",
            score: 0.5,
            seen_shapes: shapes.clone(),
        };
        let meta = FixedMeta {
            classes: vec![0, 1],
            anemic: 0.5,
            seen: Arc::default(),
        };
        let ctx = ScreeningContext::new(
            Box::new(base),
            FixedBase::boxed("resnet", 0.5),
            Box::new(meta),
            &LabelConfig::default(),
        )
        .unwrap();
        ctx.screen(pixels()).unwrap();
        assert_eq!(shapes.lock().unwrap()[0], vec![1, 224, 224, 3]);
    }

    #[test]
    fn base_failure_is_an_inference_error() {
        let meta = FixedMeta {
            classes: vec![0, 1],
            anemic: 0.5,
            seen: Arc::default(),
        };
        let ctx = ScreeningContext::new(
            Box::new(FailingBase),
            FixedBase::boxed("resnet", 0.5),
            Box::new(meta),
            &LabelConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            ctx.screen(pixels()),
            Err(InferenceError::Model { .. })
        ));
    }

    #[test]
    fn nan_confidence_is_rejected() {
        let (ctx, _) = context((0.5, 0.5), vec![0, 1], f64::NAN);
        assert!(matches!(
            ctx.screen(pixels()),
            Err(InferenceError::NonFinite(_))
        ));
    }

    #[test]
    fn context_refuses_meta_model_without_anemic_label() {
        let meta = FixedMeta {
            classes: vec![1, 2],
            anemic: 0.5,
            seen: Arc::default(),
        };
        let result = ScreeningContext::new(
            FixedBase::boxed("efficientnet", 0.5),
            FixedBase::boxed("resnet", 0.5),
            Box::new(meta),
            &LabelConfig::default(),
        );
        assert!(matches!(result, Err(ModelLoadError::LabelMissing { .. })));
    }

    #[test]
    fn verdict_maps_to_wire_response() {
        let (ctx, _) = context((0.4, 0.4), vec![0, 1], 0.5);
        let response = ctx.screen(pixels()).unwrap().into_response("eye.jpg".into());
        assert_eq!(response.filename, "eye.jpg");
        assert_eq!(response.risk_level, RiskLevel::Moderate);
        assert_eq!(response.recommendation, recommendation(RiskLevel::Moderate));
    }
}
