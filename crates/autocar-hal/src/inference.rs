//! Inference capability: turns a camera frame into a [`PredictionVector`].
//!
//! The engine is resolved at runtime through a [`ModelLoader`] when the
//! operator selects a model. When no backend is configured the
//! [`UnavailableModelLoader`] null object is used and every load request
//! fails with a user-facing error instead of panicking at startup.

use std::sync::Arc;

use autocar_types::{CameraFrame, CarError, PredictionVector};

/// A loaded model that can score frames.
pub trait InferenceEngine: Send + Sync {
    /// Score `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Inference`] on any backend failure. Callers are
    /// expected to substitute [`PredictionVector::neutral`] and carry on.
    fn predict(&self, frame: &CameraFrame) -> Result<PredictionVector, CarError>;
}

/// Resolves a model name into a ready-to-use [`InferenceEngine`].
pub trait ModelLoader: Send + Sync {
    /// Load `model` and return the engine.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::ModelLoad`] naming the model and the cause.
    fn load(&self, model: &str) -> Result<Arc<dyn InferenceEngine>, CarError>;
}

/// Loader used when no inference backend is available on this machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableModelLoader;

impl ModelLoader for UnavailableModelLoader {
    fn load(&self, model: &str) -> Result<Arc<dyn InferenceEngine>, CarError> {
        Err(CarError::ModelLoad {
            model: model.to_string(),
            details: "no inference backend is configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_loader_names_the_model() {
        let err = match UnavailableModelLoader.load("steer_v2") {
            Ok(_) => panic!("load must fail without a backend"),
            Err(e) => e,
        };
        match err {
            CarError::ModelLoad { model, details } => {
                assert_eq!(model, "steer_v2");
                assert!(details.contains("no inference backend"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
