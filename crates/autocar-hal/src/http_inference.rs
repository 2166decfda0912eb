//! [`HttpModelLoader`] – remote model server backend.
//!
//! Talks to a model server on the local network (or on the car itself) that
//! exposes two endpoints:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | `GET` | `/v1/models/{name}` | succeeds when the model is available |
//! | `POST` | `/v1/models/{name}/predict?width=W&height=H` | raw RGB24 body, replies `{"scores": [..]}` |
//!
//! The top [`CROP_TOP_ROWS`] rows are removed before a frame is sent, the
//! same crop used for training samples.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use autocar_hal::http_inference::HttpModelLoader;
//! use autocar_hal::inference::ModelLoader;
//!
//! let loader = HttpModelLoader::new("http://localhost:8501", Duration::from_millis(200))
//!     .expect("client");
//! // Requires a running model server.
//! // let engine = loader.load("steer_v2").unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

use autocar_types::{CROP_TOP_ROWS, CameraFrame, CarError, PredictionVector};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::inference::{InferenceEngine, ModelLoader};

#[derive(Deserialize)]
struct PredictResponse {
    scores: Vec<f64>,
}

/// Loads models hosted by a remote model server.
///
/// Construct once at startup and hand it to model selection.
pub struct HttpModelLoader {
    base_url: String,
    client: Client,
}

impl HttpModelLoader {
    /// Create a loader for the server at `base_url`. Every request (load and
    /// predict) is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::ConfigIo`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CarError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarError::ConfigIo(format!("failed to build inference client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/v1/models/{}", self.base_url.trim_end_matches('/'), model)
    }
}

impl ModelLoader for HttpModelLoader {
    fn load(&self, model: &str) -> Result<Arc<dyn InferenceEngine>, CarError> {
        let url = self.model_url(model);
        self.client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| CarError::ModelLoad {
                model: model.to_string(),
                details: e.to_string(),
            })?;
        debug!(model, url = %url, "model available on inference server");
        Ok(Arc::new(HttpEngine {
            predict_url: format!("{url}/predict"),
            client: self.client.clone(),
        }))
    }
}

/// A model served by the remote server.
struct HttpEngine {
    predict_url: String,
    client: Client,
}

impl InferenceEngine for HttpEngine {
    #[instrument(name = "http_predict", skip_all, fields(url = %self.predict_url))]
    fn predict(&self, frame: &CameraFrame) -> Result<PredictionVector, CarError> {
        let input = frame.crop_top(CROP_TOP_ROWS);
        let response: PredictResponse = self
            .client
            .post(&self.predict_url)
            .query(&[("width", input.width), ("height", input.height)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(input.data)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| CarError::Inference(e.to_string()))?;

        if response.scores.is_empty() {
            return Err(CarError::Inference(
                "model server returned an empty score vector".to_string(),
            ));
        }
        Ok(PredictionVector::new(response.scores))
    }
}
