//! In-process simulated drivers for running the control loop without a car.
//!
//! These stubs let the full stack run on a laptop and in CI: a camera that
//! produces blank frames, a PWM board that records every write, and a model
//! loader serving fixed score vectors.
//!
//! # Example
//!
//! ```rust
//! use autocar_hal::actuator::PwmDriver;
//! use autocar_hal::sim::SimPwm;
//!
//! let (mut pwm, log) = SimPwm::new();
//! pwm.set_pwm(2, 385).expect("sim pwm must succeed");
//! assert_eq!(log.last_on(2), Some(385));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use autocar_types::{CameraFrame, CarError, PredictionVector};
use parking_lot::Mutex;

use crate::actuator::PwmDriver;
use crate::camera::{CAM_HEIGHT, CAM_WIDTH, Camera};
use crate::inference::{InferenceEngine, ModelLoader};

// ────────────────────────────────────────────────────────────────────────────
// Recording PWM board
// ────────────────────────────────────────────────────────────────────────────

/// One recorded PWM write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmWrite {
    pub channel: u8,
    pub value: i32,
}

/// Shared, cloneable view of the writes received by a [`SimPwm`].
#[derive(Debug, Clone, Default)]
pub struct PwmLog(Arc<Mutex<Vec<PwmWrite>>>);

impl PwmLog {
    /// Every write in arrival order.
    pub fn writes(&self) -> Vec<PwmWrite> {
        self.0.lock().clone()
    }

    /// Most recent value written on `channel`.
    pub fn last_on(&self, channel: u8) -> Option<i32> {
        self.0
            .lock()
            .iter()
            .rev()
            .find(|w| w.channel == channel)
            .map(|w| w.value)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, write: PwmWrite) {
        self.0.lock().push(write);
    }
}

/// A simulated PWM board that records every write into a [`PwmLog`].
pub struct SimPwm {
    log: PwmLog,
    fail: bool,
}

impl SimPwm {
    /// Create a recording board and the log handle to inspect it.
    pub fn new() -> (Box<Self>, PwmLog) {
        let log = PwmLog::default();
        (
            Box::new(Self {
                log: log.clone(),
                fail: false,
            }),
            log,
        )
    }

    /// A board whose every write fails.
    pub fn failing() -> Box<Self> {
        Box::new(Self {
            log: PwmLog::default(),
            fail: true,
        })
    }
}

impl PwmDriver for SimPwm {
    fn set_pwm(&mut self, channel: u8, value: i32) -> Result<(), CarError> {
        if self.fail {
            return Err(CarError::Actuator {
                channel,
                details: "simulated bus error".to_string(),
            });
        }
        self.log.push(PwmWrite { channel, value });
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera returning blank 250×150 RGB frames.
///
/// With [`with_fps`][Self::with_fps] the camera paces itself like a real
/// sensor; with [`with_limit`][Self::with_limit] it fails after a fixed
/// number of frames, emulating a disconnected device.
pub struct SimCamera {
    id: String,
    interval: Option<Duration>,
    remaining: Option<usize>,
}

impl SimCamera {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interval: None,
            remaining: None,
        }
    }

    /// Sleep `1 / fps` seconds before each frame.
    pub fn with_fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.interval = Some(Duration::from_secs_f64(1.0 / f64::from(fps)));
        }
        self
    }

    /// Deliver `frames` frames, then fail with [`CarError::Camera`].
    pub fn with_limit(mut self, frames: usize) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, CarError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CarError::Camera(format!(
                    "camera '{}' disconnected",
                    self.id
                )));
            }
            *remaining -= 1;
        }
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }
        Ok(CameraFrame::blank(CAM_WIDTH, CAM_HEIGHT))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inference
// ────────────────────────────────────────────────────────────────────────────

/// A model that always returns the same scores (or always fails), counting
/// how often it was asked.
pub struct FixedEngine {
    scores: Option<Vec<f64>>,
    calls: AtomicUsize,
}

impl FixedEngine {
    pub fn new(scores: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            scores: Some(scores),
            calls: AtomicUsize::new(0),
        })
    }

    /// An engine whose every prediction fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            scores: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl InferenceEngine for FixedEngine {
    fn predict(&self, _frame: &CameraFrame) -> Result<PredictionVector, CarError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.scores {
            Some(scores) => Ok(PredictionVector::new(scores.clone())),
            None => Err(CarError::Inference("simulated inference failure".to_string())),
        }
    }
}

/// Loader serving a fixed set of named [`FixedEngine`]s.
#[derive(Default)]
pub struct SimModelLoader {
    models: HashMap<String, Arc<FixedEngine>>,
}

impl SimModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `engine` under `name`.
    pub fn with_model(mut self, name: impl Into<String>, engine: Arc<FixedEngine>) -> Self {
        self.models.insert(name.into(), engine);
        self
    }
}

impl ModelLoader for SimModelLoader {
    fn load(&self, model: &str) -> Result<Arc<dyn InferenceEngine>, CarError> {
        match self.models.get(model) {
            Some(engine) => Ok(Arc::clone(engine) as Arc<dyn InferenceEngine>),
            None => Err(CarError::ModelLoad {
                model: model.to_string(),
                details: "no such model".to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_pwm_records_writes() {
        let (mut pwm, log) = SimPwm::new();
        assert!(log.is_empty());
        pwm.set_pwm(1, 410).unwrap();
        pwm.set_pwm(2, 385).unwrap();
        pwm.set_pwm(1, 310).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.last_on(1), Some(310));
        assert_eq!(log.last_on(2), Some(385));
        assert_eq!(log.last_on(3), None);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn failing_pwm_returns_actuator_error() {
        let mut pwm = SimPwm::failing();
        assert!(matches!(
            pwm.set_pwm(2, 385),
            Err(CarError::Actuator { channel: 2, .. })
        ));
    }

    #[test]
    fn sim_camera_returns_blank_frame() {
        let mut cam = SimCamera::new("front");
        let frame = cam.capture().unwrap();
        assert_eq!(frame.width, CAM_WIDTH);
        assert_eq!(frame.height, CAM_HEIGHT);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn sim_camera_fails_after_limit() {
        let mut cam = SimCamera::new("front").with_limit(2);
        assert!(cam.capture().is_ok());
        assert!(cam.capture().is_ok());
        assert!(matches!(cam.capture(), Err(CarError::Camera(_))));
    }

    #[test]
    fn fixed_engine_counts_calls() {
        let engine = FixedEngine::new(vec![0.0, 1.0, 0.0, 0.0, 0.0]);
        let frame = CameraFrame::blank(2, 2);
        let p = engine.predict(&frame).unwrap();
        assert_eq!(p.argmax(), 1);
        assert!(FixedEngine::failing().predict(&frame).is_err());
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn sim_model_loader_resolves_known_models_only() {
        let loader =
            SimModelLoader::new().with_model("steer", FixedEngine::new(vec![1.0, 0.0]));
        assert!(loader.load("steer").is_ok());
        assert!(matches!(
            loader.load("missing"),
            Err(CarError::ModelLoad { .. })
        ));
    }
}
