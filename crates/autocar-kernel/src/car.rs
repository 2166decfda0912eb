//! [`Car`] – the control core aggregate, and [`CarHandle`], its shared,
//! lock-guarded form.
//!
//! A single mutex guards the [`CarState`], the bound [`FrameHandler`], the
//! loaded model and the [`ActuatorOutput`]. Every read-modify-write of the
//! state and every PWM write happens while holding it, so a mode switch's
//! defensive neutral command can never be overtaken by a stale write from
//! the capture thread.
//!
//! Mode transitions live in [`mode_controller`][crate::mode_controller],
//! operator commands in [`ingress`][crate::ingress], model selection in
//! [`model`][crate::model].

use std::sync::Arc;

use autocar_hal::{ActuatorOutput, InferenceEngine};
use autocar_middleware::NotificationBus;
use autocar_types::{Calibration, DriveMode, EventPayload, PredictionVector, TrainingLabel};
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::policy::{self, Actuation};
use crate::state::CarState;

/// Per-frame behaviour bound by the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHandler {
    /// Resting: do nothing.
    Idle,
    /// Training: label the frame for the dataset.
    Record,
    /// DirAuto: steer from the prediction.
    SteerOnly,
    /// Auto: steer and drive from the prediction.
    Autopilot,
}

impl FrameHandler {
    /// The handler that implements `mode`.
    pub fn for_mode(mode: DriveMode) -> Self {
        match mode {
            DriveMode::Resting => FrameHandler::Idle,
            DriveMode::Training => FrameHandler::Record,
            DriveMode::DirAuto => FrameHandler::SteerOnly,
            DriveMode::Auto => FrameHandler::Autopilot,
        }
    }
}

/// What the bound handler did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Idle,
    /// The frame must be saved with this label.
    Record(TrainingLabel),
    /// These values were written to the actuators.
    Actuated(Actuation),
}

pub(crate) struct LoadedModel {
    pub(crate) name: String,
    pub(crate) engine: Arc<dyn InferenceEngine>,
}

/// The control core: state, bound handler, model and actuator output.
pub struct Car {
    pub(crate) state: CarState,
    pub(crate) handler: FrameHandler,
    pub(crate) calibration: Arc<Calibration>,
    pub(crate) output: ActuatorOutput,
    pub(crate) bus: NotificationBus,
    pub(crate) model: Option<LoadedModel>,
}

impl Car {
    /// A resting, stopped car with no model.
    pub fn new(calibration: Arc<Calibration>, output: ActuatorOutput, bus: NotificationBus) -> Self {
        Self {
            state: CarState::default(),
            handler: FrameHandler::Idle,
            calibration,
            output,
            bus,
            model: None,
        }
    }

    pub fn state(&self) -> &CarState {
        &self.state
    }

    /// The handler currently invoked for each frame.
    pub fn handler(&self) -> FrameHandler {
        self.handler
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Name of the loaded model, if any.
    pub fn current_model(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.name.as_str())
    }

    /// The engine to run on the next frame, or `None` when this frame must
    /// use the neutral prediction (not started, non-autonomous mode, or no
    /// model).
    pub fn engine_for_frame(&self) -> Option<Arc<dyn InferenceEngine>> {
        if !(self.state.started && self.state.mode.requires_model()) {
            return None;
        }
        self.model.as_ref().map(|m| Arc::clone(&m.engine))
    }

    /// Run the bound handler on a frame's prediction.
    pub fn handle_frame(&mut self, prediction: &PredictionVector) -> FrameOutcome {
        match self.handler {
            FrameHandler::Idle => FrameOutcome::Idle,
            FrameHandler::Record => {
                let label = TrainingLabel {
                    index: self.state.frame_index,
                    gas: self.state.curr_gas,
                    dir: self.state.curr_dir,
                };
                self.state.frame_index += 1;
                FrameOutcome::Record(label)
            }
            FrameHandler::SteerOnly => {
                let actuation = self.actuation(prediction, DriveMode::DirAuto);
                // The throttle belongs to the operator in this mode.
                if let Some(dir) = actuation.dir {
                    self.output.dir(dir);
                }
                FrameOutcome::Actuated(Actuation {
                    gas: None,
                    dir: actuation.dir,
                })
            }
            FrameHandler::Autopilot => {
                let actuation = self.actuation(prediction, DriveMode::Auto);
                if let Some(gas) = actuation.gas {
                    self.output.gas(gas);
                }
                if let Some(dir) = actuation.dir {
                    self.output.dir(dir);
                }
                FrameOutcome::Actuated(actuation)
            }
        }
    }

    fn actuation(&self, prediction: &PredictionVector, mode: DriveMode) -> Actuation {
        policy::compute(
            prediction,
            mode,
            self.state.speed_mode,
            &self.calibration,
            self.state.started,
            self.state.max_speed_rate,
        )
    }

    /// Command neutral throttle and straight wheels.
    pub(crate) fn stop(&mut self) {
        self.output.gas(self.calibration.neutral);
        self.output.dir(self.calibration.straight);
    }

    pub(crate) fn notify(&self, source: &str, payload: EventPayload) {
        let delivered = self.bus.notify(source, payload);
        trace!(source, delivered, "notification published");
    }
}

/// Cloneable, thread-safe handle to the [`Car`].
#[derive(Clone)]
pub struct CarHandle(Arc<Mutex<Car>>);

impl CarHandle {
    pub fn new(car: Car) -> Self {
        Self(Arc::new(Mutex::new(car)))
    }

    /// Lock the car. Keep the guard for as short as possible: the capture
    /// thread and the command ingress contend for it.
    pub fn lock(&self) -> MutexGuard<'_, Car> {
        self.0.lock()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> CarState {
        self.lock().state.clone()
    }

    pub fn handler(&self) -> FrameHandler {
        self.lock().handler
    }

    pub fn current_model(&self) -> Option<String> {
        self.lock().current_model().map(str::to_string)
    }
}
