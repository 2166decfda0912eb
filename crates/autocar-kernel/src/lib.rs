//! `autocar-kernel` – the control core.
//!
//! Owns the car's state and decides, frame by frame and command by command,
//! what the steering servo and the throttle ESC are told to do.
//!
//! # Modules
//!
//! - [`car`] – [`Car`] and its shared form [`CarHandle`]: the single lock
//!   around state, bound frame handler, loaded model and actuator output.
//! - [`policy`] – pure mapping from predictions and operator inputs to
//!   calibrated PWM values.
//! - [`mode_controller`] – the Resting / Training / DirAuto / Auto state
//!   machine, speed modes and streaming toggle.
//! - [`ingress`] – manual steering/throttle, the start toggle and the
//!   throttle gain.
//! - [`model`] – model selection through a
//!   [`ModelLoader`][autocar_hal::ModelLoader].
//! - [`state`] – [`CarState`].

pub mod car;
pub mod ingress;
pub mod mode_controller;
pub mod model;
pub mod policy;
pub mod state;

pub use car::{Car, CarHandle, FrameHandler, FrameOutcome};
pub use policy::Actuation;
pub use state::{CarState, DEFAULT_MAX_SPEED_RATE};
