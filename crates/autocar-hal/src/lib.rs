//! `autocar-hal` – Hardware and model capabilities
//!
//! Traits for everything the control loop talks to outside the process,
//! with the implementations that can be resolved at startup.
//!
//! # Modules
//!
//! - [`actuator`] – [`PwmDriver`][actuator::PwmDriver]: a multi-channel PWM
//!   board.
//! - [`camera`] – [`Camera`][camera::Camera]: blocking frame source.
//! - [`inference`] – [`InferenceEngine`][inference::InferenceEngine] and
//!   [`ModelLoader`][inference::ModelLoader], plus the
//!   [`UnavailableModelLoader`][inference::UnavailableModelLoader] null
//!   object.
//! - [`http_inference`] – [`HttpModelLoader`][http_inference::HttpModelLoader]:
//!   models served by a remote model server.
//! - [`output`] – [`ActuatorOutput`][output::ActuatorOutput]: routes
//!   throttle/steering values to calibrated channels, degrading to logging
//!   when no board is present.
//! - [`sim`] – simulated camera, PWM board and models for laptops and CI.

pub mod actuator;
pub mod camera;
pub mod http_inference;
pub mod inference;
pub mod output;
pub mod sim;

pub use actuator::PwmDriver;
pub use camera::{CAM_HEIGHT, CAM_WIDTH, Camera};
pub use http_inference::HttpModelLoader;
pub use inference::{InferenceEngine, ModelLoader, UnavailableModelLoader};
pub use output::ActuatorOutput;
