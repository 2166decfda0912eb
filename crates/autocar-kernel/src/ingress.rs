//! Operator commands: manual steering and throttle, the start toggle and the
//! throttle gain.
//!
//! Manual commands are gated by `started` and the current mode; a gated
//! command is dropped silently (`Ok(None)`). Non-finite inputs are rejected
//! before any state is touched.

use autocar_types::{CarError, DriveMode, EventPayload};
use tracing::{debug, info};

use crate::car::{Car, CarHandle};
use crate::policy;

const SOURCE: &str = "autocar-kernel::ingress";

fn finite(name: &str, value: f64) -> Result<f64, CarError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CarError::InvalidCommand(format!("{name} must be finite, got {value}")))
    }
}

impl Car {
    /// Manual steering. Only honoured while started in
    /// [`DriveMode::Training`]; returns the PWM value written.
    pub fn on_dir(&mut self, intensity: f64) -> Result<Option<i32>, CarError> {
        let intensity = finite("direction", intensity)?;
        if !self.state.started || self.state.mode != DriveMode::Training {
            debug!(mode = %self.state.mode, started = self.state.started, "ignoring dir command");
            return Ok(None);
        }

        let (curr_dir, value) = policy::manual_direction(intensity, &self.calibration);
        self.state.curr_dir = curr_dir;
        self.output.dir(value);
        Ok(Some(value))
    }

    /// Manual throttle. Only honoured while started in
    /// [`DriveMode::Training`] or [`DriveMode::DirAuto`]; returns the PWM
    /// value written.
    pub fn on_gas(&mut self, intensity: f64) -> Result<Option<i32>, CarError> {
        let intensity = finite("gas", intensity)?;
        if !self.state.started
            || !matches!(self.state.mode, DriveMode::Training | DriveMode::DirAuto)
        {
            debug!(mode = %self.state.mode, started = self.state.started, "ignoring gas command");
            return Ok(None);
        }

        let (curr_gas, value) =
            policy::manual_gas(intensity, self.state.max_speed_rate, &self.calibration);
        self.state.curr_gas = curr_gas;
        self.output.gas(value);
        Ok(Some(value))
    }

    /// Flip the master `started` gate. Nothing is written here; the next
    /// frame or command acts on the new value.
    pub fn on_start_toggle(&mut self) -> bool {
        self.state.started = !self.state.started;
        info!(started = self.state.started, mode = %self.state.mode, "starter toggled");
        self.state.started
    }

    /// Replace the throttle gain. Any finite value is accepted, including
    /// values outside `[0, 1]`.
    pub fn set_max_speed(&mut self, rate: f64) -> Result<f64, CarError> {
        let rate = finite("max speed rate", rate)?;
        self.state.max_speed_rate = rate;
        info!(rate, "max speed rate updated");
        self.notify(SOURCE, EventPayload::MaxSpeedChanged { rate });
        Ok(rate)
    }
}

impl CarHandle {
    /// See [`Car::on_dir`].
    pub fn on_dir(&self, intensity: f64) -> Result<Option<i32>, CarError> {
        self.lock().on_dir(intensity)
    }

    /// See [`Car::on_gas`].
    pub fn on_gas(&self, intensity: f64) -> Result<Option<i32>, CarError> {
        self.lock().on_gas(intensity)
    }

    /// See [`Car::on_start_toggle`].
    pub fn on_start_toggle(&self) -> bool {
        self.lock().on_start_toggle()
    }

    /// See [`Car::set_max_speed`].
    pub fn set_max_speed(&self, rate: f64) -> Result<f64, CarError> {
        self.lock().set_max_speed(rate)
    }
}
