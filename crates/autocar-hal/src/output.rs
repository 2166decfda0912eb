//! [`ActuatorOutput`] – routes throttle and steering values to the PWM board.
//!
//! The output knows which channel carries the throttle ESC and which carries
//! the steering servo (both from the [`Calibration`]). Writes are
//! fire-and-forget: a failing driver is logged and the write dropped, and
//! when no driver could be opened at startup the output runs in *degraded*
//! mode where every write is only logged.

use autocar_types::Calibration;
use tracing::{debug, warn};

use crate::actuator::PwmDriver;

/// Throttle/steering output stage.
pub struct ActuatorOutput {
    driver: Option<Box<dyn PwmDriver>>,
    gas_pin: u8,
    dir_pin: u8,
}

impl ActuatorOutput {
    /// Build the output stage. Pass `None` when no PWM board is available.
    pub fn new(driver: Option<Box<dyn PwmDriver>>, calibration: &Calibration) -> Self {
        if driver.is_none() {
            warn!("no PWM driver available; the car will not be able to move");
        }
        Self {
            driver,
            gas_pin: calibration.gas_pin,
            dir_pin: calibration.dir_pin,
        }
    }

    /// `true` when writes are only logged.
    pub fn is_degraded(&self) -> bool {
        self.driver.is_none()
    }

    /// Send `value` on the throttle channel.
    pub fn gas(&mut self, value: i32) {
        self.write("gas", self.gas_pin, value);
    }

    /// Send `value` on the steering channel.
    pub fn dir(&mut self, value: i32) {
        self.write("dir", self.dir_pin, value);
    }

    fn write(&mut self, label: &'static str, channel: u8, value: i32) {
        match self.driver.as_mut() {
            Some(driver) => match driver.set_pwm(channel, value) {
                Ok(()) => debug!(output = label, channel, value, "pwm write"),
                Err(e) => warn!(output = label, channel, value, error = %e, "pwm write failed; dropped"),
            },
            None => debug!(output = label, channel, value, "pwm write (degraded, not sent)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{PwmWrite, SimPwm};

    fn calibration() -> Calibration {
        Calibration {
            dir_pin: 1,
            gas_pin: 2,
            left: 310,
            straight: 410,
            right: 510,
            stop: 210,
            neutral: 385,
            drive: 400,
            drive_max: 460,
            invert_dir: -1.0,
        }
    }

    #[test]
    fn routes_gas_and_dir_to_calibrated_channels() {
        let (pwm, log) = SimPwm::new();
        let mut out = ActuatorOutput::new(Some(pwm), &calibration());
        assert!(!out.is_degraded());

        out.gas(385);
        out.dir(410);

        assert_eq!(
            log.writes(),
            vec![
                PwmWrite { channel: 2, value: 385 },
                PwmWrite { channel: 1, value: 410 },
            ]
        );
    }

    #[test]
    fn degraded_output_drops_writes_silently() {
        let mut out = ActuatorOutput::new(None, &calibration());
        assert!(out.is_degraded());
        // Must not panic.
        out.gas(400);
        out.dir(310);
    }

    #[test]
    fn failing_driver_is_not_fatal() {
        let mut out = ActuatorOutput::new(Some(SimPwm::failing()), &calibration());
        out.gas(400);
        out.dir(310);
        assert!(!out.is_degraded());
    }
}
