//! Generic `PwmDriver` trait for the PWM board that drives the steering
//! servo and the throttle ESC.
//!
//! The rest of the stack only ever talks to the trait through
//! [`ActuatorOutput`][crate::output::ActuatorOutput], so the board driver can
//! be swapped (or be absent entirely) without touching the control loop.

use autocar_types::CarError;

/// A multi-channel PWM output board (e.g. a PCA9685 breakout).
pub trait PwmDriver: Send {
    /// Write the raw pulse `value` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Actuator`] if the value cannot be written (bus
    /// error, board unplugged, ...).
    fn set_pwm(&mut self, channel: u8, value: i32) -> Result<(), CarError>;
}
