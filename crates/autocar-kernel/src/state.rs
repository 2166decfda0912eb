//! [`CarState`] – the mutable state of the control core.

use autocar_types::{DriveMode, SpeedMode};

/// Throttle gain applied until the operator changes it.
pub const DEFAULT_MAX_SPEED_RATE: f64 = 0.5;

/// Everything the capture loop and the command ingress share.
///
/// Only ever accessed through the [`Car`][crate::car::Car] lock.
#[derive(Debug, Clone, PartialEq)]
pub struct CarState {
    pub mode: DriveMode,
    pub speed_mode: SpeedMode,
    /// Master safety gate: when `false` the car is held at neutral/straight.
    pub started: bool,
    /// Unitless gain applied to every throttle command.
    pub max_speed_rate: f64,
    /// Last operator direction, used as the training label.
    pub curr_dir: f64,
    /// Last operator throttle, used as the training label.
    pub curr_gas: f64,
    pub model_loaded: bool,
    /// Forward frames on the picture stream.
    pub streaming_state: bool,
    /// Index of the next training frame.
    pub frame_index: u64,
}

impl Default for CarState {
    fn default() -> Self {
        Self {
            mode: DriveMode::Resting,
            speed_mode: SpeedMode::Constant,
            started: false,
            max_speed_rate: DEFAULT_MAX_SPEED_RATE,
            curr_dir: 0.0,
            curr_gas: 0.0,
            model_loaded: false,
            streaming_state: false,
            frame_index: 0,
        }
    }
}
