//! Actuation policy – pure mapping from a prediction (or an operator input)
//! to calibrated PWM values.
//!
//! Every conversion to an integer PWM value truncates toward zero, so the
//! same calibration always lands on the same pulse widths.
//!
//! # Steering
//!
//! The winning class of an `N`-bucket prediction is mapped onto `[-1, 1]`
//! (`-1 + 2 * index / (N - 1)`), then scaled by half the left/right span and
//! offset by `straight`.
//!
//! # Throttle (Auto mode)
//!
//! `max_speed_rate` is multiplied by a coefficient chosen by the
//! [`SpeedMode`]:
//!
//! | Speed mode | Coefficient |
//! |---|---|
//! | `Constant` | `1.0` |
//! | `Confidence` | `0.3` below 0.4, `0.7` below 0.7, `1.0` above |
//! | `Auto` | [`AUTO_SPEED_COEFFICIENTS`] indexed by the winning class |
//!
//! and the result is mapped linearly between `drive` and `drive_max`.

use autocar_types::{Calibration, DriveMode, PredictionVector, SpeedMode};

/// Throttle coefficient per steering bucket in [`SpeedMode::Auto`]: full
/// speed straight ahead, slower in close turns, slowest in far turns.
pub const AUTO_SPEED_COEFFICIENTS: [f64; 5] = [0.3, 0.7, 1.0, 0.7, 0.3];

/// Confidence below which the throttle is cut to 30 %.
pub const LOW_CONFIDENCE: f64 = 0.4;
/// Confidence from which the throttle is not reduced.
pub const HIGH_CONFIDENCE: f64 = 0.7;

/// PWM values to send for one frame. `None` means "do not write".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actuation {
    pub gas: Option<i32>,
    pub dir: Option<i32>,
}

/// Compute the actuator values for one frame.
///
/// - not `started`: `(neutral, straight)` whatever the mode.
/// - [`DriveMode::Auto`]: steering and throttle.
/// - [`DriveMode::DirAuto`]: steering only; the throttle belongs to the
///   operator.
/// - [`DriveMode::Training`] / [`DriveMode::Resting`]: nothing.
///
/// An empty prediction is handled as [`PredictionVector::neutral`].
pub fn compute(
    prediction: &PredictionVector,
    mode: DriveMode,
    speed_mode: SpeedMode,
    calibration: &Calibration,
    started: bool,
    max_speed_rate: f64,
) -> Actuation {
    if !started {
        return Actuation {
            gas: Some(calibration.neutral),
            dir: Some(calibration.straight),
        };
    }

    let neutral;
    let prediction = if prediction.is_empty() {
        neutral = PredictionVector::neutral();
        &neutral
    } else {
        prediction
    };

    match mode {
        DriveMode::Auto => Actuation {
            gas: Some(throttle(prediction, speed_mode, calibration, max_speed_rate)),
            dir: Some(steering(prediction, calibration)),
        },
        DriveMode::DirAuto => Actuation {
            gas: None,
            dir: Some(steering(prediction, calibration)),
        },
        DriveMode::Training | DriveMode::Resting => Actuation::default(),
    }
}

/// Normalised direction of the winning class, in `[-1, 1]`.
pub fn local_direction(prediction: &PredictionVector) -> f64 {
    if prediction.len() < 2 {
        return 0.0;
    }
    let index_class = prediction.argmax() as f64;
    -1.0 + 2.0 * index_class / (prediction.len() - 1) as f64
}

/// Steering PWM value for `prediction`.
pub fn steering(prediction: &PredictionVector, calibration: &Calibration) -> i32 {
    scale_direction(local_direction(prediction), calibration)
}

/// Throttle multiplier for `prediction` under `speed_mode`.
pub fn speed_coefficient(prediction: &PredictionVector, speed_mode: SpeedMode) -> f64 {
    match speed_mode {
        SpeedMode::Constant => 1.0,
        SpeedMode::Confidence => {
            let confidence = prediction.confidence();
            if confidence < LOW_CONFIDENCE {
                0.3
            } else if confidence >= HIGH_CONFIDENCE {
                1.0
            } else {
                0.7
            }
        }
        SpeedMode::Auto => AUTO_SPEED_COEFFICIENTS
            .get(prediction.argmax())
            .copied()
            .unwrap_or(1.0),
    }
}

/// Throttle PWM value for `prediction`.
pub fn throttle(
    prediction: &PredictionVector,
    speed_mode: SpeedMode,
    calibration: &Calibration,
    max_speed_rate: f64,
) -> i32 {
    let local_gas = max_speed_rate * speed_coefficient(prediction, speed_mode);
    scale_gas(local_gas, calibration)
}

/// Map an operator steering input to `(curr_dir, pwm value)`.
///
/// `curr_dir` already carries the `invert_dir` sign; a zero input maps to
/// exactly `straight`.
pub fn manual_direction(intensity: f64, calibration: &Calibration) -> (f64, i32) {
    let curr_dir = calibration.invert_dir * intensity;
    let value = if curr_dir == 0.0 {
        calibration.straight
    } else {
        scale_direction(curr_dir, calibration)
    };
    (curr_dir, value)
}

/// Map an operator throttle input to `(curr_gas, pwm value)`.
///
/// Negative input brakes (`stop`), zero is exactly `neutral`.
pub fn manual_gas(intensity: f64, max_speed_rate: f64, calibration: &Calibration) -> (f64, i32) {
    let curr_gas = intensity * max_speed_rate;
    let value = if curr_gas < 0.0 {
        calibration.stop
    } else if curr_gas == 0.0 {
        calibration.neutral
    } else {
        scale_gas(curr_gas, calibration)
    };
    (curr_gas, value)
}

fn scale_direction(direction: f64, calibration: &Calibration) -> i32 {
    (direction * f64::from(calibration.right - calibration.left) / 2.0
        + f64::from(calibration.straight)) as i32
}

fn scale_gas(gas: f64, calibration: &Calibration) -> i32 {
    (gas * f64::from(calibration.drive_max - calibration.drive) + f64::from(calibration.drive))
        as i32
}
