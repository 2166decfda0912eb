//! Shared vocabulary for the autocar workspace: operating modes, calibration
//! constants, prediction vectors, camera frames, bus events, and the global
//! error type.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Scores returned when no prediction is available: full confidence in the
/// centre ("straight") bucket.
pub const NEUTRAL_SCORES: [f64; 5] = [0.0, 0.0, 1.0, 0.0, 0.0];

/// Number of pixel rows removed from the top of a frame before it is saved
/// as a training sample or handed to a model.
pub const CROP_TOP_ROWS: u32 = 80;

/// Operating state of the vehicle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Nothing is commanded; frames are acquired and dropped.
    #[default]
    Resting,
    /// The operator drives; every frame is saved with the current labels.
    Training,
    /// The model steers, the operator controls the throttle.
    DirAuto,
    /// The model steers and the throttle follows the speed mode.
    Auto,
}

impl DriveMode {
    /// Parse a mode name. Unknown names fall back to [`DriveMode::Resting`].
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "training" => DriveMode::Training,
            "dirauto" => DriveMode::DirAuto,
            "auto" => DriveMode::Auto,
            _ => DriveMode::Resting,
        }
    }

    /// `true` for the modes that need a loaded model to act.
    pub fn requires_model(self) -> bool {
        matches!(self, DriveMode::DirAuto | DriveMode::Auto)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DriveMode::Resting => "resting",
            DriveMode::Training => "training",
            DriveMode::DirAuto => "dirauto",
            DriveMode::Auto => "auto",
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the throttle magnitude is scaled in [`DriveMode::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMode {
    /// Always drive at `max_speed_rate`.
    #[default]
    Constant,
    /// Scale by the confidence of the winning class.
    Confidence,
    /// Scale by the predicted steering angle (slow down in turns).
    Auto,
}

impl SpeedMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeedMode::Constant => "constant",
            SpeedMode::Confidence => "confidence",
            SpeedMode::Auto => "auto",
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedMode {
    type Err = CarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(SpeedMode::Constant),
            "confidence" => Ok(SpeedMode::Confidence),
            "auto" => Ok(SpeedMode::Auto),
            other => Err(CarError::InvalidCommand(format!(
                "unknown speed mode '{other}' (expected constant, confidence or auto)"
            ))),
        }
    }
}

/// Linear-mapping constants translating normalised direction and throttle
/// into PWM units, plus the channels they are written to.
///
/// Loaded once at startup and shared read-only for the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// PWM channel of the steering servo.
    pub dir_pin: u8,
    /// PWM channel of the throttle ESC.
    pub gas_pin: u8,
    pub left: i32,
    pub straight: i32,
    pub right: i32,
    /// Throttle value used for braking / reverse.
    pub stop: i32,
    /// Throttle value that keeps the car still.
    pub neutral: i32,
    /// Lowest forward throttle value.
    pub drive: i32,
    /// Highest forward throttle value.
    pub drive_max: i32,
    /// `1` or `-1` depending on how the servo is mounted.
    pub invert_dir: f64,
}

/// Ordered class scores produced by the inference engine, one per steering
/// bucket from hard-left (index 0) to hard-right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionVector(Vec<f64>);

impl PredictionVector {
    pub fn new(scores: Vec<f64>) -> Self {
        Self(scores)
    }

    /// The fixed "go straight" vector used whenever inference is skipped or
    /// fails.
    pub fn neutral() -> Self {
        Self(NEUTRAL_SCORES.to_vec())
    }

    pub fn scores(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the highest score. Ties resolve to the lowest index; an empty
    /// vector yields `0`.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, score) in self.0.iter().enumerate() {
            if *score > self.0[best] {
                best = i;
            }
        }
        best
    }

    /// Score of the winning class.
    pub fn confidence(&self) -> f64 {
        self.0.get(self.argmax()).copied().unwrap_or(0.0)
    }
}

impl From<Vec<f64>> for PredictionVector {
    fn from(scores: Vec<f64>) -> Self {
        Self(scores)
    }
}

/// A raw RGB24 image frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row-major RGB24 pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Bytes per pixel.
    pub const CHANNELS: usize = 3;

    /// An all-black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * Self::CHANNELS],
        }
    }

    /// Copy of the frame without its top `rows` pixel rows.
    pub fn crop_top(&self, rows: u32) -> CameraFrame {
        let rows = rows.min(self.height);
        let start = (rows as usize * self.width as usize * Self::CHANNELS).min(self.data.len());
        CameraFrame {
            width: self.width,
            height: self.height - rows,
            data: self.data[start..].to_vec(),
        }
    }
}

/// Label attached to a frame captured in [`DriveMode::Training`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLabel {
    /// Monotonically increasing frame index for the session.
    pub index: u64,
    /// Last commanded normalised throttle.
    pub gas: f64,
    /// Last commanded normalised direction.
    pub dir: f64,
}

impl TrainingLabel {
    /// File stem encoding the label, e.g. `frame_12_gas_0.5_dir_-1.0`.
    ///
    /// Values always carry a fractional digit so stems match existing
    /// datasets (`gas_0.0`, not `gas_0`).
    pub fn file_stem(&self) -> String {
        format!(
            "frame_{}_gas_{}_dir_{}",
            self.index,
            label_value(self.gas),
            label_value(self.dir)
        )
    }
}

fn label_value(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// Severity of a message shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// Unified event wrapper for the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "autocar-kernel::mode"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Free-form message for the operator.
    UserMessage { level: MessageLevel, text: String },
    /// Outcome of a model selection request.
    ModelLoaded { level: MessageLevel, text: String },
    /// The started flag changed.
    StarterSwitch { activated: bool },
    ModeSwitched { mode: DriveMode },
    SpeedModeChanged { speed_mode: SpeedMode },
    MaxSpeedChanged { rate: f64 },
    StreamingChanged { enabled: bool },
    /// A captured frame with the prediction used for it.
    PictureStream {
        frame: Arc<CameraFrame>,
        /// Position of the frame in the capture session.
        seq: usize,
        /// Predicted class (argmax of `pred`).
        index: usize,
        pred: Vec<f64>,
    },
}

/// Global error type spanning configuration, hardware, and inference failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CarError {
    #[error("{field} is not present in the config file")]
    Config { field: String },

    #[error("Config error: {0}")]
    ConfigIo(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Prediction error: {0}")]
    Inference(String),

    #[error("Error while loading model {model}. Got error {details}")]
    ModelLoad { model: String, details: String },

    #[error("Actuator fault on channel {channel}: {details}")]
    Actuator { channel: u8, details: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_mode_parse_falls_back_to_resting() {
        assert_eq!(DriveMode::parse_lenient("training"), DriveMode::Training);
        assert_eq!(DriveMode::parse_lenient("DirAuto"), DriveMode::DirAuto);
        assert_eq!(DriveMode::parse_lenient(" auto "), DriveMode::Auto);
        assert_eq!(DriveMode::parse_lenient("warp-speed"), DriveMode::Resting);
        assert_eq!(DriveMode::parse_lenient(""), DriveMode::Resting);
    }

    #[test]
    fn drive_mode_requires_model_only_for_autonomous_modes() {
        assert!(DriveMode::Auto.requires_model());
        assert!(DriveMode::DirAuto.requires_model());
        assert!(!DriveMode::Training.requires_model());
        assert!(!DriveMode::Resting.requires_model());
    }

    #[test]
    fn speed_mode_from_str_rejects_unknown() {
        assert_eq!("confidence".parse::<SpeedMode>(), Ok(SpeedMode::Confidence));
        assert_eq!("AUTO".parse::<SpeedMode>(), Ok(SpeedMode::Auto));
        assert!(matches!(
            "turbo".parse::<SpeedMode>(),
            Err(CarError::InvalidCommand(_))
        ));
    }

    #[test]
    fn argmax_breaks_ties_on_lowest_index() {
        let p = PredictionVector::new(vec![0.1, 0.4, 0.4, 0.1, 0.0]);
        assert_eq!(p.argmax(), 1);
        assert!((p.confidence() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn neutral_prediction_points_straight() {
        let p = PredictionVector::neutral();
        assert_eq!(p.len(), 5);
        assert_eq!(p.argmax(), 2);
    }

    #[test]
    fn empty_prediction_argmax_is_zero() {
        let p = PredictionVector::new(vec![]);
        assert_eq!(p.argmax(), 0);
        assert_eq!(p.confidence(), 0.0);
    }

    #[test]
    fn crop_top_drops_rows() {
        let mut frame = CameraFrame::blank(2, 3);
        // Mark the last row.
        let last_row = 2 * 2 * CameraFrame::CHANNELS;
        for b in &mut frame.data[last_row..] {
            *b = 7;
        }
        let cropped = frame.crop_top(2);
        assert_eq!(cropped.height, 1);
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.data, vec![7; 2 * CameraFrame::CHANNELS]);
    }

    #[test]
    fn crop_top_clamps_to_frame_height() {
        let frame = CameraFrame::blank(4, 4);
        let cropped = frame.crop_top(CROP_TOP_ROWS);
        assert_eq!(cropped.height, 0);
        assert!(cropped.data.is_empty());
    }

    #[test]
    fn training_label_file_stem() {
        let label = TrainingLabel {
            index: 12,
            gas: 0.5,
            dir: -1.0,
        };
        assert_eq!(label.file_stem(), "frame_12_gas_0.5_dir_-1.0");
    }

    #[test]
    fn training_label_values_keep_a_fractional_digit() {
        let label = TrainingLabel {
            index: 0,
            gas: 0.0,
            dir: 0.25,
        };
        assert_eq!(label.file_stem(), "frame_0_gas_0.0_dir_0.25");
        let label = TrainingLabel {
            index: 1,
            gas: 1.0,
            dir: -0.0,
        };
        assert_eq!(label.file_stem(), "frame_1_gas_1.0_dir_-0.0");
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "autocar-kernel::mode",
            EventPayload::ModeSwitched {
                mode: DriveMode::DirAuto,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("dirauto"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn car_error_display() {
        let err = CarError::Config {
            field: "[commands][gas_pin]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[commands][gas_pin] is not present in the config file"
        );

        let err = CarError::ModelLoad {
            model: "steer.onnx".to_string(),
            details: "file not found".to_string(),
        };
        assert!(err.to_string().contains("steer.onnx"));
    }
}
