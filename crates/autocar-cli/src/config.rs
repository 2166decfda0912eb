//! Car configuration – reads `config.toml` (or `$AUTOCAR_CONFIG`).
//!
//! Every field the car cannot run without is checked on the raw TOML table
//! first, so a missing key is reported by name (`fps`, `[commands][gas_pin]`)
//! instead of as a generic deserialisation error.

use autocar_types::{Calibration, CarError};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable selecting the config file.
pub const CONFIG_ENV: &str = "AUTOCAR_CONFIG";
/// Config file used when [`CONFIG_ENV`] is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level keys that must be present.
const REQUIRED_FIELDS: [&str; 5] = ["commands", "fps", "datasets_path", "stream_path", "models_path"];

/// Keys of the `[commands]` table that must be present.
const REQUIRED_COMMANDS: [&str; 10] = [
    "dir_pin",
    "gas_pin",
    "left",
    "straight",
    "right",
    "stop",
    "neutral",
    "drive",
    "drive_max",
    "invert_dir",
];

/// Format of the per-session dataset folder name.
const SESSION_FOLDER_FORMAT: &str = "%Y_%m_%d_%H_%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Camera frame rate. Advisory: the loop runs as fast as frames arrive.
    pub fps: u32,
    /// Parent folder of the per-session training datasets.
    pub datasets_path: PathBuf,
    /// Folder for streamed frames.
    pub stream_path: PathBuf,
    /// Folder listing the models available for selection.
    pub models_path: PathBuf,
    /// Actuator channels and PWM calibration.
    pub commands: Calibration,

    /// Base URL of the model server. Without it no model can be loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_url: Option<String>,

    /// Per-request timeout for the model server.
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    /// Model selected at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

fn default_inference_timeout_ms() -> u64 {
    200
}

/// Path of the config file: `$AUTOCAR_CONFIG` or `./config.toml`.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and validate the config at `path`.
///
/// # Errors
///
/// [`CarError::ConfigIo`] when the file is missing, unreadable or malformed;
/// [`CarError::Config`] naming the first missing field.
pub fn load_from(path: &Path) -> Result<Config, CarError> {
    if !path.is_file() {
        return Err(CarError::ConfigIo(format!(
            "The config file `{}` does not exist",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| CarError::ConfigIo(format!("Failed to read {}: {e}", path.display())))?;
    parse(&raw)
}

/// Validate and deserialise a config from TOML text.
pub fn parse(raw: &str) -> Result<Config, CarError> {
    let table: toml::Table = raw
        .parse()
        .map_err(|e| CarError::ConfigIo(format!("Failed to parse config: {e}")))?;
    check_required(&table)?;
    toml::Value::Table(table)
        .try_into()
        .map_err(|e| CarError::ConfigIo(format!("Invalid config: {e}")))
}

fn check_required(table: &toml::Table) -> Result<(), CarError> {
    for field in REQUIRED_FIELDS {
        if !table.contains_key(field) {
            return Err(CarError::Config {
                field: field.to_string(),
            });
        }
    }
    let commands = table
        .get("commands")
        .and_then(toml::Value::as_table)
        .ok_or_else(|| CarError::ConfigIo("`commands` must be a table".to_string()))?;
    for field in REQUIRED_COMMANDS {
        if !commands.contains_key(field) {
            return Err(CarError::Config {
                field: format!("[commands][{field}]"),
            });
        }
    }
    Ok(())
}

/// Apply `AUTOCAR_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `AUTOCAR_FPS` | `fps` |
/// | `AUTOCAR_INFERENCE_URL` | `inference_url` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("AUTOCAR_FPS")
        && let Ok(fps) = v.parse::<u32>()
    {
        cfg.fps = fps;
    }
    if let Ok(v) = std::env::var("AUTOCAR_INFERENCE_URL") {
        cfg.inference_url = Some(v);
    }
}

impl Config {
    /// Dataset folder for a session started at `at`, e.g.
    /// `datasets/2024_05_01_14_30`.
    pub fn session_folder<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.datasets_path
            .join(at.format(SESSION_FOLDER_FORMAT).to_string())
    }

    /// Create the session dataset folder and the stream folder. Returns the
    /// session folder.
    pub fn prepare_folders<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Result<PathBuf, CarError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let session = self.session_folder(at);
        for dir in [&session, &self.stream_path] {
            fs::create_dir_all(dir).map_err(|e| {
                CarError::ConfigIo(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(session)
    }

    /// Names of the files in `models_path`, sorted.
    pub fn available_models(&self) -> Result<Vec<String>, CarError> {
        let entries = fs::read_dir(&self.models_path).map_err(|e| {
            CarError::ConfigIo(format!("Failed to list {}: {e}", self.models_path.display()))
        })?;
        let mut models: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        models.sort();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SAMPLE: &str = r#"
fps = 60
datasets_path = "datasets"
stream_path = "stream"
models_path = "models"

[commands]
dir_pin = 1
gas_pin = 2
left = 310
straight = 410
right = 510
stop = 210
neutral = 385
drive = 400
drive_max = 460
invert_dir = -1
"#;

    fn sample_without(key: &str) -> String {
        SAMPLE
            .lines()
            .filter(|l| l.split('=').next().map(str::trim) != Some(key))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn parses_full_config_with_defaults() {
        let cfg = parse(SAMPLE).unwrap();
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.commands.gas_pin, 2);
        assert_eq!(cfg.commands.neutral, 385);
        assert_eq!(cfg.commands.invert_dir, -1.0);
        assert_eq!(cfg.inference_url, None);
        assert_eq!(cfg.inference_timeout_ms, 200);
        assert_eq!(cfg.default_model, None);
    }

    #[test]
    fn optional_inference_keys() {
        let raw = format!(
            "inference_url = \"http://127.0.0.1:8501\"\ninference_timeout_ms = 50\ndefault_model = \"steer\"\n{SAMPLE}"
        );
        let cfg = parse(&raw).unwrap();
        assert_eq!(cfg.inference_url.as_deref(), Some("http://127.0.0.1:8501"));
        assert_eq!(cfg.inference_timeout_ms, 50);
        assert_eq!(cfg.default_model.as_deref(), Some("steer"));
    }

    #[test]
    fn missing_top_level_field_is_named() {
        let err = parse(&sample_without("fps")).unwrap_err();
        assert_eq!(err, CarError::Config { field: "fps".to_string() });
        assert_eq!(err.to_string(), "fps is not present in the config file");
    }

    #[test]
    fn missing_command_field_is_named() {
        let err = parse(&sample_without("gas_pin")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[commands][gas_pin] is not present in the config file"
        );
    }

    #[test]
    fn every_missing_field_is_named() {
        let top_level = REQUIRED_FIELDS
            .iter()
            .filter(|f| **f != "commands")
            .map(|f| (f.to_string(), f.to_string()));
        let commands = REQUIRED_COMMANDS
            .iter()
            .map(|f| (f.to_string(), format!("[commands][{f}]")));
        for (key, field) in top_level.chain(commands) {
            assert_eq!(
                parse(&sample_without(&key)).unwrap_err(),
                CarError::Config { field },
                "removing `{key}`"
            );
        }
    }

    #[test]
    fn removing_drive_keeps_drive_max() {
        let raw = sample_without("drive");
        assert!(raw.contains("drive_max = 460"));
        assert_eq!(
            parse(&raw).unwrap_err(),
            CarError::Config { field: "[commands][drive]".to_string() }
        );
    }

    #[test]
    fn missing_commands_table_is_named() {
        let raw = "fps = 60\ndatasets_path = \"d\"\nstream_path = \"s\"\nmodels_path = \"m\"\n";
        assert_eq!(
            parse(raw).unwrap_err(),
            CarError::Config { field: "commands".to_string() }
        );
    }

    #[test]
    fn malformed_toml_is_config_io() {
        assert!(matches!(parse("fps = ="), Err(CarError::ConfigIo(_))));
    }

    #[test]
    fn wrong_type_is_config_io() {
        let raw = SAMPLE.replace("fps = 60", "fps = \"fast\"");
        assert!(matches!(parse(&raw), Err(CarError::ConfigIo(_))));
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, CarError::ConfigIo(ref msg) if msg.contains("does not exist")));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_from(&path).unwrap(), parse(SAMPLE).unwrap());
    }

    #[test]
    fn fps_env_override() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("AUTOCAR_FPS", "15") };
        let mut cfg = parse(SAMPLE).unwrap();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("AUTOCAR_FPS") };
        assert_eq!(cfg.fps, 15);
    }

    #[test]
    fn prepares_timestamped_session_and_stream_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = parse(SAMPLE).unwrap();
        cfg.datasets_path = dir.path().join("datasets");
        cfg.stream_path = dir.path().join("stream");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 59).unwrap();

        let session = cfg.prepare_folders(&at).unwrap();

        assert_eq!(session, dir.path().join("datasets").join("2024_05_01_14_30"));
        assert!(session.is_dir());
        assert!(cfg.stream_path.is_dir());
        // Idempotent within the same minute.
        assert_eq!(cfg.prepare_folders(&at).unwrap(), session);
    }

    #[test]
    fn lists_models_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = parse(SAMPLE).unwrap();
        cfg.models_path = dir.path().to_path_buf();
        std::fs::write(dir.path().join("b_model.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("a_model.onnx"), b"").unwrap();
        std::fs::create_dir(dir.path().join("checkpoints")).unwrap();

        assert_eq!(
            cfg.available_models().unwrap(),
            vec!["a_model.onnx".to_string(), "b_model.onnx".to_string()]
        );
    }
}
