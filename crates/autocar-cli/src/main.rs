//! `autocar-cli` – the `autocar` binary.
//!
//! 1. Initialises logging (and OTLP export when configured).
//! 2. Loads `config.toml`; a missing or incomplete config is fatal.
//! 3. Resolves the hardware: camera, PWM board (degraded when absent) and
//!    the model loader (HTTP when `inference_url` is set).
//! 4. Starts the capture thread.
//! 5. Drops the operator into the console.
//! 6. On **Ctrl-C** or `/quit`, switches the car to Resting and stops the
//!    capture thread.

mod config;
mod repl;

use autocar_hal::sim::SimCamera;
use autocar_hal::{ActuatorOutput, HttpModelLoader, ModelLoader, PwmDriver, UnavailableModelLoader};
use autocar_kernel::{Car, CarHandle};
use autocar_middleware::{NotificationBus, Topic};
use autocar_runtime::{CaptureLoop, JpegDataset};
use autocar_types::DriveMode;
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG (default: autocar crates at info), AUTOCAR_LOG_FORMAT=json, and
    // OTEL_EXPORTER_OTLP_ENDPOINT are honoured. The console's own output
    // still uses println! for UX consistency.
    let _tracing = autocar_runtime::init_tracing("autocar");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let path = config::config_path();
    let cfg = match config::load_from(&path) {
        Ok(mut cfg) => {
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot load config");
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Config loaded from {}", path.display().to_string().bold());

    let session = match cfg.prepare_folders(&chrono::Local::now()) {
        Ok(session) => session,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Training frames go to {}", session.display().to_string().bold());

    // ── Car ───────────────────────────────────────────────────────────────
    let bus = NotificationBus::default();
    let messages = bus.subscribe_to(Topic::UserMessages);
    let calibration = Arc::new(cfg.commands.clone());
    let output = ActuatorOutput::new(resolve_pwm(), &calibration);
    if output.is_degraded() {
        println!(
            "  {}",
            "No PWM board detected: the car will not be able to move.".yellow()
        );
    }
    let car = CarHandle::new(Car::new(calibration, output, bus.clone()));
    let loader = resolve_model_loader(&cfg);

    if let Some(model) = cfg.default_model.as_deref()
        && let Err(e) = car.select_model(model, loader.as_ref())
    {
        warn!(model, error = %e, "default model not loaded");
    }

    // ── Capture thread ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let capture = CaptureLoop::new(
        Box::new(SimCamera::new("sim0").with_fps(cfg.fps)),
        car.clone(),
        Box::new(JpegDataset::new(session)),
        bus.clone(),
    )
    .with_shutdown(Arc::clone(&shutdown));
    let capture_thread = match capture.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            println!("{}: {}", "Failed to start the capture thread".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_car = car.clone();
    let ctrlc_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the car …".yellow().bold());
        ctrlc_car.switch_mode(DriveMode::Resting);
        println!("{}", "  ✓ Car resting. Press Enter to exit.".green());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to stop the car");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive console ───────────────────────────────────────────────
    repl::Console::new(car.clone(), loader, cfg, messages).run(Arc::clone(&shutdown));

    // ── Shutdown ──────────────────────────────────────────────────────────
    car.switch_mode(DriveMode::Resting);
    shutdown.store(true, Ordering::SeqCst);
    match capture_thread.join() {
        Ok(Ok(frames)) => {
            info!(frames, "capture thread stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            println!("{}: {}", "Camera error".red(), e);
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("capture thread panicked");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware resolution
// ─────────────────────────────────────────────────────────────────────────────

/// The PWM board of this machine, if any. No board driver is built into
/// this binary, so the car always starts in degraded mode and
/// [`ActuatorOutput`] only logs its writes.
fn resolve_pwm() -> Option<Box<dyn PwmDriver>> {
    None
}

fn resolve_model_loader(cfg: &Config) -> Arc<dyn ModelLoader> {
    let Some(url) = cfg.inference_url.as_deref() else {
        info!("no inference_url configured; models cannot be loaded");
        return Arc::new(UnavailableModelLoader);
    };
    match HttpModelLoader::new(url, Duration::from_millis(cfg.inference_timeout_ms)) {
        Ok(loader) => {
            info!(url, "using remote model server");
            Arc::new(loader)
        }
        Err(e) => {
            warn!(url, error = %e, "cannot build model server client");
            Arc::new(UnavailableModelLoader)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___       __                    "#.bold().cyan());
    println!("{}", r#"  / _ |__ __/ /____  _______ _____ "#.bold().cyan());
    println!("{}", r#" / __ / // / __/ _ \/ __/ _ `/ __/ "#.bold().cyan());
    println!("{}", r#"/_/ |_\_,_/\__/\___/\__/\_,_/_/    "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "autocar".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Self-driving RC car controller");
    println!();
}
