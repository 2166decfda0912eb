//! REPL – the operator console.
//!
//! Supported slash-commands:
//!   /help              – show this list
//!   /status            – mode, starter, speed settings, model
//!   /mode <name>       – resting | training | dirauto | auto
//!   /start             – toggle the starter
//!   /dir <intensity>   – manual steering, -1.0 (left) to 1.0 (right)
//!   /gas <intensity>   – manual throttle, negative brakes
//!   /speed <rate>      – throttle gain
//!   /speed-mode <name> – constant | confidence | auto
//!   /stream            – toggle the picture stream
//!   /models            – list the models in `models_path`
//!   /model <name>      – load a model
//!   /quit | /exit      – stop the car and exit
//!
//! Messages published for the operator are printed before each prompt.

use autocar_hal::ModelLoader;
use autocar_kernel::CarHandle;
use autocar_middleware::TopicReceiver;
use autocar_types::{CarError, DriveMode, Event, EventPayload, MessageLevel, SpeedMode};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Mode(DriveMode),
    Start,
    Dir(f64),
    Gas(f64),
    Speed(f64),
    SpeedMode(SpeedMode),
    Stream,
    Models,
    Model(String),
    Quit,
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Command, CarError> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();

        let command = match name {
            "/help" => Command::Help,
            "/status" => Command::Status,
            "/mode" => Command::Mode(DriveMode::parse_lenient(required(name, arg)?)),
            "/start" => Command::Start,
            "/dir" => Command::Dir(number(name, arg)?),
            "/gas" => Command::Gas(number(name, arg)?),
            "/speed" => Command::Speed(number(name, arg)?),
            "/speed-mode" => Command::SpeedMode(required(name, arg)?.parse()?),
            "/stream" => Command::Stream,
            "/models" => Command::Models,
            "/model" => Command::Model(required(name, arg)?.to_string()),
            "/quit" | "/exit" => Command::Quit,
            other => {
                return Err(CarError::InvalidCommand(format!(
                    "unknown command '{other}'"
                )));
            }
        };
        Ok(command)
    }
}

fn required<'a>(name: &str, arg: Option<&'a str>) -> Result<&'a str, CarError> {
    arg.ok_or_else(|| CarError::InvalidCommand(format!("{name} needs an argument")))
}

fn number(name: &str, arg: Option<&str>) -> Result<f64, CarError> {
    let raw = required(name, arg)?;
    raw.parse::<f64>()
        .map_err(|_| CarError::InvalidCommand(format!("{name}: '{raw}' is not a number")))
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Operator console bound to a running car.
pub struct Console {
    car: CarHandle,
    loader: Arc<dyn ModelLoader>,
    config: Config,
    messages: TopicReceiver,
}

impl Console {
    pub fn new(
        car: CarHandle,
        loader: Arc<dyn ModelLoader>,
        config: Config,
        messages: TopicReceiver,
    ) -> Self {
        Self {
            car,
            loader,
            config,
            messages,
        }
    }

    /// Read commands from stdin until `/quit`, EOF, or `shutdown` is raised.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            self.print_messages();
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            print!("{} ", "autocar>".bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break, // EOF
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let result = Command::parse(line).and_then(|cmd| self.execute(cmd));
            match result {
                Ok(Flow::Quit) => {
                    println!("{}", "Goodbye.".green());
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(Flow::Continue) => {}
                Err(e) => println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    e.to_string().yellow(),
                    "/help".bold()
                ),
            }
        }
        self.print_messages();
    }

    /// Run one command against the car.
    pub fn execute(&mut self, command: Command) -> Result<Flow, CarError> {
        match command {
            Command::Help => print_help(),
            Command::Status => self.print_status(),
            Command::Mode(mode) => self.car.switch_mode(mode),
            Command::Start => {
                let started = self.car.on_start_toggle();
                let label = if started { "started".green() } else { "stopped".yellow() };
                println!("  Car {label}");
            }
            Command::Dir(intensity) => report_write("dir", self.car.on_dir(intensity)?),
            Command::Gas(intensity) => report_write("gas", self.car.on_gas(intensity)?),
            Command::Speed(rate) => {
                let rate = self.car.set_max_speed(rate)?;
                println!("  Max speed rate set to {}", rate.to_string().bold());
            }
            Command::SpeedMode(speed_mode) => self.car.switch_speed_mode(speed_mode),
            Command::Stream => {
                let enabled = self.car.switch_streaming();
                println!("  Streaming {}", if enabled { "on" } else { "off" });
            }
            Command::Models => self.print_models()?,
            Command::Model(name) => {
                // The failure was already published to the operator.
                let _ = self.car.select_model(&name, self.loader.as_ref());
            }
            Command::Quit => {
                self.car.switch_mode(DriveMode::Resting);
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn print_status(&self) {
        let state = self.car.snapshot();
        let model = self.car.current_model().unwrap_or_else(|| "none".to_string());
        println!("{}", "Car Status".bold().underline());
        println!("  Mode       : {}", state.mode.to_string().bold());
        println!(
            "  Starter    : {}",
            if state.started { "started".green() } else { "stopped".yellow() }
        );
        println!("  Speed mode : {}", state.speed_mode);
        println!("  Max speed  : {}", state.max_speed_rate);
        println!("  Model      : {model}");
        println!("  Streaming  : {}", if state.streaming_state { "on" } else { "off" });
        println!("  Frames     : {}", state.frame_index);
    }

    fn print_models(&self) -> Result<(), CarError> {
        let models = self.config.available_models()?;
        let current = self.car.current_model();
        println!("{}", "Models".bold().underline());
        if models.is_empty() {
            println!("  (none in {})", self.config.models_path.display());
        }
        for m in &models {
            let marker = if current.as_deref() == Some(m.as_str()) { "▶" } else { " " };
            println!("    {} {}", marker.green(), m.bold());
        }
        Ok(())
    }

    fn print_messages(&mut self) {
        for event in self.messages.drain() {
            if let Some(line) = format_message(&event) {
                println!("{line}");
            }
        }
    }
}

fn report_write(channel: &str, written: Option<i32>) {
    match written {
        Some(value) => println!("  {channel} -> {}", value.to_string().bold()),
        None => println!("  {}", format!("{channel} ignored in the current mode").dimmed()),
    }
}

/// Render an operator message, or `None` for events that are not messages.
pub fn format_message(event: &Event) -> Option<String> {
    let (level, text) = match &event.payload {
        EventPayload::UserMessage { level, text } | EventPayload::ModelLoaded { level, text } => {
            (level, text)
        }
        _ => return None,
    };
    let text = match level {
        MessageLevel::Info => text.normal(),
        MessageLevel::Success => text.green(),
        MessageLevel::Warning => text.yellow(),
        MessageLevel::Danger => text.red().bold(),
    };
    Some(format!("  {text}"))
}

fn print_help() {
    println!();
    println!("{}", "autocar Commands".bold().underline());
    println!("  {}             – car status", "/status".bold().cyan());
    println!("  {}        – resting | training | dirauto | auto", "/mode <name>".bold().cyan());
    println!("  {}              – toggle the starter", "/start".bold().cyan());
    println!("  {}    – manual steering (-1.0 .. 1.0)", "/dir <intensity>".bold().cyan());
    println!("  {}    – manual throttle (negative brakes)", "/gas <intensity>".bold().cyan());
    println!("  {}       – throttle gain", "/speed <rate>".bold().cyan());
    println!("  {}  – constant | confidence | auto", "/speed-mode <name>".bold().cyan());
    println!("  {}             – toggle the picture stream", "/stream".bold().cyan());
    println!("  {}             – list available models", "/models".bold().cyan());
    println!("  {}       – load a model", "/model <name>".bold().cyan());
    println!("  {}       – stop the car and exit", "/quit  /exit".bold().cyan());
    println!();
}
