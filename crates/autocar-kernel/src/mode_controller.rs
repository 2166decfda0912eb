//! Mode state machine: switching between resting, training and the two
//! autonomous modes, plus the speed-mode and streaming toggles.
//!
//! Every switch stops the car first and stops it again after the new
//! handler is bound, all under the car lock.

use autocar_types::{DriveMode, EventPayload, MessageLevel, SpeedMode};
use tracing::{info, instrument, warn};

use crate::car::{Car, CarHandle, FrameHandler};

const SOURCE: &str = "autocar-kernel::mode";

impl Car {
    /// Switch to `new_mode`.
    ///
    /// Always leaves `started == false` with neutral/straight as the last
    /// actuator writes. Switching to [`DriveMode::DirAuto`] or
    /// [`DriveMode::Auto`] without a loaded model records the mode, warns the
    /// operator, and keeps the previously bound handler.
    #[instrument(name = "switch_mode", skip_all, fields(from = %self.state.mode, to = %new_mode))]
    pub fn switch_mode(&mut self, new_mode: DriveMode) {
        self.state.started = false;
        self.notify(SOURCE, EventPayload::StarterSwitch { activated: false });

        self.stop();

        self.state.mode = new_mode;
        match new_mode {
            DriveMode::DirAuto | DriveMode::Auto => {
                if self.state.model_loaded {
                    self.handler = FrameHandler::for_mode(new_mode);
                } else {
                    warn!(mode = %new_mode, handler = ?self.handler, "model not loaded; handler unchanged");
                    self.notify(
                        SOURCE,
                        EventPayload::UserMessage {
                            level: MessageLevel::Warning,
                            text: "Model not loaded".to_string(),
                        },
                    );
                }
            }
            DriveMode::Training => self.handler = FrameHandler::Record,
            DriveMode::Resting => self.handler = FrameHandler::Idle,
        }

        // A frame may have been handled with the old handler since the first
        // stop; make sure neutral is the last thing the actuators saw.
        self.stop();

        info!(mode = %new_mode, handler = ?self.handler, "switched mode");
        self.notify(SOURCE, EventPayload::ModeSwitched { mode: new_mode });
    }

    /// Change how the throttle is scaled in [`DriveMode::Auto`].
    pub fn switch_speed_mode(&mut self, speed_mode: SpeedMode) {
        self.state.speed_mode = speed_mode;
        info!(%speed_mode, "speed mode changed");
        self.notify(SOURCE, EventPayload::SpeedModeChanged { speed_mode });
        self.notify(
            SOURCE,
            EventPayload::UserMessage {
                level: MessageLevel::Success,
                text: format!("Speed mode set to {speed_mode}"),
            },
        );
    }

    /// Toggle the picture stream. Returns the new state.
    pub fn switch_streaming(&mut self) -> bool {
        self.state.streaming_state = !self.state.streaming_state;
        let enabled = self.state.streaming_state;
        info!(enabled, "streaming state changed");
        self.notify(SOURCE, EventPayload::StreamingChanged { enabled });
        enabled
    }
}

impl CarHandle {
    /// See [`Car::switch_mode`].
    pub fn switch_mode(&self, new_mode: DriveMode) {
        self.lock().switch_mode(new_mode);
    }

    /// See [`Car::switch_speed_mode`].
    pub fn switch_speed_mode(&self, speed_mode: SpeedMode) {
        self.lock().switch_speed_mode(speed_mode);
    }

    /// See [`Car::switch_streaming`].
    pub fn switch_streaming(&self) -> bool {
        self.lock().switch_streaming()
    }
}
