//! Model selection.
//!
//! Loading can take seconds, so the loader runs without the car lock: the
//! capture loop keeps running on the previous model (or the neutral
//! prediction) until the new engine is installed.

use std::sync::Arc;

use autocar_hal::{InferenceEngine, ModelLoader};
use autocar_types::{CarError, EventPayload, MessageLevel};
use tracing::{error, info, instrument};

use crate::car::{Car, CarHandle, LoadedModel};

const SOURCE: &str = "autocar-kernel::model";

impl Car {
    /// Install `engine` as the model named `name` and rebind the handler of
    /// the current mode.
    pub(crate) fn install_model(&mut self, name: &str, engine: Arc<dyn InferenceEngine>) {
        self.model = Some(LoadedModel {
            name: name.to_string(),
            engine,
        });
        self.state.model_loaded = true;
        // A pending DirAuto/Auto switch was waiting for a model.
        let mode = self.state.mode;
        self.switch_mode(mode);
    }
}

impl CarHandle {
    /// Load the model `name` through `loader` and make it the active model.
    ///
    /// Selecting the model that is already loaded is a no-op. On failure the
    /// previous model (if any) stays active.
    #[instrument(name = "select_model", skip_all, fields(model = name))]
    pub fn select_model(&self, name: &str, loader: &dyn ModelLoader) -> Result<(), CarError> {
        let already_loaded = {
            let car = self.lock();
            car.notify(
                SOURCE,
                EventPayload::UserMessage {
                    level: MessageLevel::Info,
                    text: format!("Loading model {name}..."),
                },
            );
            car.current_model() == Some(name)
        };
        if already_loaded {
            info!(model = name, "model already loaded");
            self.lock().notify(
                SOURCE,
                EventPayload::ModelLoaded {
                    level: MessageLevel::Info,
                    text: format!("Model {name} already loaded."),
                },
            );
            return Ok(());
        }

        let engine = match loader.load(name) {
            Ok(engine) => engine,
            Err(e) => {
                let details = match e {
                    CarError::ModelLoad { details, .. } => details,
                    other => other.to_string(),
                };
                let err = CarError::ModelLoad {
                    model: name.to_string(),
                    details,
                };
                error!(model = name, error = %err, "model load failed");
                self.lock().notify(
                    SOURCE,
                    EventPayload::UserMessage {
                        level: MessageLevel::Danger,
                        text: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        let mut car = self.lock();
        car.install_model(name, engine);
        info!(model = name, mode = %car.state.mode, "model loaded");
        car.notify(
            SOURCE,
            EventPayload::ModelLoaded {
                level: MessageLevel::Success,
                text: format!("The model {name} has been successfully loaded"),
            },
        );
        Ok(())
    }
}
