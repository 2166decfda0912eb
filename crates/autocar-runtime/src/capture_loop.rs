//! The capture loop: one dedicated thread turning camera frames into
//! actuator commands.
//!
//! Each iteration:
//!
//! 1. **Capture** – block on [`Camera::capture`]. A camera error ends the
//!    loop and is returned to the caller.
//! 2. **Predict** – under the car lock, look up the engine for this frame
//!    (only when started in an autonomous mode with a model loaded), then run
//!    it *without* the lock. A failed prediction is logged and replaced by
//!    the neutral vector.
//! 3. **Dispatch** – re-lock and run whatever handler is bound *now*, so a
//!    mode switch that happened during inference wins. Training labels are
//!    saved to the [`DatasetSink`] after the lock is released.
//! 4. **Stream** – when streaming is on, publish the frame and its
//!    prediction on [`Topic::PictureStream`][autocar_middleware::Topic].
//!
//! The loop stops when the shutdown flag is raised or after `max_frames`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use autocar_hal::Camera;
use autocar_kernel::{CarHandle, FrameOutcome};
use autocar_middleware::NotificationBus;
use autocar_types::{CameraFrame, CarError, EventPayload, PredictionVector};
use tracing::{Span, debug, error, field, info, info_span, instrument, warn};

use crate::dataset::DatasetSink;

const SOURCE: &str = "autocar-runtime::capture";

/// Drives the camera → inference → handler pipeline.
pub struct CaptureLoop {
    camera: Box<dyn Camera>,
    car: CarHandle,
    dataset: Box<dyn DatasetSink>,
    bus: NotificationBus,
    shutdown: Arc<AtomicBool>,
    max_frames: Option<usize>,
}

impl CaptureLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        car: CarHandle,
        dataset: Box<dyn DatasetSink>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            camera,
            car,
            dataset,
            bus,
            shutdown: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        }
    }

    /// Stop when `flag` becomes `true`. Checked once per frame.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Stop after `frames` frames.
    pub fn with_max_frames(mut self, frames: usize) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// The flag that stops this loop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until shutdown, `max_frames`, or a camera failure.
    ///
    /// Returns the number of frames processed.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Camera`] when the camera stops delivering frames.
    pub fn run(mut self) -> Result<usize, CarError> {
        info!(camera = self.camera.id(), max_frames = ?self.max_frames, "capture loop started");
        let mut index = 0usize;
        while !self.shutdown.load(Ordering::SeqCst) {
            if self.max_frames.is_some_and(|max| index >= max) {
                break;
            }
            if let Err(e) = self.step(index) {
                error!(camera = self.camera.id(), frames = index, error = %e, "capture loop stopped");
                return Err(e);
            }
            index += 1;
        }
        info!(frames = index, "capture loop finished");
        Ok(index)
    }

    /// Run the loop on a named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<usize, CarError>>> {
        thread::Builder::new()
            .name("autocar-capture".to_string())
            .spawn(move || self.run())
    }

    /// Process a single frame.
    #[instrument(name = "frame", skip(self), fields(mode = field::Empty, outcome = field::Empty))]
    pub fn step(&mut self, index: usize) -> Result<FrameOutcome, CarError> {
        let frame = self.camera.capture()?;

        let (engine, mode) = {
            let car = self.car.lock();
            (car.engine_for_frame(), car.state().mode)
        };
        Span::current().record("mode", field::display(mode));
        let prediction = match engine {
            Some(engine) => match info_span!("inference").in_scope(|| engine.predict(&frame)) {
                Ok(prediction) => prediction,
                Err(e) => {
                    warn!(frame = index, error = %e, "prediction failed; using neutral");
                    PredictionVector::neutral()
                }
            },
            None => PredictionVector::neutral(),
        };

        let (outcome, streaming) = {
            let mut car = self.car.lock();
            let outcome = car.handle_frame(&prediction);
            (outcome, car.state().streaming_state)
        };

        if let FrameOutcome::Record(label) = &outcome {
            if let Err(e) = self.dataset.save(&frame, label) {
                warn!(frame = label.index, error = %e, "failed to save training frame");
            }
        }

        if streaming {
            self.stream(frame, index, &prediction);
        }

        Span::current().record("outcome", field::debug(&outcome));
        debug!(frame = index, outcome = ?outcome, "frame handled");
        Ok(outcome)
    }

    fn stream(&self, frame: CameraFrame, seq: usize, prediction: &PredictionVector) {
        let delivered = self.bus.notify(
            SOURCE,
            EventPayload::PictureStream {
                frame: Arc::new(frame),
                seq,
                index: prediction.argmax(),
                pred: prediction.scores().to_vec(),
            },
        );
        if delivered == 0 {
            debug!(frame = seq, "no picture stream subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DiscardDataset, JpegDataset};
    use autocar_hal::ActuatorOutput;
    use autocar_hal::sim::{FixedEngine, PwmLog, SimCamera, SimModelLoader, SimPwm};
    use autocar_kernel::{Actuation, Car};
    use autocar_middleware::Topic;
    use autocar_types::{Calibration, DriveMode};

    const DIR: u8 = 1;
    const GAS: u8 = 2;

    fn calibration() -> Calibration {
        Calibration {
            dir_pin: DIR,
            gas_pin: GAS,
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

    fn rig() -> (CarHandle, PwmLog, NotificationBus) {
        let (pwm, log) = SimPwm::new();
        let cal = Arc::new(calibration());
        let bus = NotificationBus::default();
        let output = ActuatorOutput::new(Some(pwm), &cal);
        let car = CarHandle::new(Car::new(cal, output, bus.clone()));
        (car, log, bus)
    }

    fn capture(car: &CarHandle, bus: &NotificationBus) -> CaptureLoop {
        CaptureLoop::new(
            Box::new(SimCamera::new("sim0")),
            car.clone(),
            Box::new(DiscardDataset),
            bus.clone(),
        )
    }

    fn drive_with(car: &CarHandle, engine: Arc<FixedEngine>) {
        let loader = SimModelLoader::new().with_model("m", engine);
        car.select_model("m", &loader).unwrap();
        car.switch_mode(DriveMode::Auto);
        car.on_start_toggle();
    }

    #[test]
    fn resting_never_predicts_nor_actuates() {
        let (car, log, bus) = rig();
        let engine = FixedEngine::new(vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        let loader = SimModelLoader::new().with_model("m", Arc::clone(&engine));
        car.select_model("m", &loader).unwrap();
        log.clear();

        let frames = capture(&car, &bus).with_max_frames(5).run().unwrap();

        assert_eq!(frames, 5);
        assert_eq!(engine.calls(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn autopilot_follows_the_model() {
        let (car, log, bus) = rig();
        let engine = FixedEngine::new(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        drive_with(&car, Arc::clone(&engine));

        let mut capture = capture(&car, &bus);
        let outcome = capture.step(0).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Actuated(Actuation { gas: Some(430), dir: Some(510) })
        );
        assert_eq!(engine.calls(), 1);
        assert_eq!(log.last_on(GAS), Some(430));
        assert_eq!(log.last_on(DIR), Some(510));
    }

    #[test]
    fn autopilot_not_started_skips_inference() {
        let (car, log, bus) = rig();
        let engine = FixedEngine::new(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        drive_with(&car, Arc::clone(&engine));
        car.on_start_toggle();
        log.clear();

        capture(&car, &bus).with_max_frames(3).run().unwrap();

        assert_eq!(engine.calls(), 0);
        assert_eq!(log.last_on(GAS), Some(385));
        assert_eq!(log.last_on(DIR), Some(410));
    }

    #[test]
    fn inference_failure_falls_back_to_neutral() {
        let (car, log, bus) = rig();
        let engine = FixedEngine::failing();
        drive_with(&car, Arc::clone(&engine));

        let frames = capture(&car, &bus).with_max_frames(4).run().unwrap();

        assert_eq!(frames, 4, "a failing model never stops the loop");
        assert_eq!(engine.calls(), 4);
        // Neutral prediction: centre bucket, constant speed at half rate.
        assert_eq!(log.last_on(DIR), Some(410));
        assert_eq!(log.last_on(GAS), Some(430));
    }

    #[test]
    fn training_saves_labelled_frames() {
        let (car, log, bus) = rig();
        let dir = tempfile::tempdir().unwrap();
        car.switch_mode(DriveMode::Training);
        car.on_start_toggle();
        car.on_gas(1.0).unwrap();
        car.on_dir(1.0).unwrap();
        log.clear();

        CaptureLoop::new(
            Box::new(SimCamera::new("sim0")),
            car.clone(),
            Box::new(JpegDataset::new(dir.path())),
            bus,
        )
        .with_max_frames(3)
        .run()
        .unwrap();

        for i in 0..3 {
            let path = dir.path().join(format!("frame_{i}_gas_0.5_dir_-1.0.jpg"));
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(log.is_empty(), "training frames never actuate");
    }

    #[test]
    fn streaming_publishes_one_frame_per_capture_only_when_enabled() {
        let (car, _log, bus) = rig();
        let mut stream = bus.subscribe_to(Topic::PictureStream);
        let mut capture = capture(&car, &bus);

        capture.step(0).unwrap();
        assert!(stream.drain().is_empty());

        car.switch_streaming();
        capture.step(1).unwrap();
        capture.step(2).unwrap();

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        match &events[0].payload {
            EventPayload::PictureStream { frame, seq, index, pred } => {
                assert_eq!(*seq, 1);
                assert_eq!(*index, 2, "neutral prediction points straight ahead");
                assert_eq!((frame.width, frame.height), (250, 150));
                assert_eq!(pred, &vec![0.0, 0.0, 1.0, 0.0, 0.0]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn streamed_index_is_the_predicted_class() {
        let (car, _log, bus) = rig();
        let engine = FixedEngine::new(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        drive_with(&car, engine);
        car.switch_streaming();
        let mut stream = bus.subscribe_to(Topic::PictureStream);

        capture(&car, &bus).step(0).unwrap();

        let events = stream.drain();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::PictureStream { seq, index, pred, .. } => {
                assert_eq!(*seq, 0);
                assert_eq!(*index, 4);
                assert_eq!(pred, &vec![0.0, 0.0, 0.0, 0.0, 1.0]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    struct SpanNames(Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name());
        }
    }

    #[test]
    fn autopilot_frame_opens_the_exported_spans() {
        use tracing_subscriber::layer::SubscriberExt;

        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(Arc::clone(&names)));
        let (car, _log, bus) = rig();

        tracing::subscriber::with_default(subscriber, || {
            drive_with(&car, FixedEngine::new(vec![0.0, 0.0, 1.0, 0.0, 0.0]));
            capture(&car, &bus).step(0).unwrap();
        });

        let names = names.lock().unwrap();
        for span in ["select_model", "switch_mode", "frame", "inference"] {
            assert!(names.contains(&span), "{span} span missing from {names:?}");
        }
    }

    #[test]
    fn camera_failure_is_fatal() {
        let (car, _log, bus) = rig();
        let result = CaptureLoop::new(
            Box::new(SimCamera::new("sim0").with_limit(2)),
            car,
            Box::new(DiscardDataset),
            bus,
        )
        .run();
        assert!(matches!(result, Err(CarError::Camera(_))));
    }

    #[test]
    fn raised_shutdown_flag_stops_before_capturing() {
        let (car, _log, bus) = rig();
        let flag = Arc::new(AtomicBool::new(true));
        let frames = capture(&car, &bus).with_shutdown(flag).run().unwrap();
        assert_eq!(frames, 0);
    }

    #[tokio::test]
    async fn spawned_loop_streams_until_shutdown() -> Result<(), Box<dyn std::error::Error>> {
        let (car, _log, bus) = rig();
        car.switch_streaming();
        let mut stream = bus.subscribe_to(Topic::PictureStream);

        let capture = CaptureLoop::new(
            Box::new(SimCamera::new("sim0").with_fps(200)),
            car,
            Box::new(DiscardDataset),
            bus.clone(),
        );
        let flag = capture.shutdown_flag();
        let handle = capture.spawn()?;

        let first = tokio::time::timeout(std::time::Duration::from_secs(2), stream.recv()).await??;
        assert!(matches!(first.payload, EventPayload::PictureStream { seq: 0, .. }));

        flag.store(true, Ordering::SeqCst);
        let frames = handle.join().map_err(|_| "capture thread panicked")??;
        assert!(frames >= 1);
        Ok(())
    }
}
