//! `autocar-runtime` – the running car.
//!
//! # Modules
//!
//! - [`capture_loop`] – [`CaptureLoop`][capture_loop::CaptureLoop]: the
//!   dedicated thread that captures frames, runs inference outside the car
//!   lock, dispatches to the bound handler and feeds the picture stream.
//! - [`dataset`] – [`DatasetSink`][dataset::DatasetSink] and
//!   [`JpegDataset`][dataset::JpegDataset]: cropped, labelled JPEG frames
//!   recorded in training mode.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod capture_loop;
pub mod dataset;
pub mod telemetry;

pub use capture_loop::CaptureLoop;
pub use dataset::{DatasetSink, DiscardDataset, JpegDataset};
pub use telemetry::{init_tracing, TracerProviderGuard};
