//! Logging and span export for the `autocar` binary.
//!
//! [`init_tracing`] installs one subscriber for the whole process. Logs go to
//! the console; spans are also exported over OTLP/HTTP when a collector is
//! configured. The spans worth looking at in a trace viewer:
//!
//! | Span | Opened by | Fields |
//! |---|---|---|
//! | `frame` | `CaptureLoop::step` | `index`, `mode`, `outcome` |
//! | `inference` | `CaptureLoop::step`, around the model call | |
//! | `http_predict` | the remote model engine | `url` |
//! | `switch_mode` | `Car::switch_mode` | `from`, `to` |
//! | `select_model` | `CarHandle::select_model` | `model` |
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL, e.g. `http://localhost:4318`. Enables export. |
//! | `RUST_LOG` | Filter directives; replaces [`DEFAULT_FILTER`]. |
//! | `AUTOCAR_LOG_FORMAT=json` | Newline-delimited JSON logs. |
//!
//! ```rust,no_run
//! let _guard = autocar_runtime::telemetry::init_tracing("autocar");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Set to `json` for newline-delimited JSON logs.
pub const LOG_FORMAT_VAR: &str = "AUTOCAR_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset: the car's own crates at `info`,
/// everything else (reqwest, hyper, the exporter) at `warn`.
pub const DEFAULT_FILTER: &str =
    "warn,autocar=info,autocar_cli=info,autocar_runtime=info,autocar_kernel=info,autocar_hal=info,autocar_middleware=info";

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const TRACER_NAME: &str = "autocar";

/// Install the global subscriber.
///
/// Hold the returned guard until the process exits; dropping it flushes the
/// exporter.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref());
    let use_json = std::env::var(LOG_FORMAT_VAR).as_deref() == Ok("json");
    let provider = std::env::var(ENDPOINT_VAR)
        .ok()
        .and_then(|endpoint| build_provider(service_name, endpoint));

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));
    let fmt_layer = if use_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the span exporter down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[autocar] span exporter shutdown failed: {e}");
        }
    }
}

/// `RUST_LOG` directives when given and valid, [`DEFAULT_FILTER`] otherwise.
fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn build_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[autocar] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The capture loop is a plain thread and the CLI has no async
            // runtime, so spans are exported synchronously.
            .with_simple_exporter(exporter)
            .build(),
    )
}
