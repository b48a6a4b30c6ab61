//! Logging and Trace Export
//!
//! Console logging is always on. `RUST_LOG` replaces the default directives
//! entirely when set; otherwise the relay logs its own targets at `info` and
//! keeps the MQTT and HTTP stacks quiet.
//!
//! Spans can additionally be exported over OTLP, tagged with the relay's
//! service name, version and team.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default: `card_relay=info,tower_http=info,rumqttc=warn,hyper=warn`)
//! - `OTEL_ENABLED`: `true`, `1` or `yes` to export spans (default: off)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: service name (default: rfid-card-relay)
//! - `TEAM_ID`: recorded as the `rfid.team_id` resource attribute

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::infrastructure::config::DEFAULT_TEAM_ID;

const DEFAULT_SERVICE_NAME: &str = "rfid-card-relay";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Directives used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_LOG_DIRECTIVES: &str = "card_relay=info,tower_http=info,rumqttc=warn,hyper=warn";

/// Keeps the trace pipeline alive; flushes pending spans when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to flush trace exporter: {e}");
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Raw `RUST_LOG` value, if any.
    pub log_directives: Option<String>,
    /// Export spans over OTLP.
    pub export_spans: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name attached to exported spans.
    pub service_name: String,
    /// Team the relay serves.
    pub team_id: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl TelemetryConfig {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            log_directives: non_empty("RUST_LOG"),
            export_spans: non_empty("OTEL_ENABLED").is_some_and(|v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }),
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            service_name: non_empty("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            team_id: non_empty("TEAM_ID").unwrap_or_else(|| DEFAULT_TEAM_ID.to_string()),
        }
    }

    /// Log filter: `RUST_LOG` as given, or the relay defaults.
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        self.log_directives
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
            .with_attribute(KeyValue::new("rfid.team_id", self.team_id.clone()))
            .build()
    }

    fn tracer_provider(&self) -> Option<SdkTracerProvider> {
        if !self.export_spans {
            return None;
        }

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.otlp_endpoint)
            .build();

        match exporter {
            Ok(exporter) => Some(
                SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .with_resource(self.resource())
                    .build(),
            ),
            Err(e) => {
                eprintln!("OTLP exporter unavailable, logging to console only: {e}");
                None
            }
        }
    }
}

/// Install the global subscriber from the process environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the global subscriber from explicit settings.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let tracer_provider = config.tracer_provider();
    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = tracing_subscriber::registry()
        .with(config.log_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("Tracing subscriber already installed: {e}");
    }

    TelemetryGuard { tracer_provider }
}
