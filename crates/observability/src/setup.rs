//! Telemetry bootstrap: the builder, layer assembly, and the flush guard.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::ObservabilityError;
use crate::sink::{self, LogSink};

/// Builder for the process-wide tracing stack. Every output is opt-in
/// except the console, which is on by default.
pub struct Telemetry {
    service: String,
    version: Option<String>,
    filter: Option<String>,
    console: bool,
    otlp_endpoint: Option<String>,
    sink: Option<LogSink>,
}

impl Telemetry {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: None,
            filter: None,
            console: true,
            otlp_endpoint: None,
            sink: None,
        }
    }

    /// Seed the builder from the environment. Span export is enabled only
    /// when `OTEL_EXPORTER_OTLP_ENDPOINT` is explicitly set, so a missing
    /// collector never produces connection noise.
    pub fn from_env() -> Self {
        let service =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "zoea".to_string());
        let mut telemetry = Self::new(service);
        telemetry.version = std::env::var("OTEL_SERVICE_VERSION").ok();
        telemetry.otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        telemetry.filter = std::env::var("RUST_LOG").ok();
        telemetry
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Filter directives ("info", "zoea_runtime=debug", ...).
    pub fn filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    pub fn otlp(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Forward each formatted log line to `sink` (e.g. a frontend's event
    /// pane). The sink must not block.
    pub fn sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Install the global subscriber. Returns the guard that flushes
    /// buffered spans; hold it for the life of the process.
    pub fn init(self) -> Result<TelemetryGuard, ObservabilityError> {
        let filter = match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        if self.console {
            layers.push(tracing_subscriber::fmt::layer().boxed());
        }
        if let Some(sink) = self.sink.clone() {
            layers.push(sink::layer(sink).boxed());
        }

        let mut provider = None;
        if let Some(endpoint) = &self.otlp_endpoint {
            let tracer_provider = self.build_tracer_provider(endpoint)?;
            let tracer = tracer_provider.tracer(self.service.clone());
            layers.push(
                tracing_opentelemetry::layer().with_tracer(tracer).boxed(),
            );
            provider = Some(tracer_provider);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| ObservabilityError::AlreadyInstalled(e.to_string()))?;

        Ok(TelemetryGuard { provider })
    }

    /// Batch-exporting tracer provider for the configured endpoint. A bad
    /// endpoint is a hard error; telemetry misconfiguration should not be
    /// discovered weeks later from missing traces.
    fn build_tracer_provider(
        &self,
        endpoint: &str,
    ) -> Result<SdkTracerProvider, ObservabilityError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.to_string())
            .build()
            .map_err(|e| ObservabilityError::Exporter(e.to_string()))?;

        Ok(SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(self.resource())
            .build())
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.name", self.service.clone())];
        if let Some(version) = &self.version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }
        Resource::builder().with_attributes(attributes).build()
    }
}

/// Flushes and shuts down the span exporter when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Explicit flush, for exit paths that bypass drop order (e.g.
    /// `process::exit`).
    pub fn flush(&self) {
        if let Some(provider) = &self.provider {
            let _ = provider.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let telemetry = Telemetry::new("zoea-test");
        assert_eq!(telemetry.service, "zoea-test");
        assert!(telemetry.console);
        assert!(telemetry.otlp_endpoint.is_none());
        assert!(telemetry.sink.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let telemetry = Telemetry::new("zoea-test")
            .service("zoea-commander")
            .version("0.1.0")
            .filter("debug")
            .console(false)
            .otlp("http://localhost:4317");
        assert_eq!(telemetry.service, "zoea-commander");
        assert_eq!(telemetry.version.as_deref(), Some("0.1.0"));
        assert_eq!(telemetry.filter.as_deref(), Some("debug"));
        assert!(!telemetry.console);
        assert_eq!(
            telemetry.otlp_endpoint.as_deref(),
            Some("http://localhost:4317")
        );
    }

    #[test]
    fn test_guard_without_provider_is_inert() {
        let guard = TelemetryGuard { provider: None };
        guard.flush();
        drop(guard);
    }
}
