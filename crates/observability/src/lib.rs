//! zoea-observability — tracing bootstrap for the swarm commander and CLI.
//!
//! One builder assembles the whole stack: an env-filter, console output, an
//! optional OTLP span exporter, and an optional line sink a frontend can
//! tail. `init` installs the subscriber and hands back a guard; dropping
//! the guard flushes any spans still buffered in the exporter.
//!
//! ```no_run
//! let _telemetry = zoea_observability::Telemetry::from_env()
//!     .service("zoea-commander")
//!     .init()
//!     .expect("telemetry init");
//!
//! tracing::info!("commander started");
//! ```
//!
//! Environment variables read by [`Telemetry::from_env`]:
//!
//! - `OTEL_SERVICE_NAME` — service name (default "zoea")
//! - `OTEL_SERVICE_VERSION` — service version
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` — span export target; export stays off
//!   when unset
//! - `RUST_LOG` — filter directives

pub mod error;
pub mod setup;
pub mod sink;
pub mod span;

pub use error::ObservabilityError;
pub use setup::{Telemetry, TelemetryGuard};
pub use sink::LogSink;
pub use span::{record_duration, record_error};

// The span macros (mysis_span!, fleet_span!, store_span!) are exported at
// the crate root via #[macro_export].
