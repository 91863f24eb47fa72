//! Span macros and recording shortcuts used across the runtime.

use std::fmt::Display;
use std::time::Duration;

/// Span for one mysis operation (a turn, a lifecycle step).
///
/// ```rust
/// use zoea_observability::mysis_span;
///
/// let span = mysis_span!("mysis-123", "turn");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! mysis_span {
    ($mysis_id:expr, $operation:expr) => {
        tracing::info_span!(
            "mysis.operation",
            mysis.id = $mysis_id,
            operation = $operation,
        )
    };
}

/// Span for a fleet-wide Commander operation.
#[macro_export]
macro_rules! fleet_span {
    ($operation:expr) => {
        tracing::info_span!("fleet.operation", operation = $operation)
    };
}

/// Span for store operations.
#[macro_export]
macro_rules! store_span {
    ($operation:expr, $key:expr) => {
        tracing::info_span!(
            "store.operation",
            store.operation = $operation,
            store.key = $key,
        )
    };
}

/// Flag the current span as failed and emit the error event. Accepts any
/// displayable error, trait objects included.
pub fn record_error<E: Display + ?Sized>(error: &E) {
    let text = error.to_string();
    let span = tracing::Span::current();
    span.record("otel.status_code", "ERROR");
    span.record("error.message", text.as_str());
    tracing::error!(target: "zoea.telemetry", cause = %text, "span failed");
}

/// Attach an elapsed-time field (milliseconds) to the current span and
/// surface it as a debug event for console readers.
pub fn record_duration(metric: &str, elapsed: Duration) {
    let millis = elapsed.as_millis() as u64;
    tracing::Span::current().record(metric, millis);
    tracing::debug!(target: "zoea.telemetry", metric, elapsed_ms = millis);
}
