use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// A global subscriber is already installed for this process.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),

    /// The OTLP span exporter could not be constructed.
    #[error("span exporter setup failed: {0}")]
    Exporter(String),
}
