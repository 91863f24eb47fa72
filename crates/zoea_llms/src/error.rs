use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("missing API key for provider {0}")]
    MissingApiKey(String),

    #[error("rate limited by {provider} ({model})")]
    RateLimited { provider: String, model: String },

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider returned no choices")]
    EmptyResponse,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
