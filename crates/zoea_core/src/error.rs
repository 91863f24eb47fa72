use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("mysis error: {0}")]
    Mysis(String),

    #[error("account error: {0}")]
    Account(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
