//! Error types for the Lumen dev server.

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline core error.
    #[error("core error: {0}")]
    Core(#[from] lumen_core::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watch error.
    #[error("file watch error: {0}")]
    Watch(String),

    /// Invalid bind address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
