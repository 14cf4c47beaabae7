use thiserror::Error;

/// Application-wide error types for rangefetch.
#[derive(Error, Debug)]
pub enum AppError {
    /// The API answered with a non-success status or the request could not be built.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out (connect or total timeout).
    #[error("Request timed out after {0:.2} seconds")]
    Timeout(f64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The body arrived but could not be understood.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Writing a checkpoint failed.
    #[error("Export error: {0}")]
    ExportError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Timeouts, connection failures and non-2xx answers are transient.
    /// Everything else (bad bodies, local I/O, config) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_) | AppError::Timeout(_) | AppError::NetworkError(_)
        )
    }
}
