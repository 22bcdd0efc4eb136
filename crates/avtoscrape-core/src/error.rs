use thiserror::Error;

/// Application-wide error types for avtoscrape.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Navigation or request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The rendered page did not contain the expected listing markup.
    #[error("Unexpected markup: {0}")]
    UnexpectedMarkup(String),

    /// A URL, selector or payload could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Page-level failures (network, timeout, bad status, missing listing
    /// markup) are retryable. Parse, configuration and store failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::Timeout(_)
                | AppError::NetworkError(_)
                | AppError::UnexpectedMarkup(_)
        )
    }
}

/// Failure of a single field transform.
///
/// Never escapes the record assembler: the field resolves to `null` and
/// assembly continues with the next field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("value {0} is out of range")]
    OutOfRange(i64),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transform received a {0} source")]
    SourceMismatch(&'static str),

    #[error("field expects {expected}, transform produced {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}
