//! Error types for Lizzy operations.
//!
//! Every failure surfaced by the client maps onto a single [`Error`] enum. Non-success
//! HTTP responses become [`Error::Request`] carrying the status code and response body,
//! network-level failures become one of the transport variants.

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for Lizzy operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The API answered with a non-success status
    #[error("Lizzy request failed with status {status}: {body}")]
    Request {
        /// HTTP status returned by the API
        status: StatusCode,
        /// Raw response body, if any
        body: String,
    },

    /// Request timed out
    #[error("Timeout waiting for Lizzy: {0}")]
    Timeout(String),

    /// Could not connect to the API
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other transport-level failure
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    /// Reading a local file failed
    #[error("Failed to read {path}: {message}")]
    Io {
        /// Path that could not be read
        path: String,
        /// Underlying I/O error message
        message: String,
    },

    /// Failed to parse an API response
    #[error("Failed to parse Lizzy response: {0}")]
    ParseError(String),

    /// A stack was returned without a `status` attribute
    #[error("Stack `{0}` has no status")]
    MissingStatus(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Specialized result type for Lizzy operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Request { .. } => "REQUEST_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::MissingStatus(_) => "MISSING_STATUS",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// HTTP status of a failed request, if the API answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the API answered with `404 Not Found`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Returns true for network-level failures (no HTTP status was received).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ServiceUnavailable(_) | Self::Transport(_)
        )
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
