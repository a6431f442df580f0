//! Error types for the booking Lambda.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a booking request.
#[derive(Error, Debug)]
pub enum Error {
    /// Agent envelope is missing required routing fields
    #[error("Malformed agent envelope: {0}")]
    MalformedEnvelope(String),

    /// No handler registered for (method, path)
    #[error("No route for {method} {path}")]
    UnknownRoute { method: String, path: String },

    /// Request payload failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Calendar service call failure
    #[error("Upstream calendar error: {0}")]
    Upstream(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedEnvelope(_) => 400,
            Error::UnknownRoute { .. } => 404,
            Error::Validation(_) => 422,
            Error::Upstream(_) => 502,
            _ => 500,
        }
    }
}
