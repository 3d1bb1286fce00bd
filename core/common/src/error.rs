//! Error taxonomy for BucketBridge operations.

use thiserror::Error;

/// Top-level error type for credential and transfer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Identity or federation token invalid, expired, or insufficiently scoped.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Looked-up resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission denied on a destination resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A native document type has no configured export target.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// Any other failed network call.
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is fatal to a whole run regardless of item policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Forbidden(_) | Error::Unauthorized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Forbidden("bucket".into()).is_fatal());
        assert!(Error::Unauthorized("token".into()).is_fatal());
        assert!(!Error::Network("reset".into()).is_fatal());
        assert!(!Error::UnsupportedType("x".into()).is_fatal());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
