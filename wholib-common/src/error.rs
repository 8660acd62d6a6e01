//! Common error types for the wholib client

use thiserror::Error;
use uuid::Uuid;

/// Common result type for wholib operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the library client
///
/// Transport-level failures are absorbed by the reconnection manager and
/// never reach callers directly; what callers see are mutation outcomes,
/// API errors, and configuration problems. Reconnect exhaustion surfaces
/// through the connection-state watch channel, not through this enum.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned a non-success status with an error body
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed server message or unexpected payload shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A mutation for this item is already in flight
    #[error("Mutation already in progress for item {0}")]
    MutationInProgress(Uuid),

    /// Mutation request did not resolve within the configured timeout
    #[error("Mutation timed out for item {0}")]
    MutationTimeout(Uuid),

    /// Operation attempted while no transport is connected
    #[error("Not connected")]
    Disconnected,

    /// Internal client error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for conditions the live client absorbs and retries internally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 404,
            message: "Library item not found".to_string(),
        };
        assert_eq!(err.to_string(), "API error (404): Library item not found");
    }

    #[test]
    fn test_config_error_is_not_recoverable() {
        assert!(!Error::Config("no transports enabled".to_string()).is_recoverable());
        assert!(Error::Protocol("bad frame".to_string()).is_recoverable());
        assert!(Error::MutationInProgress(Uuid::new_v4()).is_recoverable());
    }
}
