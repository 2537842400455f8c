// Error handling module
// Defines the credential lifecycle error taxonomy

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while establishing or renewing credentials
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed client id/secret, refresh token, authorization code or account name
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A prompt was required but no terminal is attached
    #[error("Interactive input required: {0}")]
    NotInteractive(String),

    /// Token endpoint response is missing the expected field
    #[error("Token exchange failed, response: {response}")]
    TokenExchangeFailed { response: String },

    /// Signing capability for service accounts is not available
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Service-account key could not be parsed or used for signing
    #[error("Invalid service account file: {0}")]
    InvalidServiceAccountFile(String),

    /// Credential store could not be read or written
    #[error("Credential store error at {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure talking to the token endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Build a `StoreIo` error for the given path
    pub fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuthError::StoreIo {
            path: path.into(),
            source,
        }
    }

    /// Whether re-prompting can recover from this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthError::InvalidInput(_))
    }
}

/// Result type alias for credential operations
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AuthError::InvalidInput("bad client id".to_string());
        assert_eq!(err.to_string(), "Invalid input: bad client id");

        let err = AuthError::TokenExchangeFailed {
            response: r#"{"error":"invalid_grant"}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"Token exchange failed, response: {"error":"invalid_grant"}"#
        );

        let err = AuthError::NotInteractive("run in a terminal".to_string());
        assert_eq!(err.to_string(), "Interactive input required: run in a terminal");
    }

    #[test]
    fn test_store_io_message_contains_path() {
        let err = AuthError::store_io(
            "/tmp/googledrive.conf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/googledrive.conf"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_internal_error_message() {
        let err = AuthError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_only_invalid_input_is_recoverable() {
        assert!(AuthError::InvalidInput("x".into()).is_recoverable());
        assert!(!AuthError::NotInteractive("x".into()).is_recoverable());
        assert!(!AuthError::MissingDependency("x".into()).is_recoverable());
        assert!(!AuthError::TokenExchangeFailed {
            response: String::new()
        }
        .is_recoverable());
    }
}
