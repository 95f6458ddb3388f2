//! Error types for cybershield.

use shield_crypto::CryptoError;
use thiserror::Error;

use crate::models::Identity;

/// Result type alias using cybershield's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cybershield operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Key pair generation failed (no crypto worker, failed self-check)
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// PEM envelope or key encoding is invalid
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// Encryption failed (unusable key, plaintext over capacity)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key, corrupted ciphertext)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The recipient has no published public key
    #[error("No public key found for recipient: {0}")]
    RecipientKeyNotFound(Identity),

    /// The backing store could not be reached after retries
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A write to the backing store failed after retries
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Identity provider rejected the request
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A network call exceeded its time budget
    #[error("Timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Notarization side-channel rejected or failed an operation
    #[error("Notarization error: {0}")]
    Notarization(String),

    /// Client used before `connect` or after `disconnect`
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Connection-level and timeout failures are transient; constraint
    /// violations, bad input and crypto failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::Tls(_)
            ),
            Error::Request(_)
            | Error::Timeout { .. }
            | Error::StoreUnavailable(_)
            | Error::Persistence(_)
            | Error::Io(_) => true,
            _ => false,
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyGeneration(msg) => Error::KeyGeneration(msg),
            CryptoError::MalformedKey(msg) => Error::MalformedKey(msg),
            CryptoError::Encryption(msg) => Error::Encryption(msg),
            CryptoError::Decryption(msg) => Error::Decryption(msg),
            CryptoError::UnsupportedKeySize(bits) => {
                Error::Config(format!("unsupported key size: {} bits", bits))
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout {
                operation: e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "http request".to_string()),
                after_ms: 0,
            }
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_recipient_key_not_found() {
        let id = Identity::new("bob@x.com").unwrap();
        let err = Error::RecipientKeyNotFound(id);
        assert_eq!(
            err.to_string(),
            "No public key found for recipient: bob@x.com"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout {
            operation: "fetch_public_key".to_string(),
            after_ms: 15000,
        };
        assert_eq!(err.to_string(), "Timed out after 15000ms: fetch_public_key");
    }

    #[test]
    fn test_error_display_store_unavailable() {
        let err = Error::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn test_from_crypto_error_maps_taxonomy() {
        let err: Error = CryptoError::Decryption("wrong key".to_string()).into();
        assert!(matches!(err, Error::Decryption(_)));
        assert!(!err.is_transient());

        let err: Error = CryptoError::MalformedKey("bad".to_string()).into();
        assert!(matches!(err, Error::MalformedKey(_)));

        let err: Error = CryptoError::UnsupportedKeySize(512).into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Request("reset".to_string()).is_transient());
        assert!(Error::Timeout {
            operation: "x".to_string(),
            after_ms: 1
        }
        .is_transient());
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!Error::Decryption("x".to_string()).is_transient());
        assert!(!Error::InvalidInput("x".to_string()).is_transient());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
