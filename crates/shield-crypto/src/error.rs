//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key pair generation failed or the generated pair did not verify.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// PEM envelope or key encoding is invalid.
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// Encryption failed - unusable key or plaintext over capacity.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or corrupted ciphertext.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Unsupported RSA modulus size.
    #[error("Unsupported key size: {0} bits")]
    UnsupportedKeySize(usize),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::MalformedKey("missing footer".to_string());
        assert_eq!(err.to_string(), "Malformed key: missing footer");
    }

    #[test]
    fn test_unsupported_key_size_display() {
        let err = CryptoError::UnsupportedKeySize(512);
        assert!(err.to_string().contains("512"));
    }

    #[test]
    fn test_decryption_display() {
        let err = CryptoError::Decryption("wrong key".to_string());
        assert!(err.to_string().starts_with("Decryption failed"));
    }
}
