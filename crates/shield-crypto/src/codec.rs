//! Deployment-bound key codec.
//!
//! A [`KeyCodec`] is configured with exactly one [`KeySize`]. Keys of any
//! other size are refused for encryption, so 1024-bit and 2048-bit keys are
//! never mixed inside one deployment.

use crate::cipher;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyPair, KeySize, PrivateKeyPem, PublicKeyPem};
use crate::pem::{self, KeyTag};

/// Probe string used to verify a freshly generated pair.
const SELF_CHECK_PROBE: &str = "test";

/// Key generation, PEM encoding and message encryption for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyCodec {
    key_size: KeySize,
}

impl KeyCodec {
    /// Create a codec producing and accepting keys of `key_size`.
    pub fn new(key_size: KeySize) -> Self {
        Self { key_size }
    }

    /// The deployment's key size.
    pub fn key_size(&self) -> KeySize {
        self.key_size
    }

    /// Largest plaintext (in bytes) a message may carry.
    pub fn max_plaintext_len(&self) -> usize {
        self.key_size.max_plaintext_len()
    }

    /// Generate a new key pair and verify it with an encrypt/decrypt probe.
    pub fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        let pair = KeyPair::generate(self.key_size)?;

        let probe = cipher::encrypt(SELF_CHECK_PROBE.as_bytes(), &pair.public)
            .map_err(|e| CryptoError::KeyGeneration(format!("verification encrypt: {}", e)))?;
        let echoed = cipher::decrypt(&probe, &pair.private)
            .map_err(|e| CryptoError::KeyGeneration(format!("verification decrypt: {}", e)))?;
        if echoed != SELF_CHECK_PROBE.as_bytes() {
            return Err(CryptoError::KeyGeneration(
                "generated key pair failed verification".to_string(),
            ));
        }

        Ok(pair)
    }

    /// Wrap raw exported key bytes in a PEM envelope.
    pub fn encode(&self, bytes: &[u8], tag: KeyTag) -> String {
        pem::encode(bytes, tag)
    }

    /// Unwrap a PEM envelope.
    pub fn decode(&self, pem: &str) -> CryptoResult<(KeyTag, Vec<u8>)> {
        pem::decode(pem)
    }

    /// Encrypt a text message for the holder of `public_key`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Encryption`] if the key's modulus differs from the
    /// deployment's key size or the plaintext exceeds its capacity.
    pub fn encrypt(&self, plaintext: &str, public_key: &PublicKeyPem) -> CryptoResult<String> {
        let bits = public_key
            .modulus_bits()
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        if bits != self.key_size.bits() {
            return Err(CryptoError::Encryption(format!(
                "recipient key is {}-bit but this deployment uses {}",
                bits, self.key_size
            )));
        }
        cipher::encrypt(plaintext.as_bytes(), public_key)
    }

    /// Decrypt a text message with the local private key.
    pub fn decrypt(&self, ciphertext: &str, private_key: &PrivateKeyPem) -> CryptoResult<String> {
        let bytes = cipher::decrypt(ciphertext, private_key)?;
        String::from_utf8(bytes)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}
