//! RSA-OAEP (SHA-256) encryption of short payloads.
//!
//! Ciphertext is carried as standard base64 text so it can be stored in a
//! text column next to the message metadata. There is no chunking: a payload
//! larger than one OAEP block is rejected.

use base64::Engine;
use rsa::sha2::Sha256;
use rsa::traits::PublicKeyParts;
use rsa::Oaep;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKeyPem, PublicKeyPem};

/// Largest plaintext (in bytes) the given public key can encrypt.
pub fn max_plaintext_len(public_key: &PublicKeyPem) -> CryptoResult<usize> {
    let key = public_key.to_rsa()?;
    Ok(key.size().saturating_sub(2 * 32 + 2))
}

/// Encrypt raw bytes for the holder of `public_key`.
///
/// Returns base64-encoded ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the plaintext exceeds the key's
/// capacity or the RSA operation fails.
pub fn encrypt(plaintext: &[u8], public_key: &PublicKeyPem) -> CryptoResult<String> {
    let key = public_key
        .to_rsa()
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let capacity = key.size().saturating_sub(2 * 32 + 2);
    if plaintext.len() > capacity {
        return Err(CryptoError::Encryption(format!(
            "plaintext is {} bytes but a {}-bit key holds at most {}",
            plaintext.len(),
            key.size() * 8,
            capacity
        )));
    }

    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

/// Decrypt base64 ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the ciphertext is not base64, was
/// encrypted for a different key, or has been corrupted.
pub fn decrypt(ciphertext: &str, private_key: &PrivateKeyPem) -> CryptoResult<Vec<u8>> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not base64: {}", e)))?;

    let key = private_key
        .to_rsa()
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    if raw.len() != key.size() {
        return Err(CryptoError::Decryption(format!(
            "ciphertext is {} bytes, expected {}",
            raw.len(),
            key.size()
        )));
    }

    key.decrypt(Oaep::new::<Sha256>(), &raw)
        .map_err(|_| CryptoError::Decryption("wrong key or corrupted ciphertext".to_string()))
}
