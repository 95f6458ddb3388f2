//! # shield-crypto
//!
//! Key material and message encryption for cybershield.
//!
//! Every user owns one RSA key pair. The public half is published through the
//! key store; the private half never leaves the user's device. Messages are
//! encrypted to the recipient's public key with RSA-OAEP and travel as base64
//! text.
//!
//! ## Cryptographic Primitives
//!
//! - **Key pair**: RSA, 2048-bit modulus (1024-bit available as a
//!   deployment-wide setting)
//! - **Encryption**: RSA-OAEP with SHA-256, single block, no chunking
//! - **Key text format**: PEM envelope, SPKI for public keys and PKCS#8 for
//!   private keys
//! - **Fingerprints**: SHA-256 over the DER key bytes
//!
//! ## Key Envelope
//!
//! ```text
//! -----BEGIN PUBLIC KEY-----
//! MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA...
//! -----END PUBLIC KEY-----
//! ```
//!
//! ## Examples
//!
//! ```rust
//! use shield_crypto::{KeyCodec, KeySize};
//!
//! let codec = KeyCodec::new(KeySize::Rsa1024);
//! let bob = codec.generate_key_pair().unwrap();
//!
//! let ciphertext = codec.encrypt("hello", &bob.public).unwrap();
//! assert_eq!(codec.decrypt(&ciphertext, &bob.private).unwrap(), "hello");
//! ```

pub mod cipher;
pub mod codec;
pub mod error;
pub mod keys;
pub mod pem;

// Re-export commonly used types
pub use codec::KeyCodec;
pub use error::{CryptoError, CryptoResult};
pub use keys::{KeyPair, KeySize, PrivateKeyPem, PublicKeyPem};
pub use pem::KeyTag;
