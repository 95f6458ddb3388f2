//! # shield-core
//!
//! Core types, traits, and policies for cybershield.
//!
//! This crate provides the data model, the error taxonomy, the repository
//! and provider traits, and the shared retry policy that the other
//! cybershield crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod retry;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{LedgerConfig, ShieldConfig};
pub use error::{Error, Result};
pub use events::{SessionEvent, SessionEventBus, SessionSubscription, SessionTransition};
pub use models::*;
pub use retry::RetryPolicy;
pub use traits::*;

pub use shield_crypto::{KeyCodec, KeyPair, KeySize, PrivateKeyPem, PublicKeyPem};
