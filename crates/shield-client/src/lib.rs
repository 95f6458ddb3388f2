//! # shield-client
//!
//! Device-side key lifecycle and encrypted message exchange for cybershield.
//!
//! This crate provides:
//! - [`KeyStore`]: cached public key lookups and key provisioning
//! - [`MemoryVault`] and [`FileVault`]: the single-slot private key vault
//! - [`MessageExchange`]: send with local fallback, merged history, decrypt
//! - [`SessionLifecycleHook`]: provisioning driven by session transitions
//! - [`InMemoryIdentityProvider`]: an in-process identity provider
//!
//! ## Example
//!
//! ```rust,ignore
//! let keys = Arc::new(KeyStore::new(repo, vault, KeyCodec::default(), RetryPolicy::default(), 1024));
//! keys.ensure_key_exists(&alice).await?;
//!
//! let exchange = MessageExchange::new(keys, messages, local_log);
//! let sent = exchange.send(&alice, &bob, "hello bob").await?;
//! ```

pub mod exchange;
pub mod identity;
pub mod key_cache;
pub mod key_store;
pub mod local_log;
pub mod session;
pub mod vault;

pub use exchange::MessageExchange;
pub use identity::InMemoryIdentityProvider;
pub use key_cache::KeyCache;
pub use key_store::KeyStore;
pub use local_log::{FileMessageLog, MemoryMessageLog};
pub use session::{HookAction, HookHandle, SessionLifecycleHook};
pub use vault::{FileVault, MemoryVault};

pub use shield_core::*;
