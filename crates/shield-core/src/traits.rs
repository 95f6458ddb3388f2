//! Core traits for cybershield abstractions.
//!
//! These traits define the seams between the key lifecycle and its
//! collaborators: the shared store, the identity provider and the
//! device-local storage. Concrete implementations live in `shield-db`
//! (PostgreSQL and in-memory) and `shield-client` (vaults, logs, identity).

use async_trait::async_trait;
use shield_crypto::{PrivateKeyPem, PublicKeyPem};

use crate::error::Result;
use crate::events::SessionSubscription;
use crate::models::*;

// =============================================================================
// SHARED STORE
// =============================================================================

/// Identity to public key mapping with at most one record per identity.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Fetch the stored public key text for an identity.
    ///
    /// The text is returned as stored; callers validate it.
    async fn fetch_public_key(&self, identity: &Identity) -> Result<Option<String>>;

    /// Insert a record unless one already exists for the identity.
    ///
    /// An existing record is never overwritten.
    async fn insert_if_absent(
        &self,
        identity: &Identity,
        public_key: &PublicKeyPem,
    ) -> Result<InsertOutcome>;

    /// Replace the stored key only if it still equals `expected`.
    ///
    /// Used to repair a record whose text no longer parses. Returns whether
    /// the swap happened.
    async fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: &str,
        public_key: &PublicKeyPem,
    ) -> Result<bool>;
}

/// Encrypted message persistence.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a message. Returns it with `origin = remote`.
    async fn insert(&self, message: &PendingMessage) -> Result<Message>;

    /// Messages addressed to `recipient`, newest first.
    async fn list_received(&self, recipient: &Identity) -> Result<Vec<Message>>;

    /// Messages sent by `sender`, newest first.
    async fn list_sent(&self, sender: &Identity) -> Result<Vec<Message>>;
}

// =============================================================================
// IDENTITY PROVIDER
// =============================================================================

/// Account and session management.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register an account. Returns the new identity; a session may or may
    /// not be established depending on email confirmation.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    async fn current_session(&self) -> Option<Session>;

    /// Subscribe to session transitions. Drop the subscription to cancel.
    fn subscribe(&self) -> SessionSubscription;
}

// =============================================================================
// DEVICE-LOCAL STORAGE
// =============================================================================

/// Single-slot store for the current session's private key.
///
/// The private key never leaves the device.
#[async_trait]
pub trait LocalKeyVault: Send + Sync {
    /// Replace the slot contents.
    async fn set(&self, private_key: &PrivateKeyPem) -> Result<()>;

    async fn get(&self) -> Result<Option<PrivateKeyPem>>;

    /// Empty the slot. Clearing an empty vault is not an error.
    async fn clear(&self) -> Result<()>;
}

/// Append-only device-local log of messages the shared store did not accept.
#[async_trait]
pub trait LocalMessageLog: Send + Sync {
    async fn append(&self, message: &Message) -> Result<()>;

    /// All logged messages sent or received by `identity`, in append order.
    async fn list_involving(&self, identity: &Identity) -> Result<Vec<Message>>;
}
