//! In-process identity provider.
//!
//! Accounts live in memory with Argon2id password digests. Sign-ups
//! either confirm immediately or wait for [`InMemoryIdentityProvider::confirm_email`],
//! mirroring a hosted provider with email confirmation switched on.

use std::collections::HashMap;

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use shield_core::{
    Error, Identity, IdentityProvider, Result, Session, SessionEvent, SessionEventBus,
    SessionSubscription, SessionTransition,
};

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

// Lighter than an at-rest KDF; accounts here only live for the process.
const MEMORY_KIB: u32 = 19 * 1024;
const ITERATIONS: u32 = 2;
const PARALLELISM: u32 = 1;

struct Account {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
    email_verified: bool,
}

fn password_digest(salt: &[u8], password: &str) -> Result<[u8; DIGEST_LEN]> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, Some(DIGEST_LEN))
        .map_err(|e| Error::Auth(format!("password hashing unavailable: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut digest = [0u8; DIGEST_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut digest)
        .map_err(|e| Error::Auth(format!("password hashing failed: {}", e)))?;
    Ok(digest)
}

/// Identity provider backed by process memory.
pub struct InMemoryIdentityProvider {
    accounts: Mutex<HashMap<Identity, Account>>,
    current: RwLock<Option<Session>>,
    bus: SessionEventBus,
    auto_confirm: bool,
}

impl InMemoryIdentityProvider {
    /// Provider whose sign-ups are confirmed immediately.
    pub fn new() -> Self {
        Self::with_confirmation(false)
    }

    /// Provider that requires [`confirm_email`](Self::confirm_email) before
    /// an account can sign in.
    pub fn requiring_confirmation() -> Self {
        Self::with_confirmation(true)
    }

    fn with_confirmation(required: bool) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: RwLock::new(None),
            bus: SessionEventBus::default(),
            auto_confirm: !required,
        }
    }

    pub fn bus(&self) -> &SessionEventBus {
        &self.bus
    }

    /// Mark an account's email as confirmed.
    pub async fn confirm_email(&self, email: &str) -> Result<()> {
        let identity = parse_identity(email)?;
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&identity)
            .ok_or_else(|| Error::Auth(format!("no account for {}", identity)))?;
        account.email_verified = true;
        debug!(subsystem = "identity", identity = %identity, "Email confirmed");
        Ok(())
    }

    /// Re-announce the current session, as a token refresh would.
    pub async fn refresh(&self) -> Result<Session> {
        let session = self
            .current
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("no active session".to_string()))?;
        self.bus.emit(SessionEvent::new(
            SessionTransition::TokenRefreshed,
            Some(session.clone()),
        ));
        Ok(session)
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_identity(email: &str) -> Result<Identity> {
    Identity::new(email).map_err(|_| Error::Auth("email must not be empty".to_string()))
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = parse_identity(email)?;
        if password.is_empty() {
            return Err(Error::Auth("password must not be empty".to_string()));
        }

        {
            let mut accounts = self.accounts.lock().await;
            if accounts.contains_key(&identity) {
                return Err(Error::Auth(format!("account already exists: {}", identity)));
            }
            let mut salt = [0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            accounts.insert(
                identity.clone(),
                Account {
                    salt,
                    digest: password_digest(&salt, password)?,
                    email_verified: self.auto_confirm,
                },
            );
        }

        let session = if self.auto_confirm {
            let session = Session {
                identity: identity.clone(),
                email_verified: true,
            };
            *self.current.write().await = Some(session.clone());
            Some(session)
        } else {
            None
        };
        info!(
            subsystem = "identity",
            identity = %identity,
            confirmed = self.auto_confirm,
            "Account created"
        );
        self.bus
            .emit(SessionEvent::new(SessionTransition::SignedUp, session));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let identity = parse_identity(email)?;
        let session = {
            let accounts = self.accounts.lock().await;
            let account = accounts
                .get(&identity)
                .ok_or_else(|| Error::Auth("invalid login credentials".to_string()))?;
            if password_digest(&account.salt, password)? != account.digest {
                return Err(Error::Auth("invalid login credentials".to_string()));
            }
            if !account.email_verified {
                return Err(Error::Auth("email not confirmed".to_string()));
            }
            Session {
                identity: identity.clone(),
                email_verified: true,
            }
        };

        *self.current.write().await = Some(session.clone());
        info!(subsystem = "identity", identity = %identity, "Signed in");
        self.bus.emit(SessionEvent::new(
            SessionTransition::SignedIn,
            Some(session.clone()),
        ));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            info!(subsystem = "identity", identity = %session.identity, "Signed out");
            self.bus
                .emit(SessionEvent::new(SessionTransition::SignedOut, None));
        }
        Ok(())
    }

    async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    fn subscribe(&self) -> SessionSubscription {
        self.bus.subscribe()
    }
}
