//! Public key registry with cached reads and on-demand provisioning.
//!
//! The shared store holds at most one public key per identity and the first
//! key written wins. Provisioning generates a pair on this device, keeps the
//! private half in the [`LocalKeyVault`] and publishes the public half with
//! an insert-if-absent write, then reads the record back to learn which key
//! is authoritative.
//!
//! Provisioning for one identity is single-flight within a store: concurrent
//! callers queue behind the first and then find its key already published,
//! so the vault never ends up holding a key that lost the race to a sibling
//! call on the same device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use shield_core::{
    Error, Identity, KeyCodec, KeyPair, KeyRepository, LocalKeyVault, ProvisionOutcome,
    PublicKeyPem, Result, RetryPolicy,
};

use crate::key_cache::KeyCache;

/// Identity to public key lookups and key provisioning.
pub struct KeyStore {
    repo: Arc<dyn KeyRepository>,
    vault: Arc<dyn LocalKeyVault>,
    codec: KeyCodec,
    retry: RetryPolicy,
    cache: KeyCache,
    provisioning: Mutex<HashMap<Identity, Arc<Mutex<()>>>>,
}

impl KeyStore {
    pub fn new(
        repo: Arc<dyn KeyRepository>,
        vault: Arc<dyn LocalKeyVault>,
        codec: KeyCodec,
        retry: RetryPolicy,
        cache_capacity: usize,
    ) -> Self {
        Self {
            repo,
            vault,
            codec,
            retry,
            cache: KeyCache::new(cache_capacity),
            provisioning: Mutex::new(HashMap::new()),
        }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn vault(&self) -> &Arc<dyn LocalKeyVault> {
        &self.vault
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Look up the published key for `identity`.
    ///
    /// `Ok(None)` means no usable key is published. A stored value that does
    /// not parse as a public key is treated as absent. Store failures that
    /// outlast the retry policy surface as [`Error::StoreUnavailable`].
    pub async fn get_public_key(&self, identity: &Identity) -> Result<Option<PublicKeyPem>> {
        if let Some(cached) = self.cache.get(identity).await {
            debug!(
                subsystem = "keys",
                component = "key_store",
                identity = %identity,
                "Public key cache hit"
            );
            return Ok(Some(cached));
        }

        let stored = self.fetch_raw(identity).await.map_err(unavailable)?;
        let Some(text) = stored else {
            debug!(
                subsystem = "keys",
                component = "key_store",
                identity = %identity,
                "No public key published"
            );
            return Ok(None);
        };

        match PublicKeyPem::parse(&text) {
            Ok(key) => {
                self.cache.insert(identity.clone(), key.clone()).await;
                Ok(Some(key))
            }
            Err(e) => {
                warn!(
                    subsystem = "keys",
                    component = "key_store",
                    identity = %identity,
                    error = %e,
                    "Stored public key is malformed, treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Publish `public_key` for `identity` unless a valid key already exists.
    ///
    /// Returns the key the store holds afterwards, which is the earlier key
    /// if another writer got there first. A stored value that no longer
    /// parses is replaced, but only if it has not changed since it was read.
    #[instrument(
        skip_all,
        fields(subsystem = "keys", component = "key_store", op = "store", identity = %identity)
    )]
    pub async fn store(
        &self,
        identity: &Identity,
        public_key: &PublicKeyPem,
    ) -> Result<PublicKeyPem> {
        let start = Instant::now();

        let outcome = self
            .retry
            .run("insert_public_key", || {
                let repo = self.repo.clone();
                let identity = identity.clone();
                let public_key = public_key.clone();
                async move { repo.insert_if_absent(&identity, &public_key).await }
            })
            .await
            .map_err(persistence)?;

        let stored = self.fetch_raw(identity).await.map_err(persistence)?;
        let authoritative = match stored {
            Some(text) => match PublicKeyPem::parse(&text) {
                Ok(key) => key,
                Err(e) => {
                    warn!(
                        error = %e,
                        "Stored public key is malformed, replacing it"
                    );
                    self.repair(identity, &text, public_key).await?
                }
            },
            None => {
                return Err(Error::Persistence(format!(
                    "public key for {} missing after write",
                    identity
                )))
            }
        };

        self.cache
            .insert(identity.clone(), authoritative.clone())
            .await;
        info!(
            ?outcome,
            key_fingerprint = %authoritative.fingerprint(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Public key stored"
        );
        Ok(authoritative)
    }

    /// Make sure `identity` has a published public key.
    ///
    /// Generates and publishes a new pair only when none is published. The
    /// private half is written to the vault before the public half goes out,
    /// so a published key always has a device-local private counterpart.
    #[instrument(
        skip_all,
        fields(subsystem = "keys", component = "key_store", op = "ensure_key_exists", identity = %identity)
    )]
    pub async fn ensure_key_exists(&self, identity: &Identity) -> Result<ProvisionOutcome> {
        let gate = self.provisioning_gate(identity).await;
        let result = {
            let _in_flight = gate.lock().await;
            self.provision(identity).await
        };
        self.release_gate(identity, &gate).await;
        result
    }

    async fn provision(&self, identity: &Identity) -> Result<ProvisionOutcome> {
        let start = Instant::now();

        if let Some(existing) = self.get_public_key(identity).await? {
            self.check_vault_matches(&existing).await;
            debug!(
                key_fingerprint = %existing.fingerprint(),
                "Public key already published"
            );
            return Ok(ProvisionOutcome::Existing);
        }

        let pair = self.generate().await?;
        self.vault.set(&pair.private).await?;
        let authoritative = self.store(identity, &pair.public).await?;

        let outcome = if authoritative == pair.public {
            ProvisionOutcome::Generated
        } else {
            warn!(
                generated_fingerprint = %pair.public.fingerprint(),
                key_fingerprint = %authoritative.fingerprint(),
                "Concurrent provisioning published a different key first"
            );
            ProvisionOutcome::Superseded
        };

        info!(
            outcome = outcome.as_str(),
            key_bits = self.codec.key_size().bits(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Key provisioning complete"
        );
        Ok(outcome)
    }

    async fn provisioning_gate(&self, identity: &Identity) -> Arc<Mutex<()>> {
        self.provisioning
            .lock()
            .await
            .entry(identity.clone())
            .or_default()
            .clone()
    }

    /// Drop the gate once no other caller is queued on it.
    async fn release_gate(&self, identity: &Identity, gate: &Arc<Mutex<()>>) {
        let mut gates = self.provisioning.lock().await;
        if Arc::strong_count(gate) <= 2 {
            gates.remove(identity);
        }
    }

    /// Whether the vault's private key belongs to the key published for
    /// `identity`.
    pub async fn local_key_is_authoritative(&self, identity: &Identity) -> Result<bool> {
        let Some(published) = self.get_public_key(identity).await? else {
            return Ok(false);
        };
        let Some(private) = self.vault.get().await? else {
            return Ok(false);
        };
        Ok(private.public_key()? == published)
    }

    /// Drop one identity from the cache so the next read goes to the store.
    pub async fn invalidate(&self, identity: &Identity) -> bool {
        self.cache.invalidate(identity).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn fetch_raw(&self, identity: &Identity) -> Result<Option<String>> {
        self.retry
            .run("fetch_public_key", || {
                let repo = self.repo.clone();
                let identity = identity.clone();
                async move { repo.fetch_public_key(&identity).await }
            })
            .await
    }

    /// RSA generation is CPU-bound; run it off the async workers.
    async fn generate(&self) -> Result<KeyPair> {
        let codec = self.codec;
        let start = Instant::now();
        let pair = tokio::task::spawn_blocking(move || codec.generate_key_pair())
            .await
            .map_err(|e| Error::KeyGeneration(format!("key generation task failed: {}", e)))??;
        debug!(
            key_bits = codec.key_size().bits(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Key pair generated"
        );
        Ok(pair)
    }

    async fn repair(
        &self,
        identity: &Identity,
        corrupt: &str,
        public_key: &PublicKeyPem,
    ) -> Result<PublicKeyPem> {
        let swapped = self
            .retry
            .run("repair_public_key", || {
                let repo = self.repo.clone();
                let identity = identity.clone();
                let corrupt = corrupt.to_string();
                let public_key = public_key.clone();
                async move {
                    repo.compare_and_swap(&identity, &corrupt, &public_key)
                        .await
                }
            })
            .await
            .map_err(persistence)?;
        debug!(swapped, "Malformed key repair attempted");

        // Someone else may have repaired it first; their key wins.
        let text = self
            .fetch_raw(identity)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                Error::Persistence(format!("public key for {} vanished during repair", identity))
            })?;
        PublicKeyPem::parse(&text).map_err(|e| {
            Error::Persistence(format!("stored public key still malformed: {}", e))
        })
    }

    async fn check_vault_matches(&self, published: &PublicKeyPem) {
        match self.vault.get().await {
            Ok(Some(private)) => match private.public_key() {
                Ok(local) if &local == published => {}
                Ok(local) => warn!(
                    local_fingerprint = %local.fingerprint(),
                    key_fingerprint = %published.fingerprint(),
                    "Vault private key does not match the published key"
                ),
                Err(e) => warn!(error = %e, "Vault private key is unreadable"),
            },
            Ok(None) => warn!(
                key_fingerprint = %published.fingerprint(),
                "Published key has no private key on this device"
            ),
            Err(e) => warn!(error = %e, "Vault read failed"),
        }
    }
}

fn unavailable(e: Error) -> Error {
    match e {
        Error::StoreUnavailable(_) => e,
        other => Error::StoreUnavailable(other.to_string()),
    }
}

fn persistence(e: Error) -> Error {
    match e {
        Error::Persistence(_) => e,
        other => Error::Persistence(other.to_string()),
    }
}
