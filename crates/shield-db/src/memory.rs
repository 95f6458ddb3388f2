//! In-memory repositories.
//!
//! Same contracts as the PostgreSQL repositories, held in process memory.
//! Each carries a [`FailureInjector`] so callers can simulate an unreachable
//! or flaky backing store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use shield_core::{
    Error, Identity, InsertOutcome, KeyRepository, Message, MessageRepository, Origin,
    PendingMessage, PublicKeyPem, Result,
};

/// Controls simulated store failures.
#[derive(Debug, Default)]
pub struct FailureInjector {
    unavailable: AtomicBool,
    fail_next: AtomicU32,
    calls: AtomicUsize,
}

impl FailureInjector {
    /// Fail every call until turned off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, then recover.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(format!("{}: store offline", op)));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(Error::StoreUnavailable(format!("{}: injected failure", op)));
        }
        Ok(())
    }
}

/// In-memory [`KeyRepository`].
#[derive(Debug, Default)]
pub struct InMemoryKeyRepository {
    records: Mutex<HashMap<Identity, String>>,
    failures: FailureInjector,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> &FailureInjector {
        &self.failures
    }

    /// Store arbitrary text for an identity, bypassing validation and the
    /// insert-if-absent rule.
    pub async fn put_raw(&self, identity: &Identity, text: &str) {
        self.records
            .lock()
            .await
            .insert(identity.clone(), text.to_string());
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn fetch_public_key(&self, identity: &Identity) -> Result<Option<String>> {
        self.failures.check("fetch_public_key")?;
        Ok(self.records.lock().await.get(identity).cloned())
    }

    async fn insert_if_absent(
        &self,
        identity: &Identity,
        public_key: &PublicKeyPem,
    ) -> Result<InsertOutcome> {
        self.failures.check("insert_if_absent")?;
        let mut records = self.records.lock().await;
        if records.contains_key(identity) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        records.insert(identity.clone(), public_key.as_str().to_string());
        Ok(InsertOutcome::Inserted)
    }

    async fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: &str,
        public_key: &PublicKeyPem,
    ) -> Result<bool> {
        self.failures.check("compare_and_swap")?;
        let mut records = self.records.lock().await;
        match records.get_mut(identity) {
            Some(stored) if stored.as_str() == expected => {
                *stored = public_key.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory [`MessageRepository`].
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<HashMap<Uuid, Message>>,
    failures: FailureInjector,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> &FailureInjector {
        &self.failures
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    async fn list_matching<F>(&self, op: &str, predicate: F) -> Result<Vec<Message>>
    where
        F: Fn(&Message) -> bool,
    {
        self.failures.check(op)?;
        let mut found: Vec<Message> = self
            .messages
            .lock()
            .await
            .values()
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &PendingMessage) -> Result<Message> {
        self.failures.check("insert_message")?;
        let mut messages = self.messages.lock().await;
        let stored = messages
            .entry(message.id)
            .or_insert_with(|| message.clone().settle(Origin::Remote));
        Ok(stored.clone())
    }

    async fn list_received(&self, recipient: &Identity) -> Result<Vec<Message>> {
        self.list_matching("list_received", |m| &m.recipient == recipient)
            .await
    }

    async fn list_sent(&self, sender: &Identity) -> Result<Vec<Message>> {
        self.list_matching("list_sent", |m| &m.sender == sender).await
    }
}
