//! Encrypted message exchange.
//!
//! Sending encrypts to the recipient's published key and persists the
//! ciphertext to the shared store, falling back to the device-local log when
//! the store will not take it. A send that got as far as encryption always
//! produces a [`Message`]. Notarization runs after persistence, gets a single
//! attempt, and its failures are logged and dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shield_core::{
    Error, Identity, LocalMessageLog, Message, MessageHistory, MessageRepository,
    NotarizationRecord, Origin, PendingMessage, PrivateKeyPem, Result, RetryPolicy,
};
use shield_ledger::NotarizationClient;

use crate::key_store::KeyStore;

/// Send, list and decrypt messages for the identities on this device.
pub struct MessageExchange {
    keys: Arc<KeyStore>,
    messages: Arc<dyn MessageRepository>,
    local_log: Arc<dyn LocalMessageLog>,
    notary: Option<Arc<NotarizationClient>>,
    retry: RetryPolicy,
}

impl MessageExchange {
    /// Exchange without notarization. Uses the key store's retry policy.
    pub fn new(
        keys: Arc<KeyStore>,
        messages: Arc<dyn MessageRepository>,
        local_log: Arc<dyn LocalMessageLog>,
    ) -> Self {
        let retry = keys.retry_policy().clone();
        Self {
            keys,
            messages,
            local_log,
            notary: None,
            retry,
        }
    }

    pub fn with_notarization(mut self, notary: Arc<NotarizationClient>) -> Self {
        self.notary = Some(notary);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Encrypt `plaintext` for `recipient` and persist it.
    ///
    /// # Errors
    ///
    /// - [`Error::RecipientKeyNotFound`] if the recipient never published a key
    /// - [`Error::StoreUnavailable`] if the key lookup itself could not run
    /// - [`Error::Encryption`] if the plaintext does not fit in one block
    ///
    /// Persistence and notarization failures are not errors.
    #[instrument(
        skip_all,
        fields(subsystem = "exchange", component = "message_exchange", op = "send", sender = %sender, recipient = %recipient)
    )]
    pub async fn send(
        &self,
        sender: &Identity,
        recipient: &Identity,
        plaintext: &str,
    ) -> Result<Message> {
        let start = Instant::now();

        let recipient_key = self
            .keys
            .get_public_key(recipient)
            .await?
            .ok_or_else(|| Error::RecipientKeyNotFound(recipient.clone()))?;
        let ciphertext = self.keys.codec().encrypt(plaintext, &recipient_key)?;

        let pending = PendingMessage::new(sender.clone(), recipient.clone(), ciphertext);
        let message = self.persist(pending).await;
        self.notarize(&message).await;

        info!(
            message_id = %message.id,
            origin = message.origin.as_str(),
            plaintext_len = plaintext.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Message sent"
        );
        Ok(message)
    }

    /// Every message sent or received by `identity`, remote and local,
    /// each list newest first.
    ///
    /// A store that cannot be reached contributes nothing; the local log
    /// still does.
    #[instrument(
        skip_all,
        fields(subsystem = "exchange", component = "message_exchange", op = "fetch_history", identity = %identity)
    )]
    pub async fn fetch_history(&self, identity: &Identity) -> Result<MessageHistory> {
        let start = Instant::now();

        let remote_received = self.list_remote(Mailbox::Received, identity).await;
        let remote_sent = self.list_remote(Mailbox::Sent, identity).await;
        let local = match self.local_log.list_involving(identity).await {
            Ok(local) => local,
            Err(e) => {
                warn!(error = %e, "Local message log unreadable, showing remote only");
                Vec::new()
            }
        };

        let (local_received, local_sent): (Vec<Message>, Vec<Message>) =
            local.into_iter().partition(|m| &m.recipient == identity);
        // A message to oneself belongs in both lists.
        let local_self: Vec<Message> = local_received
            .iter()
            .filter(|m| &m.sender == identity)
            .cloned()
            .collect();

        let mut history = MessageHistory {
            received: merge(remote_received, local_received),
            sent: merge(remote_sent, local_sent.into_iter().chain(local_self).collect()),
        };
        self.enrich(&mut history).await;

        info!(
            received = history.received.len(),
            sent = history.sent.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "History fetched"
        );
        Ok(history)
    }

    /// Decrypt a message with an explicit private key.
    pub fn decrypt(&self, message: &Message, private_key: &PrivateKeyPem) -> Result<String> {
        Ok(self
            .keys
            .codec()
            .decrypt(&message.ciphertext, private_key)?)
    }

    /// Decrypt a message with the private key in this device's vault.
    pub async fn open(&self, message: &Message) -> Result<String> {
        let private_key = self.keys.vault().get().await?.ok_or_else(|| {
            Error::Decryption("no private key in the local vault".to_string())
        })?;
        self.decrypt(message, &private_key)
    }

    async fn persist(&self, pending: PendingMessage) -> Message {
        let attempt = self
            .retry
            .run("insert_message", || {
                let messages = self.messages.clone();
                let pending = pending.clone();
                async move { messages.insert(&pending).await }
            })
            .await;

        let error = match attempt {
            Ok(stored) => return stored,
            Err(e) => e,
        };

        warn!(
            message_id = %pending.id,
            error = %error,
            "Shared store rejected message, keeping it locally"
        );
        let local = pending.settle(Origin::Local);
        if let Err(e) = self.local_log.append(&local).await {
            error!(
                message_id = %local.id,
                error = %e,
                "Local message log append failed, message is not persisted"
            );
        }
        local
    }

    async fn notarize(&self, message: &Message) {
        let Some(notary) = &self.notary else {
            return;
        };
        let record = NotarizationRecord::sent(message);
        match self.retry.attempt_once("notarize", notary.store(&record)).await {
            Ok(()) => debug!(message_id = %message.id, "Message notarized"),
            Err(e) => warn!(
                message_id = %message.id,
                error = %e,
                "Notarization failed, continuing without it"
            ),
        }
    }

    async fn list_remote(&self, mailbox: Mailbox, identity: &Identity) -> Vec<Message> {
        let result = self
            .retry
            .run(mailbox.operation(), || {
                let messages = self.messages.clone();
                let identity = identity.clone();
                async move {
                    match mailbox {
                        Mailbox::Received => messages.list_received(&identity).await,
                        Mailbox::Sent => messages.list_sent(&identity).await,
                    }
                }
            })
            .await;
        match result {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    op = mailbox.operation(),
                    error = %e,
                    "Shared store unreachable, using local messages only"
                );
                Vec::new()
            }
        }
    }

    async fn enrich(&self, history: &mut MessageHistory) {
        let Some(notary) = &self.notary else {
            return;
        };

        let ids: Vec<Uuid> = history
            .received
            .iter()
            .chain(history.sent.iter())
            .map(|m| m.id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let lookups = ids.iter().map(|id| async move {
            let found = self.retry.attempt_once("notarization_get", notary.get(*id)).await;
            (*id, found)
        });

        let mut records = HashMap::new();
        let mut failures = 0usize;
        for (id, found) in join_all(lookups).await {
            match found {
                Ok(Some(record)) => {
                    records.insert(id, record);
                }
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    debug!(message_id = %id, error = %e, "Notarization lookup failed");
                }
            }
        }
        if failures > 0 {
            warn!(
                failures,
                total = ids.len(),
                "Some notarization lookups failed, history shown without them"
            );
        }

        for message in history.received.iter_mut().chain(history.sent.iter_mut()) {
            if let Some(record) = records.get(&message.id) {
                message.notarization = Some(record.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mailbox {
    Received,
    Sent,
}

impl Mailbox {
    fn operation(self) -> &'static str {
        match self {
            Mailbox::Received => "list_received",
            Mailbox::Sent => "list_sent",
        }
    }
}

/// Remote first so a remote copy wins over a local copy with the same id.
fn merge(remote: Vec<Message>, local: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Message> = remote
        .into_iter()
        .chain(local)
        .filter(|m| seen.insert(m.id))
        .collect();
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    merged
}
