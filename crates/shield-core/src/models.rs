//! Core data models for cybershield.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shield_crypto::PublicKeyPem;
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// IDENTITY
// =============================================================================

/// A user identity, in practice the account email address.
///
/// Surrounding whitespace is trimmed; no further syntax checks are made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create an identity, rejecting empty input.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("identity must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl std::str::FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Identity::new(s)
    }
}

// =============================================================================
// KEYS
// =============================================================================

/// A published public key, one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub identity: Identity,
    pub public_key: PublicKeyPem,
    pub created_at: DateTime<Utc>,
}

/// Result of an insert-if-absent write to the key store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This call created the record.
    Inserted,
    /// A record already existed and was left untouched.
    AlreadyPresent,
}

/// What `ensure_key_exists` had to do for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionOutcome {
    /// A valid public key was already published.
    Existing,
    /// A new key pair was generated and its public half published.
    Generated,
    /// A key pair was generated but a concurrent writer published first.
    Superseded,
}

impl ProvisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionOutcome::Existing => "existing",
            ProvisionOutcome::Generated => "generated",
            ProvisionOutcome::Superseded => "superseded",
        }
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Where a message ended up being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Shared backing store.
    Remote,
    /// Device-local fallback log.
    Local,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Remote => "remote",
            Origin::Local => "local",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encrypted message that has been built but not yet persisted.
///
/// The id and timestamp are assigned up front and kept whichever store
/// accepts the message, so a remote write that actually landed before a
/// timeout and its local fallback copy share one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub id: Uuid,
    pub sender: Identity,
    pub recipient: Identity,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(sender: Identity, recipient: Identity, ciphertext: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender,
            recipient,
            ciphertext,
            created_at: Utc::now(),
        }
    }

    /// Settle the message with the given origin.
    pub fn settle(self, origin: Origin) -> Message {
        Message {
            id: self.id,
            sender: self.sender,
            recipient: self.recipient,
            ciphertext: self.ciphertext,
            created_at: self.created_at,
            origin,
            notarization: None,
        }
    }
}

/// A persisted encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Identity,
    pub recipient: Identity,
    /// Base64 RSA-OAEP ciphertext.
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub origin: Origin,
    /// Advisory ledger record, attached during history enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notarization: Option<NotarizationRecord>,
}

/// Messages involving one identity, each list newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHistory {
    pub received: Vec<Message>,
    pub sent: Vec<Message>,
}

impl MessageHistory {
    pub fn len(&self) -> usize {
        self.received.len() + self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.is_empty() && self.sent.is_empty()
    }
}

// =============================================================================
// NOTARIZATION
// =============================================================================

/// Delivery status tracked on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotarizationStatus {
    Sent,
    Delivered,
    Read,
}

impl NotarizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotarizationStatus::Sent => "sent",
            NotarizationStatus::Delivered => "delivered",
            NotarizationStatus::Read => "read",
        }
    }
}

impl fmt::Display for NotarizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotarizationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sent" => Ok(NotarizationStatus::Sent),
            "delivered" => Ok(NotarizationStatus::Delivered),
            "read" => Ok(NotarizationStatus::Read),
            other => Err(Error::InvalidInput(format!(
                "unknown notarization status: {}",
                other
            ))),
        }
    }
}

/// Message metadata recorded on the notarization ledger.
///
/// Serialized with camelCase keys, the ledger's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationRecord {
    pub message_id: Uuid,
    pub sender: Identity,
    pub recipient: Identity,
    pub timestamp: DateTime<Utc>,
    pub status: NotarizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl NotarizationRecord {
    /// The initial "sent" record for a message.
    pub fn sent(message: &Message) -> Self {
        Self {
            message_id: message.id,
            sender: message.sender.clone(),
            recipient: message.recipient.clone(),
            timestamp: message.created_at,
            status: NotarizationStatus::Sent,
            last_updated: None,
        }
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

/// An authenticated session as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub email_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejects_empty() {
        assert!(Identity::new("").is_err());
        assert!(Identity::new("   ").is_err());
    }

    #[test]
    fn test_identity_trims() {
        let id = Identity::new("  alice@x.com \n").unwrap();
        assert_eq!(id.as_str(), "alice@x.com");
        assert_eq!(id.to_string(), "alice@x.com");
    }

    #[test]
    fn test_identity_serde_validates() {
        let id: Identity = serde_json::from_str("\"bob@x.com\"").unwrap();
        assert_eq!(id.as_str(), "bob@x.com");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bob@x.com\"");
    }

    #[test]
    fn test_pending_message_settle_keeps_id_and_timestamp() {
        let pending = PendingMessage::new(
            Identity::new("a@x.com").unwrap(),
            Identity::new("b@x.com").unwrap(),
            "Y2lwaGVy".to_string(),
        );
        let id = pending.id;
        let created_at = pending.created_at;

        let message = pending.settle(Origin::Local);
        assert_eq!(message.id, id);
        assert_eq!(message.created_at, created_at);
        assert_eq!(message.origin, Origin::Local);
        assert!(message.notarization.is_none());
    }

    #[test]
    fn test_origin_serialization() {
        assert_eq!(serde_json::to_string(&Origin::Remote).unwrap(), "\"remote\"");
        assert_eq!(serde_json::to_string(&Origin::Local).unwrap(), "\"local\"");
    }

    #[test]
    fn test_message_omits_missing_notarization() {
        let message = PendingMessage::new(
            Identity::new("a@x.com").unwrap(),
            Identity::new("b@x.com").unwrap(),
            "Y2lwaGVy".to_string(),
        )
        .settle(Origin::Remote);
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("notarization").is_none());
        assert_eq!(json["origin"], "remote");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_notarization_record_wire_format() {
        let message = PendingMessage::new(
            Identity::new("a@x.com").unwrap(),
            Identity::new("b@x.com").unwrap(),
            "Y2lwaGVy".to_string(),
        )
        .settle(Origin::Remote);
        let record = NotarizationRecord::sent(&message);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["messageId"], message.id.to_string());
        assert_eq!(json["status"], "sent");
        assert!(json.get("lastUpdated").is_none());
    }

    #[test]
    fn test_notarization_status_parse() {
        assert_eq!(
            "delivered".parse::<NotarizationStatus>().unwrap(),
            NotarizationStatus::Delivered
        );
        assert!("lost".parse::<NotarizationStatus>().is_err());
    }

    #[test]
    fn test_history_len() {
        let history = MessageHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
    }
}
