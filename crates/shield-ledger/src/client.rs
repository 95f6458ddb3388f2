//! Notarization client.
//!
//! Records message metadata on the ledger. The client is constructed
//! explicitly and holds its own connection; nothing is shared through
//! globals. Every call is a single attempt: notarization is advisory and
//! callers log and drop its failures.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shield_core::{Error, NotarizationRecord, NotarizationStatus, Result};

use crate::contract::{LedgerContract, Query, Transaction};
use crate::gateway::LedgerGateway;

/// Client for message notarization records.
pub struct NotarizationClient {
    gateway: Arc<dyn LedgerGateway>,
    contract: RwLock<Option<Arc<dyn LedgerContract>>>,
}

impl NotarizationClient {
    /// Create a disconnected client.
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self {
            gateway,
            contract: RwLock::new(None),
        }
    }

    /// Open the gateway connection. Reconnecting replaces the old handle.
    pub async fn connect(&self) -> Result<()> {
        let contract = self.gateway.connect().await?;
        *self.contract.write().await = Some(contract);
        info!(
            subsystem = "ledger",
            component = "notarization",
            op = "connect",
            gateway = %self.gateway.describe(),
            "Notarization client connected"
        );
        Ok(())
    }

    /// Drop the connection. Subsequent calls fail with `NotConnected`.
    pub async fn disconnect(&self) {
        if self.contract.write().await.take().is_some() {
            info!(
                subsystem = "ledger",
                component = "notarization",
                op = "disconnect",
                "Notarization client disconnected"
            );
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.contract.read().await.is_some()
    }

    async fn contract(&self) -> Result<Arc<dyn LedgerContract>> {
        self.contract
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotConnected("notarization client".to_string()))
    }

    /// Write (or overwrite) the record for a message.
    pub async fn store(&self, record: &NotarizationRecord) -> Result<()> {
        let start = Instant::now();
        let contract = self.contract().await?;
        let value = serde_json::to_string(record)?;

        contract
            .submit(Transaction::StoreMetadata {
                key: record.message_id.to_string(),
                value,
            })
            .await?;

        debug!(
            subsystem = "ledger",
            op = "store",
            message_id = %record.message_id,
            status = record.status.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Notarization record stored"
        );
        Ok(())
    }

    /// Read the record for a message. `None` when the ledger has none.
    pub async fn get(&self, message_id: Uuid) -> Result<Option<NotarizationRecord>> {
        let contract = self.contract().await?;
        let entry = contract
            .evaluate(Query::GetMetadata {
                key: message_id.to_string(),
            })
            .await?;

        match entry {
            Some(entry) => {
                let record: NotarizationRecord =
                    serde_json::from_str(&entry.value).map_err(|e| {
                        Error::Notarization(format!(
                            "record for {} is not a notarization record: {}",
                            message_id, e
                        ))
                    })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Change the status of an existing record and stamp `last_updated`.
    ///
    /// Fails when the ledger holds no record for the message.
    pub async fn update_status(
        &self,
        message_id: Uuid,
        status: NotarizationStatus,
    ) -> Result<NotarizationRecord> {
        let mut record = self.get(message_id).await?.ok_or_else(|| {
            Error::Notarization(format!("no notarization record for {}", message_id))
        })?;
        record.status = status;
        record.last_updated = Some(Utc::now());

        let contract = self.contract().await?;
        contract
            .submit(Transaction::UpdateMetadata {
                key: message_id.to_string(),
                value: serde_json::to_string(&record)?,
            })
            .await?;

        debug!(
            subsystem = "ledger",
            op = "update_status",
            message_id = %message_id,
            status = status.as_str(),
            "Notarization status updated"
        );
        Ok(record)
    }

    /// Remove the record for a message. Fails when none exists.
    pub async fn delete(&self, message_id: Uuid) -> Result<()> {
        let contract = self.contract().await?;
        contract
            .submit(Transaction::DeleteMetadata {
                key: message_id.to_string(),
            })
            .await?;
        debug!(
            subsystem = "ledger",
            op = "delete",
            message_id = %message_id,
            "Notarization record deleted"
        );
        Ok(())
    }
}
