//! In-process ledger with the same world-state rules as the deployed contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use shield_core::{Error, Result};

use crate::contract::{LedgerContract, LedgerEntry, Query, Transaction};
use crate::gateway::LedgerGateway;

/// Owner recorded for entries written through the in-process ledger.
const MEMORY_OWNER: &str = "x509::CN=memory-ledger";

/// In-memory [`LedgerContract`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<HashMap<String, LedgerEntry>>,
    offline: AtomicBool,
    refuse_connect: AtomicBool,
    submits: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every submit and evaluate until turned off.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make `connect` fail until turned off.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Number of submit calls received, failed ones included.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Notarization("ledger peer unreachable".to_string()));
        }
        Ok(())
    }

    fn entry(key: &str, value: String) -> LedgerEntry {
        LedgerEntry {
            key: key.to_string(),
            value,
            owner: MEMORY_OWNER.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
impl LedgerContract for MemoryLedger {
    async fn submit(&self, transaction: Transaction) -> Result<()> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let mut state = self.state.lock().await;
        match transaction {
            Transaction::StoreMetadata { key, value } => {
                let entry = Self::entry(&key, value);
                state.insert(key, entry);
            }
            Transaction::UpdateMetadata { key, value } => {
                if !state.contains_key(&key) {
                    return Err(Error::Notarization(format!(
                        "the metadata {} does not exist",
                        key
                    )));
                }
                let entry = Self::entry(&key, value);
                state.insert(key, entry);
            }
            Transaction::DeleteMetadata { key } => {
                if state.remove(&key).is_none() {
                    return Err(Error::Notarization(format!(
                        "the metadata {} does not exist",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    async fn evaluate(&self, query: Query) -> Result<Option<LedgerEntry>> {
        self.check_online()?;

        let state = self.state.lock().await;
        Ok(match query {
            Query::GetMetadata { key } => state.get(&key).cloned(),
        })
    }
}

#[async_trait]
impl LedgerGateway for Arc<MemoryLedger> {
    async fn connect(&self) -> Result<Arc<dyn LedgerContract>> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(Error::Notarization("gateway refused connection".to_string()));
        }
        let contract: Arc<dyn LedgerContract> = self.clone();
        Ok(contract)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(key: &str, value: &str) -> Transaction {
        Transaction::StoreMetadata {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    async fn get(ledger: &MemoryLedger, key: &str) -> Option<LedgerEntry> {
        ledger
            .evaluate(Query::GetMetadata {
                key: key.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let ledger = MemoryLedger::new();
        ledger.submit(store("k", "one")).await.unwrap();
        ledger.submit(store("k", "two")).await.unwrap();
        assert_eq!(get(&ledger, "k").await.unwrap().value, "two");
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .submit(Transaction::UpdateMetadata {
                key: "missing".to_string(),
                value: "v".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        ledger.submit(store("k", "one")).await.unwrap();
        ledger
            .submit(Transaction::UpdateMetadata {
                key: "k".to_string(),
                value: "two".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(get(&ledger, "k").await.unwrap().value, "two");
    }

    #[tokio::test]
    async fn test_delete_requires_existing() {
        let ledger = MemoryLedger::new();
        assert!(ledger
            .submit(Transaction::DeleteMetadata {
                key: "missing".to_string()
            })
            .await
            .is_err());

        ledger.submit(store("k", "v")).await.unwrap();
        ledger
            .submit(Transaction::DeleteMetadata {
                key: "k".to_string(),
            })
            .await
            .unwrap();
        assert!(get(&ledger, "k").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let ledger = MemoryLedger::new();
        ledger.set_offline(true);
        assert!(ledger.submit(store("k", "v")).await.is_err());
        assert!(ledger
            .evaluate(Query::GetMetadata {
                key: "k".to_string()
            })
            .await
            .is_err());
        assert_eq!(ledger.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_gateway_connect() {
        let ledger = MemoryLedger::new();
        assert!(ledger.connect().await.is_ok());
        ledger.set_refuse_connect(true);
        assert!(ledger.connect().await.is_err());
    }
}
