//! Typed capability over the metadata contract deployed on the ledger.
//!
//! The contract keeps one entry per key in its world state:
//!
//! | Function         | Kind     | Missing key |
//! |------------------|----------|-------------|
//! | `StoreMetadata`  | submit   | creates (overwrites if present) |
//! | `UpdateMetadata` | submit   | error |
//! | `DeleteMetadata` | submit   | error |
//! | `GetMetadata`    | evaluate | `None` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shield_core::Result;

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    StoreMetadata { key: String, value: String },
    UpdateMetadata { key: String, value: String },
    DeleteMetadata { key: String },
}

impl Transaction {
    /// Contract function name.
    pub fn function(&self) -> &'static str {
        match self {
            Transaction::StoreMetadata { .. } => "StoreMetadata",
            Transaction::UpdateMetadata { .. } => "UpdateMetadata",
            Transaction::DeleteMetadata { .. } => "DeleteMetadata",
        }
    }

    /// Positional string arguments, as the contract receives them.
    pub fn args(&self) -> Vec<String> {
        match self {
            Transaction::StoreMetadata { key, value }
            | Transaction::UpdateMetadata { key, value } => vec![key.clone(), value.clone()],
            Transaction::DeleteMetadata { key } => vec![key.clone()],
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Transaction::StoreMetadata { key, .. }
            | Transaction::UpdateMetadata { key, .. }
            | Transaction::DeleteMetadata { key } => key,
        }
    }
}

/// A read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    GetMetadata { key: String },
}

impl Query {
    pub fn function(&self) -> &'static str {
        match self {
            Query::GetMetadata { .. } => "GetMetadata",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Query::GetMetadata { key } => vec![key.clone()],
        }
    }
}

/// A world-state entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    /// Opaque payload, JSON text for notarization records.
    pub value: String,
    /// Identity of the submitting client as seen by the ledger.
    pub owner: String,
    /// Transaction timestamp assigned by the ledger.
    pub timestamp: String,
}

/// Submit and evaluate capability against one deployed contract.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    async fn submit(&self, transaction: Transaction) -> Result<()>;

    /// `None` when the contract holds no entry for the queried key.
    async fn evaluate(&self, query: Query) -> Result<Option<LedgerEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_encoding() {
        let tx = Transaction::StoreMetadata {
            key: "m1".to_string(),
            value: "{}".to_string(),
        };
        assert_eq!(tx.function(), "StoreMetadata");
        assert_eq!(tx.args(), vec!["m1".to_string(), "{}".to_string()]);
        assert_eq!(tx.key(), "m1");

        let tx = Transaction::DeleteMetadata {
            key: "m1".to_string(),
        };
        assert_eq!(tx.function(), "DeleteMetadata");
        assert_eq!(tx.args(), vec!["m1".to_string()]);
    }

    #[test]
    fn test_query_encoding() {
        let q = Query::GetMetadata {
            key: "m2".to_string(),
        };
        assert_eq!(q.function(), "GetMetadata");
        assert_eq!(q.args(), vec!["m2".to_string()]);
    }
}
