//! # shield-ledger
//!
//! Notarization side-channel for cybershield.
//!
//! Message metadata (sender, recipient, timestamp, delivery status) is
//! recorded on a permissioned ledger as an advisory audit trail. Nothing in
//! the messaging path depends on it: a failed notarization is logged and
//! dropped.
//!
//! - [`contract`]: typed submit/evaluate capability over the deployed contract
//! - [`gateway`]: connection factories, including the HTTP bridge gateway
//! - [`memory`]: in-process ledger with the contract's world-state rules
//! - [`client`]: [`NotarizationClient`] with explicit `connect`/`disconnect`

pub mod client;
pub mod contract;
pub mod gateway;
pub mod memory;

pub use client::NotarizationClient;
pub use contract::{LedgerContract, LedgerEntry, Query, Transaction};
pub use gateway::{HttpLedgerGateway, LedgerGateway};
pub use memory::MemoryLedger;
