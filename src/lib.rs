//! Client-side sync and reconciliation for a privacy layer-2 account.
//!
//! The crate keeps a cached view of the account in step with the network, derives a
//! user-facing transaction history from encrypted ledger records, tracks withdrawals
//! through their L1 lifecycle and picks a block builder for outgoing transfers.

/// L1 settlement contract access
pub mod chain;
/// Public client facade
pub mod client;
/// Client configuration
pub mod config;
/// Indexer and token list integration
pub mod indexer;
/// History, withdrawals and fee quotes
pub mod transaction;
/// Utility functions
pub mod utils;
/// Store vault and withdrawal server integration
pub mod vault;
/// Sync library contract and account sync
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{AccountBalance, AccountClient, BroadcastRequest, BroadcastResult, Collaborators};
pub use config::{ClientConfig, Environment, ServiceUrls};
pub use wallet::{ClientError, Session};
