//! Store vault and withdrawal server integration
//!
//! Raw, encrypted ledger records are paged out of the store vault per category, and
//! withdrawal lifecycle records out of the withdrawal server.

mod client;
mod types;

pub use client::{LedgerSource, StoreVaultClient};
pub use types::*;
