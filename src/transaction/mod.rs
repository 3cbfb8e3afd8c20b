//! Transaction history, withdrawals and fee quotes
//!
//! - `reconciler`: classifies decrypted ledger entries against the committed snapshot.
//! - `history`: pages, decrypts and classifies the store vault's records.
//! - `withdrawals`: groups withdrawal server records and confirms claimability on chain.
//! - `fee_quote`: picks a block builder and validates its fee.

/// Block-builder selection and fee policy
pub mod fee_quote;
/// Paged history queries
pub mod history;
/// Ledger entry classification
pub mod reconciler;
/// Type definitions for ledger entries and history records
pub mod types;
/// Withdrawal status polling and claims
pub mod withdrawals;

pub use fee_quote::{FeePolicy, FeeQuoteSelector, SelectedQuote};
pub use history::{HistoryPage, HistoryService};
pub use reconciler::classify;
pub use types::*;
pub use withdrawals::{ClaimResult, WithdrawalStatusPoller, WithdrawalsPage};

/// Largest page any history or withdrawal query may request.
pub const MAX_PAGE_LIMIT: usize = 256;
