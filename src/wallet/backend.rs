//!
//! Contract of the client-side sync library.
//!
//! The library owns proof verification, key handling and the encrypted balance state.
//! The client only drives it: sync the account, sync withdrawals, read the resulting
//! `UserData`, decrypt ledger entries, quote fees and submit transfers.

use super::types::UserData;
use crate::indexer::FeeQuote;
use crate::transaction::LedgerEntry;
use crate::utils::u128_string;
use crate::vault::RawLedgerEntry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A failure reported by the sync library. Only the message is stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
	message: String,
}

impl BackendError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	/// The library traps with "unreachable" when its local state cannot be advanced
	/// and needs a resync.
	pub fn is_unreachable(&self) -> bool {
		self.message.contains("unreachable")
	}
}

/// One transfer of an outgoing transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
	pub recipient: String,
	pub token_index: u32,
	#[serde(with = "u128_string")]
	pub amount: u128,
}

/// Result of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxResult {
	pub tx_tree_root: String,
	#[serde(default)]
	pub transfer_digests: Vec<String>,
}

/// Status of a submitted transaction as seen by the validity prover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
	NotFound,
	Pending,
	Success,
	Failed,
}

impl TxStatus {
	pub fn is_final(&self) -> bool {
		matches!(self, TxStatus::Success | TxStatus::Failed)
	}
}

/// Trait for the sync library
#[async_trait]
pub trait SyncBackend: Send + Sync {
	/// Advance the account's balance state to the latest block.
	async fn sync(&self, view_key: &str) -> Result<(), BackendError>;

	/// Advance the withdrawal state, starting from `claim_index`.
	async fn sync_withdrawals(&self, view_key: &str, claim_index: u32) -> Result<(), BackendError>;

	/// Rebuild local state, from genesis when `full_rescan` is set.
	async fn resync(&self, view_key: &str, full_rescan: bool) -> Result<(), BackendError>;

	async fn get_user_data(&self, view_key: &str) -> Result<UserData, BackendError>;

	async fn decrypt_entry(
		&self,
		view_key: &str,
		entry: &RawLedgerEntry,
	) -> Result<LedgerEntry, BackendError>;

	async fn quote_transfer_fee(
		&self,
		builder_url: &str,
		spend_pub: &str,
		fee_token_index: u32,
	) -> Result<FeeQuote, BackendError>;

	/// Send the transfers to a block builder and finalize the proposal it returns.
	async fn send_tx_request(
		&self,
		builder_url: &str,
		view_key: &str,
		transfers: &[TransferRequest],
		fee: &FeeQuote,
	) -> Result<TxResult, BackendError>;

	async fn get_tx_status(&self, spend_pub: &str, tx_tree_root: &str)
	-> Result<TxStatus, BackendError>;
}
