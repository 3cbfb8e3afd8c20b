use crate::chain::ChainError;
use crate::indexer::ServiceError;
use crate::utils::u128_string;
use crate::wallet::BackendError;
use crate::wallet::sync::RetryCancelled;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Balance of one token in the account's layer-2 balance tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalance {
	pub token_index: u32,
	#[serde(with = "u128_string")]
	pub amount: u128,
	#[serde(default)]
	pub is_insufficient: bool,
}

/// Locally cached account view produced by the sync library.
///
/// An entry whose timestamp is at or below the matching watermark has been seen by the
/// sync; whether it was accepted is decided by membership in the processed set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserData {
	pub pubkey: String,
	#[serde(default)]
	pub balances: Vec<TokenBalance>,
	#[serde(default)]
	pub deposit_lpt: u64,
	#[serde(default)]
	pub transfer_lpt: u64,
	#[serde(default)]
	pub tx_lpt: u64,
	#[serde(default)]
	pub withdrawal_lpt: u64,
	#[serde(default)]
	pub processed_deposit_uuids: BTreeSet<String>,
	#[serde(default)]
	pub processed_transfer_uuids: BTreeSet<String>,
	#[serde(default)]
	pub processed_tx_uuids: BTreeSet<String>,
	#[serde(default)]
	pub processed_withdrawal_uuids: BTreeSet<String>,
}

impl UserData {
	pub fn balance_of(&self, token_index: u32) -> u128 {
		self.balances
			.iter()
			.find(|b| b.token_index == token_index)
			.map(|b| b.amount)
			.unwrap_or_default()
	}
}

/// Credentials of the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
	/// L1 address the account is bound to.
	pub address: String,
	/// View key handed to the sync library.
	pub view_key: String,
	/// Layer-2 public key used to query services.
	pub spend_pub: String,
}

impl Session {
	pub fn is_same_account(&self, address: &str) -> bool {
		self.address.eq_ignore_ascii_case(address)
	}
}

/// Error type of every public client operation
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error("Not logged in")]
	NotLoggedIn,

	#[error("No user data available, sync the account first")]
	NoUserData,

	#[error("A sync is already in progress")]
	SyncInProgress,

	#[error("A broadcast is already in progress")]
	BroadcastInProgress,

	#[error("Sync failed: {0}")]
	SyncFailed(String),

	#[error("Limit cannot be greater than {max}, got {limit}")]
	LimitExceeded { limit: usize, max: usize },

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Invalid amount: {0}")]
	InvalidAmount(String),

	#[error("Unknown token index {0}")]
	UnknownToken(u32),

	#[error("Failed to quote transfer fee")]
	QuoteFailed,

	#[error("Balance sync conflict: the account state changed on another device, sync and retry")]
	BalanceSyncConflict,

	#[error("The previous transfer is still being processed")]
	PendingTransaction,

	#[error("{0} is unavailable")]
	ServiceUnavailable(String),

	#[error("No withdrawals to claim")]
	NoWithdrawalsToClaim,

	#[error("Transaction rejected: {0}")]
	ClaimRejected(String),

	#[error(transparent)]
	RetryCancelled(#[from] RetryCancelled),

	#[error("Sync library error: {0}")]
	Backend(BackendError),

	#[error("Service error: {0}")]
	Service(#[from] ServiceError),

	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl From<BackendError> for ClientError {
	fn from(error: BackendError) -> Self {
		let message = error.message();
		if message.contains("prev_digest mismatch with stored digest") {
			ClientError::BalanceSyncConflict
		} else if message.contains("Pending tx error: pending tx") {
			ClientError::PendingTransaction
		} else if message.contains("Bad Gateway") && message.contains("validity-prover/") {
			ClientError::ServiceUnavailable("Validity Prover".to_string())
		} else if message.contains("Bad Gateway") && message.contains("store-vault-server/") {
			ClientError::ServiceUnavailable("Store Vault".to_string())
		} else {
			ClientError::Backend(error)
		}
	}
}
