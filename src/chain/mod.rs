//! L1 settlement contract integration
//!
//! The client reads claimability of finished withdrawals, submits claims and polls
//! transaction receipts. Everything goes through the `SettlementContract` seam so the
//! poller can be driven by any chain backend.

/// Contract bindings and withdrawal hashing
pub mod abi;
/// ethers implementation of the settlement contract
mod liquidity;

pub use liquidity::EthersSettlementClient;

use crate::transaction::ContractWithdrawal;

use async_trait::async_trait;
use ethers::providers::ProviderError;
use ethers::signers::WalletError;

/// Outcome of a mined L1 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	pub transaction_hash: String,
	pub success: bool,
	pub block_number: Option<u64>,
}

/// Operations the client needs from the settlement contract and its chain.
#[async_trait]
pub trait SettlementContract: Send + Sync {
	/// Batched `claimableWithdrawals(hash)` read. Each position carries its own result.
	async fn claimable_withdrawals(
		&self,
		hashes: &[[u8; 32]],
	) -> Result<Vec<Result<bool, String>>, ChainError>;

	/// Submits `claimWithdrawals` from `from` and returns the transaction hash.
	async fn claim_withdrawals(
		&self,
		from: &str,
		withdrawals: &[ContractWithdrawal],
	) -> Result<String, ChainError>;

	/// `None` while the transaction is not mined.
	async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError>;
}

/// Error types for chain access
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),

	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),

	#[error("Transport error: {0}")]
	Transport(String),

	#[error("Contract call failed: {0}")]
	Contract(String),

	#[error("Multicall failed: {0}")]
	Multicall(String),

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("ABI error: {0}")]
	InvalidAbi(String),

	#[error("No signing key configured for claims")]
	SignerMissing,

	#[error("Claim signer {signer} does not match account {from}")]
	SignerMismatch { signer: String, from: String },

	#[error("Transaction receipt with hash {0} not found")]
	ReceiptNotFound(String),
}
