//!
//! Ethereum client for the liquidity contract.
//!
//! Claimability checks are aggregated through Multicall3 so every pending withdrawal is
//! read in a single `eth_call`. Claims are signed locally by a `LocalWallet` and sent as
//! raw transactions, so the RPC node never needs to hold the claimer's key.

use super::abi::{Liquidity, parse_address, parse_bytes32, to_contract_tuple};
use super::{ChainError, Receipt, SettlementContract};
use crate::transaction::ContractWithdrawal;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::contract::{MULTICALL_ADDRESS, Multicall};
use ethers::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Settlement contract client over an HTTP provider
#[derive(Clone)]
pub struct EthersSettlementClient {
	provider: Arc<Provider<Http>>,
	contract: Liquidity<Provider<Http>>,
	signer: Option<Liquidity<SignerClient>>,
}

impl EthersSettlementClient {
	/// Read-only client. Claims fail with `ChainError::SignerMissing`.
	pub fn new(rpc_url: &str, contract_address: &str) -> Result<Self, ChainError> {
		let provider = Provider::<Http>::try_from(rpc_url)
			.map_err(|e| ChainError::Transport(format!("invalid rpc url {}: {}", rpc_url, e)))?;
		let provider = Arc::new(provider);

		let address = parse_address(contract_address)?;
		if address == Address::zero() {
			return Err(ChainError::InvalidAddress(
				"liquidity contract address is zero".to_string(),
			));
		}

		Ok(Self {
			contract: Liquidity::new(address, provider.clone()),
			provider,
			signer: None,
		})
	}

	/// Attaches the wallet that signs `claimWithdrawals` transactions.
	pub fn with_signer(mut self, private_key: &str, chain_id: u64) -> Result<Self, ChainError> {
		let wallet = private_key.parse::<LocalWallet>()?.with_chain_id(chain_id);
		info!("Claims will be signed by {:#x}", wallet.address());

		let client = Arc::new(SignerMiddleware::new((*self.provider).clone(), wallet));
		self.signer = Some(Liquidity::new(self.contract.address(), client));
		Ok(self)
	}

	/// Address that signs claims, if a wallet is attached.
	pub fn signer_address(&self) -> Option<Address> {
		self.signer.as_ref().map(|c| c.client().address())
	}
}

fn decode_claimable(result: Result<Token, Bytes>) -> Result<bool, String> {
	match result {
		Ok(Token::Bool(claimable)) => Ok(claimable),
		Ok(other) => Err(format!("unexpected return value {:?}", other)),
		Err(revert) => Err(format!("call reverted: {}", revert)),
	}
}

#[async_trait]
impl SettlementContract for EthersSettlementClient {
	async fn claimable_withdrawals(
		&self,
		hashes: &[[u8; 32]],
	) -> Result<Vec<Result<bool, String>>, ChainError> {
		if hashes.is_empty() {
			return Ok(Vec::new());
		}

		let mut multicall =
			Multicall::<Provider<Http>>::new(self.provider.clone(), Some(MULTICALL_ADDRESS))
				.await
				.map_err(|e| ChainError::Multicall(e.to_string()))?;
		for hash in hashes {
			multicall.add_call(self.contract.claimable_withdrawals(*hash), true);
		}

		debug!("Aggregating {} claimableWithdrawals reads", hashes.len());
		let results = multicall
			.call_raw()
			.await
			.map_err(|e| ChainError::Multicall(e.to_string()))?;
		Ok(results.into_iter().map(decode_claimable).collect())
	}

	async fn claim_withdrawals(
		&self,
		from: &str,
		withdrawals: &[ContractWithdrawal],
	) -> Result<String, ChainError> {
		let contract = self.signer.as_ref().ok_or(ChainError::SignerMissing)?;
		let signer = contract.client().address();
		if signer != parse_address(from)? {
			return Err(ChainError::SignerMismatch {
				signer: format!("{:#x}", signer),
				from: from.to_string(),
			});
		}

		let tuples = withdrawals
			.iter()
			.map(to_contract_tuple)
			.collect::<Result<Vec<_>, _>>()?;
		let call = contract.claim_withdrawals(tuples);
		let pending = call
			.send()
			.await
			.map_err(|e| ChainError::Contract(e.to_string()))?;
		let tx_hash = format!("{:#x}", pending.tx_hash());
		info!("Sent claimWithdrawals for {} withdrawals: {}", withdrawals.len(), tx_hash);
		Ok(tx_hash)
	}

	async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
		let hash = parse_bytes32(tx_hash)?;
		let receipt = self.provider.get_transaction_receipt(hash).await?;
		Ok(receipt.map(|receipt| Receipt {
			transaction_hash: format!("{:#x}", receipt.transaction_hash),
			success: receipt.status == Some(U64::one()),
			block_number: receipt.block_number.map(|n| n.as_u64()),
		}))
	}
}
