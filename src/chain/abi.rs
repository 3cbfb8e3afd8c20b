//! Settlement contract bindings and withdrawal hashing.

use super::ChainError;
use crate::transaction::ContractWithdrawal;

use ethers::abi::{Token, encode_packed};
use ethers::prelude::*;
use ethers::utils::keccak256;

pub use self::liquidity::Withdrawal;

abigen!(
	Liquidity,
	r#"[
		struct Withdrawal { address recipient; uint32 tokenIndex; uint256 amount; bytes32 nullifier; }
		function claimableWithdrawals(bytes32 withdrawalHash) external view returns (bool)
		function claimWithdrawals(Withdrawal[] withdrawals) external
	]"#
);

pub fn parse_address(value: &str) -> Result<Address, ChainError> {
	value
		.parse::<Address>()
		.map_err(|e| ChainError::InvalidAddress(format!("{}: {}", value, e)))
}

pub fn parse_bytes32(value: &str) -> Result<H256, ChainError> {
	value
		.parse::<H256>()
		.map_err(|e| ChainError::InvalidAbi(format!("bytes32 {}: {}", value, e)))
}

/// Converts the client's withdrawal into the contract's tuple.
pub fn to_contract_tuple(withdrawal: &ContractWithdrawal) -> Result<Withdrawal, ChainError> {
	Ok(Withdrawal {
		recipient: parse_address(&withdrawal.recipient)?,
		token_index: withdrawal.token_index,
		amount: U256::from(withdrawal.amount),
		nullifier: parse_bytes32(&withdrawal.nullifier)?.0,
	})
}

/// Hash the contract keys withdrawals by:
/// `keccak256(abi.encodePacked(recipient, tokenIndex, amount, nullifier))`.
pub fn withdrawal_hash(withdrawal: &ContractWithdrawal) -> Result<[u8; 32], ChainError> {
	let tuple = to_contract_tuple(withdrawal)?;
	let packed = encode_packed(&[
		Token::Address(tuple.recipient),
		Token::FixedBytes(tuple.token_index.to_be_bytes().to_vec()),
		Token::Uint(tuple.amount),
		Token::FixedBytes(tuple.nullifier.to_vec()),
	])
	.map_err(|e| ChainError::InvalidAbi(e.to_string()))?;
	Ok(keccak256(packed))
}
