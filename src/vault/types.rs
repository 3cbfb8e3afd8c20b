use crate::transaction::{ContractWithdrawal, WithdrawalStatus};

use serde::{Deserialize, Serialize};

/// Store-vault topic a raw entry was fetched from.
///
/// `Transfer` entries decrypt to receives. `Tx` entries decrypt to sends or
/// withdrawals depending on their recipients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LedgerCategory {
	Deposit,
	Transfer,
	Tx,
}

impl LedgerCategory {
	pub fn path(&self) -> &'static str {
		match self {
			LedgerCategory::Deposit => "deposit",
			LedgerCategory::Transfer => "transfer",
			LedgerCategory::Tx => "tx",
		}
	}
}

/// An encrypted entry as stored by the store vault. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLedgerEntry {
	#[serde(alias = "uuid")]
	pub id: String,
	pub timestamp: u64,
	#[serde(alias = "data")]
	pub encrypted_payload: String,
	#[serde(default = "default_category")]
	pub category: LedgerCategory,
}

fn default_category() -> LedgerCategory {
	LedgerCategory::Tx
}

/// A page of raw entries after a timestamp cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPage {
	#[serde(default)]
	pub entries: Vec<RawLedgerEntry>,
	#[serde(default)]
	pub next_cursor: Option<u64>,
	#[serde(default)]
	pub has_more: bool,
}

/// A withdrawal as reported by the withdrawal server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalInfo {
	pub status: WithdrawalStatus,
	pub contract_withdrawal: ContractWithdrawal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalInfoPage {
	#[serde(default, alias = "withdrawalInfo")]
	pub items: Vec<WithdrawalInfo>,
	#[serde(default)]
	pub next_cursor: Option<u64>,
	#[serde(default)]
	pub has_more: bool,
}
