//! Domain types for ledger entries, derived transactions and withdrawals.

use crate::indexer::TokenType;
use crate::utils::u128_string;

use serde::{Deserialize, Serialize};

/// User-facing status of a derived transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Processing,
    Completed,
    Rejected,
    ReadyToClaim,
    NeedToClaim,
}

/// User-facing kind of a derived transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// A native deposit of one of the fixed mining amounts.
    Mining,
    Deposit,
    Withdraw,
    Send,
    Receive,
}

/// One transfer inside a send or withdrawal, after zero-amount transfers are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub recipient: String,
    pub token_index: u32,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub salt: String,
    /// Set when the recipient is an L1 address rather than a layer-2 public key.
    pub is_withdrawal: bool,
    pub nullifier: Option<String>,
}

/// A classified history record. Derived on demand and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub from: String,
    pub to: String,
    pub token_index: u32,
    pub token_type: Option<TokenType>,
    pub token_address: Option<String>,
    pub timestamp: u64,
    pub status: TransactionStatus,
    pub tx_type: TransactionType,
    pub transfers: Vec<Transfer>,
}

/// Recipient of a transfer: a layer-2 public key or an L1 address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenericAddress {
    pub is_pubkey: bool,
    pub data: String,
}

/// Decrypted deposit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositPayload {
    pub depositor: String,
    pub pubkey_salt_hash: String,
    pub token_address: String,
    #[serde(with = "u128_string")]
    pub amount: u128,
}

/// Decrypted incoming transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferPayload {
    pub sender: String,
    pub recipient: GenericAddress,
    pub token_index: u32,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub salt: String,
}

/// One transfer as carried by an outgoing transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxTransfer {
    pub recipient: GenericAddress,
    pub token_index: u32,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub salt: String,
    #[serde(default)]
    pub nullifier: Option<String>,
}

/// Decrypted outgoing transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxPayload {
    pub tx_tree_root: Option<String>,
    pub transfers: Vec<TxTransfer>,
}

impl TxPayload {
    /// True when any non-empty transfer leaves layer 2.
    pub fn has_withdrawal(&self) -> bool {
        self.transfers
            .iter()
            .any(|t| t.amount != 0 && !t.recipient.is_pubkey)
    }
}

/// Decrypted payload, one variant per ledger category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "category", content = "data", rename_all = "lowercase")]
pub enum LedgerPayload {
    Deposit(DepositPayload),
    Receive(TransferPayload),
    Send(TxPayload),
    Withdraw(TxPayload),
}

/// A decrypted ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: String,
    pub timestamp: u64,
    pub payload: LedgerPayload,
}

impl LedgerEntry {
    /// Builds an outgoing entry, tagged `Withdraw` when any transfer leaves layer 2.
    pub fn outgoing(id: impl Into<String>, timestamp: u64, payload: TxPayload) -> Self {
        let payload = if payload.has_withdrawal() {
            LedgerPayload::Withdraw(payload)
        } else {
            LedgerPayload::Send(payload)
        };
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }
}

/// Withdrawal as submitted to the settlement contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractWithdrawal {
    pub recipient: String,
    pub token_index: u32,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub nullifier: String,
}

/// Lifecycle bucket of a withdrawal on the withdrawal server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Requested,
    Relayed,
    Success,
    NeedClaim,
    Failed,
}

/// Withdrawals grouped by status.
///
/// `need_claim` only holds entries confirmed claimable on chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingWithdrawals {
    pub requested: Vec<ContractWithdrawal>,
    pub relayed: Vec<ContractWithdrawal>,
    pub success: Vec<ContractWithdrawal>,
    pub need_claim: Vec<ContractWithdrawal>,
    pub failed: Vec<ContractWithdrawal>,
}

impl PendingWithdrawals {
    pub fn bucket_mut(&mut self, status: WithdrawalStatus) -> &mut Vec<ContractWithdrawal> {
        match status {
            WithdrawalStatus::Requested => &mut self.requested,
            WithdrawalStatus::Relayed => &mut self.relayed,
            WithdrawalStatus::Success => &mut self.success,
            WithdrawalStatus::NeedClaim => &mut self.need_claim,
            WithdrawalStatus::Failed => &mut self.failed,
        }
    }

    /// Bucket holding the given nullifier, compared case-insensitively.
    pub fn status_of(&self, nullifier: &str) -> Option<WithdrawalStatus> {
        let contains = |bucket: &[ContractWithdrawal]| {
            bucket
                .iter()
                .any(|w| w.nullifier.eq_ignore_ascii_case(nullifier))
        };

        [
            (WithdrawalStatus::Failed, &self.failed),
            (WithdrawalStatus::Success, &self.success),
            (WithdrawalStatus::NeedClaim, &self.need_claim),
            (WithdrawalStatus::Relayed, &self.relayed),
            (WithdrawalStatus::Requested, &self.requested),
        ]
        .into_iter()
        .find(|(_, bucket)| contains(bucket))
        .map(|(status, _)| status)
    }

    pub fn len(&self) -> usize {
        self.requested.len()
            + self.relayed.len()
            + self.success.len()
            + self.need_claim.len()
            + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
