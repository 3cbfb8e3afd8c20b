//!
//! Withdrawal status polling and L1 claims.
//!
//! The withdrawal server reports every withdrawal the account has requested. Entries it
//! marks `need_claim` are only trusted once the settlement contract confirms they are
//! claimable; everything else is taken as reported.

use super::MAX_PAGE_LIMIT;
use super::types::*;
use crate::chain::{ChainError, SettlementContract, abi};
use crate::vault::LedgerSource;
use crate::wallet::ClientError;

use backoff::backoff::Constant;
use backoff::future::retry_notify;
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One page of the account's withdrawals, grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalsPage {
	pub withdrawals: PendingWithdrawals,
	pub next_cursor: Option<u64>,
	pub has_more: bool,
}

/// A submitted claim and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResult {
	pub tx_hash: String,
	pub status: TransactionStatus,
}

pub struct WithdrawalStatusPoller {
	ledger: Arc<dyn LedgerSource>,
	contract: Arc<dyn SettlementContract>,
	deposit_poll_interval: Duration,
	claim_poll_interval: Duration,
}

impl WithdrawalStatusPoller {
	pub fn new(
		ledger: Arc<dyn LedgerSource>,
		contract: Arc<dyn SettlementContract>,
		deposit_poll_interval: Duration,
		claim_poll_interval: Duration,
	) -> Self {
		Self {
			ledger,
			contract,
			deposit_poll_interval,
			claim_poll_interval,
		}
	}

	/// Fetch the account's withdrawals and confirm `need_claim` entries on chain.
	pub async fn fetch_withdrawals(
		&self,
		pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<WithdrawalsPage, ClientError> {
		if limit > MAX_PAGE_LIMIT {
			return Err(ClientError::LimitExceeded {
				limit,
				max: MAX_PAGE_LIMIT,
			});
		}

		let page = self.ledger.fetch_withdrawal_info(pubkey, cursor, limit).await?;

		let mut withdrawals = PendingWithdrawals::default();
		for info in page.items {
			withdrawals
				.bucket_mut(info.status)
				.push(info.contract_withdrawal);
		}
		self.confirm_need_claim(&mut withdrawals).await;

		Ok(WithdrawalsPage {
			withdrawals,
			next_cursor: page.next_cursor,
			has_more: page.has_more,
		})
	}

	/// Walk every page of the account's withdrawals, then confirm `need_claim` entries on
	/// chain in one read.
	pub async fn fetch_all_withdrawals(
		&self,
		pubkey: &str,
	) -> Result<PendingWithdrawals, ClientError> {
		let mut withdrawals = PendingWithdrawals::default();
		let mut cursor = 0;
		let mut pages = 0;
		loop {
			let page = self
				.ledger
				.fetch_withdrawal_info(pubkey, cursor, MAX_PAGE_LIMIT)
				.await?;
			pages += 1;
			for info in page.items {
				withdrawals
					.bucket_mut(info.status)
					.push(info.contract_withdrawal);
			}

			match page.next_cursor {
				Some(next) if page.has_more && next > cursor => cursor = next,
				Some(next) if page.has_more => {
					warn!(
						"Withdrawal cursor did not advance past {}, stopping at {}",
						cursor, next
					);
					break;
				}
				_ => break,
			}
		}

		debug!("Read {} withdrawal pages", pages);
		self.confirm_need_claim(&mut withdrawals).await;
		Ok(withdrawals)
	}

	async fn confirm_need_claim(&self, withdrawals: &mut PendingWithdrawals) {
		let candidates = std::mem::take(&mut withdrawals.need_claim);
		withdrawals.need_claim = self.reconcile_claimable(candidates).await;
		debug!(
			"Fetched {} withdrawals, {} claimable",
			withdrawals.len(),
			withdrawals.need_claim.len()
		);
	}

	/// Keep the candidates the contract reports as claimable.
	///
	/// Duplicates by nullifier collapse to the latest report. The contract is read once for
	/// the whole set; a failed or incomplete read yields no claimable entries.
	pub async fn reconcile_claimable(
		&self,
		candidates: Vec<ContractWithdrawal>,
	) -> Vec<ContractWithdrawal> {
		let mut latest: Vec<ContractWithdrawal> = candidates
			.into_iter()
			.rev()
			.unique_by(|w| w.nullifier.to_lowercase())
			.collect();
		latest.reverse();

		let mut unique = Vec::new();
		let mut hashes = Vec::new();
		for withdrawal in latest {
			match abi::withdrawal_hash(&withdrawal) {
				Ok(hash) => {
					hashes.push(hash);
					unique.push(withdrawal);
				}
				Err(e) => warn!("Skipping withdrawal {}: {}", withdrawal.nullifier, e),
			}
		}

		if unique.is_empty() {
			return unique;
		}

		let results = match self.contract.claimable_withdrawals(&hashes).await {
			Ok(results) => results,
			Err(e) => {
				warn!("Failed to read claimable withdrawals: {}", e);
				return Vec::new();
			}
		};
		if results.len() != unique.len() {
			warn!(
				"Claimable read returned {} results for {} withdrawals, ignoring it",
				results.len(),
				unique.len()
			);
			return Vec::new();
		}

		unique
			.into_iter()
			.zip(results)
			.filter_map(|(withdrawal, result)| match result {
				Ok(true) => Some(withdrawal),
				Ok(false) => None,
				Err(e) => {
					debug!("Claimable check failed for {}: {}", withdrawal.nullifier, e);
					None
				}
			})
			.collect()
	}

	/// Poll the receipt of `tx_hash` every `interval` until it is mined.
	pub async fn wait_for_receipt(
		&self,
		tx_hash: &str,
		interval: Duration,
	) -> Result<TransactionStatus, ChainError> {
		let contract = &self.contract;
		let receipt = retry_notify(
			Constant::new(interval),
			move || async move {
				match contract.get_transaction_receipt(tx_hash).await {
					Ok(Some(receipt)) => Ok(receipt),
					Ok(None) => Err(backoff::Error::transient(ChainError::ReceiptNotFound(
						tx_hash.to_string(),
					))),
					Err(e) => Err(backoff::Error::transient(e)),
				}
			},
			|e: ChainError, _: Duration| match e {
				ChainError::ReceiptNotFound(_) => {}
				e => warn!("Error while waiting for {}: {}", tx_hash, e),
			},
		)
		.await?;

		Ok(if receipt.success {
			TransactionStatus::Completed
		} else {
			TransactionStatus::Rejected
		})
	}

	pub async fn wait_for_deposit(&self, tx_hash: &str) -> Result<TransactionStatus, ChainError> {
		self.wait_for_receipt(tx_hash, self.deposit_poll_interval).await
	}

	/// Claim the given withdrawals for `account` and wait for the L1 transaction.
	///
	/// Withdrawals addressed to other recipients are ignored.
	pub async fn claim(
		&self,
		account: &str,
		withdrawals: &[ContractWithdrawal],
	) -> Result<ClaimResult, ClientError> {
		let mine: Vec<ContractWithdrawal> = withdrawals
			.iter()
			.filter(|w| w.recipient.eq_ignore_ascii_case(account))
			.cloned()
			.collect();
		if mine.is_empty() {
			return Err(ClientError::NoWithdrawalsToClaim);
		}

		info!("Claiming {} withdrawals for {}", mine.len(), account);
		let tx_hash = self.contract.claim_withdrawals(account, &mine).await?;
		let status = self
			.wait_for_receipt(&tx_hash, self.claim_poll_interval)
			.await?;

		if status == TransactionStatus::Rejected {
			return Err(ClientError::ClaimRejected(tx_hash));
		}
		Ok(ClaimResult { tx_hash, status })
	}
}
