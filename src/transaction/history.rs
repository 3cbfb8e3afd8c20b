//!
//! Paged transaction history.
//!
//! Raw entries are fetched from the store vault, decrypted by the sync library and
//! classified against the committed snapshot. Entries that fail to decrypt are skipped.

use super::MAX_PAGE_LIMIT;
use super::reconciler::classify;
use super::types::*;
use super::withdrawals::WithdrawalStatusPoller;
use crate::indexer::Token;
use crate::vault::{LedgerCategory, LedgerSource};
use crate::wallet::{ClientError, Session, SyncBackend, UserData};

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// A page of classified history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
	pub transactions: Vec<Transaction>,
	pub next_cursor: Option<u64>,
	pub has_more: bool,
}

pub struct HistoryService {
	ledger: Arc<dyn LedgerSource>,
	backend: Arc<dyn SyncBackend>,
	poller: Arc<WithdrawalStatusPoller>,
}

impl HistoryService {
	pub fn new(
		ledger: Arc<dyn LedgerSource>,
		backend: Arc<dyn SyncBackend>,
		poller: Arc<WithdrawalStatusPoller>,
	) -> Self {
		Self {
			ledger,
			backend,
			poller,
		}
	}

	pub async fn fetch(
		&self,
		category: LedgerCategory,
		session: &Session,
		user_data: &UserData,
		tokens: &[Token],
		cursor: u64,
		limit: usize,
	) -> Result<HistoryPage, ClientError> {
		if limit > MAX_PAGE_LIMIT {
			return Err(ClientError::LimitExceeded {
				limit,
				max: MAX_PAGE_LIMIT,
			});
		}

		let page = self
			.ledger
			.fetch_page(category, &session.spend_pub, cursor, limit)
			.await?;

		let decrypted = join_all(
			page.entries
				.iter()
				.map(|raw| self.backend.decrypt_entry(&session.view_key, raw)),
		)
		.await;

		let entries: Vec<LedgerEntry> = page
			.entries
			.iter()
			.zip(decrypted)
			.filter_map(|(raw, result)| match result {
				Ok(entry) => Some(entry),
				Err(e) => {
					warn!("Failed to decrypt {} entry {}: {}", category.path(), raw.id, e);
					None
				}
			})
			.collect();

		let pending = match category {
			LedgerCategory::Tx => Some(self.pending_withdrawals(&session.spend_pub).await),
			_ => None,
		};

		let mut transactions: Vec<Transaction> = entries
			.iter()
			.filter_map(|entry| classify(entry, user_data, tokens, pending.as_ref()))
			.collect();
		transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

		debug!(
			"Classified {} of {} {} entries",
			transactions.len(),
			page.entries.len(),
			category.path()
		);

		Ok(HistoryPage {
			transactions,
			next_cursor: page.next_cursor,
			has_more: page.has_more,
		})
	}

	async fn pending_withdrawals(&self, pubkey: &str) -> PendingWithdrawals {
		match self.poller.fetch_all_withdrawals(pubkey).await {
			Ok(withdrawals) => withdrawals,
			Err(e) => {
				warn!("Failed to fetch withdrawals, statuses may be stale: {}", e);
				PendingWithdrawals::default()
			}
		}
	}
}
