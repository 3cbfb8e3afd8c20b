//!
//! HTTP client for the store vault and the withdrawal server.
//!
//! Both services page records by a timestamp cursor and are queried with the account's
//! layer-2 public key. Encrypted payloads are returned untouched; decryption happens in
//! the sync library.

use super::types::*;
use crate::indexer::ServiceError;
use crate::utils::http::{build_http_client, read_json};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Paginated access to the account's ledger records.
#[async_trait]
pub trait LedgerSource: Send + Sync {
	/// Fetch raw entries of one category with a timestamp after `cursor`.
	async fn fetch_page(
		&self,
		category: LedgerCategory,
		pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<LedgerPage, ServiceError>;

	/// Fetch withdrawals known to the withdrawal server.
	async fn fetch_withdrawal_info(
		&self,
		pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<WithdrawalInfoPage, ServiceError>;
}

/// Store vault and withdrawal server client
#[derive(Clone)]
pub struct StoreVaultClient {
	http_client: Client,
	store_vault_url: String,
	withdrawal_server_url: String,
}

impl StoreVaultClient {
	pub fn new(
		store_vault_url: String,
		withdrawal_server_url: String,
		timeout: Duration,
	) -> Result<Self, ServiceError> {
		Ok(Self {
			http_client: build_http_client(timeout)?,
			store_vault_url: store_vault_url.trim_end_matches('/').to_string(),
			withdrawal_server_url: withdrawal_server_url.trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl LedgerSource for StoreVaultClient {
	async fn fetch_page(
		&self,
		category: LedgerCategory,
		pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<LedgerPage, ServiceError> {
		let url = format!("{}/{}/get-all-after", self.store_vault_url, category.path());
		debug!("Fetching {} entries after {}", category.path(), cursor);

		let response = self
			.http_client
			.get(&url)
			.query(&[
				("timestamp", cursor.to_string()),
				("pubkey", pubkey.to_string()),
				("limit", limit.to_string()),
			])
			.send()
			.await?;

		let mut page: LedgerPage = read_json(response).await?;
		for entry in page.entries.iter_mut() {
			entry.category = category;
		}
		Ok(page)
	}

	async fn fetch_withdrawal_info(
		&self,
		pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<WithdrawalInfoPage, ServiceError> {
		let url = format!("{}/get-withdrawal-info", self.withdrawal_server_url);

		let response = self
			.http_client
			.get(&url)
			.query(&[
				("pubkey", pubkey.to_string()),
				("cursor", cursor.to_string()),
				("limit", limit.to_string()),
			])
			.send()
			.await?;

		let page: WithdrawalInfoPage = read_json(response).await?;
		debug!("Withdrawal server returned {} entries", page.items.len());
		Ok(page)
	}
}
