//!
//! Remote sync service integration.
//!
//! Drives a sync library instance hosted as a local sidecar process. Every operation is a
//! JSON `POST` to `{url}/{operation}`; failures come back as non-2xx responses whose body
//! carries the library's error message, which is preserved verbatim so callers can
//! classify it.

use super::backend::*;
use super::types::UserData;
use crate::indexer::{Envelope, FeeQuote};
use crate::transaction::LedgerEntry;
use crate::vault::RawLedgerEntry;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Client for a sync library hosted behind HTTP
pub struct RemoteSyncService {
	http_client: Client,
	url: String,
}

impl RemoteSyncService {
	pub fn new(url: String, timeout: Duration) -> Result<Self, BackendError> {
		let http_client = Client::builder()
			.timeout(timeout)
			.pool_idle_timeout(None)
			.build()
			.map_err(|e| BackendError::new(format!("Failed to build sync service client: {}", e)))?;

		Ok(Self {
			http_client,
			url: url.trim_end_matches('/').to_string(),
		})
	}

	async fn post<B: Serialize + Sync, T: DeserializeOwned>(
		&self,
		operation: &str,
		body: &B,
	) -> Result<T, BackendError> {
		let url = format!("{}/{}", self.url, operation);
		debug!("Calling sync service {}", operation);

		let response = self
			.http_client
			.post(&url)
			.json(body)
			.send()
			.await
			.map_err(|e| BackendError::new(format!("Sync service send error: {}", e)))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| BackendError::new(format!("Sync service read error: {}", e)))?;

		if !status.is_success() {
			let message = serde_json::from_str::<Value>(&text)
				.ok()
				.and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
				.unwrap_or(text);
			return Err(BackendError::new(message));
		}

		let text = if text.trim().is_empty() { "null" } else { text.as_str() };
		serde_json::from_str::<Envelope<T>>(text)
			.map(Envelope::into_inner)
			.map_err(|e| BackendError::new(format!("Invalid sync service response: {}", e)))
	}
}

#[async_trait]
impl SyncBackend for RemoteSyncService {
	async fn sync(&self, view_key: &str) -> Result<(), BackendError> {
		let _: Value = self.post("sync", &json!({ "view_key": view_key })).await?;
		Ok(())
	}

	async fn sync_withdrawals(&self, view_key: &str, claim_index: u32) -> Result<(), BackendError> {
		let _: Value = self
			.post(
				"sync-withdrawals",
				&json!({ "view_key": view_key, "claim_index": claim_index }),
			)
			.await?;
		Ok(())
	}

	async fn resync(&self, view_key: &str, full_rescan: bool) -> Result<(), BackendError> {
		let _: Value = self
			.post(
				"resync",
				&json!({ "view_key": view_key, "full_rescan": full_rescan }),
			)
			.await?;
		Ok(())
	}

	async fn get_user_data(&self, view_key: &str) -> Result<UserData, BackendError> {
		self.post("user-data", &json!({ "view_key": view_key }))
			.await
	}

	async fn decrypt_entry(
		&self,
		view_key: &str,
		entry: &RawLedgerEntry,
	) -> Result<LedgerEntry, BackendError> {
		self.post("decrypt", &json!({ "view_key": view_key, "entry": entry }))
			.await
	}

	async fn quote_transfer_fee(
		&self,
		builder_url: &str,
		spend_pub: &str,
		fee_token_index: u32,
	) -> Result<FeeQuote, BackendError> {
		self.post(
			"quote-transfer-fee",
			&json!({
				"block_builder_url": builder_url,
				"pubkey": spend_pub,
				"fee_token_index": fee_token_index,
			}),
		)
		.await
	}

	async fn send_tx_request(
		&self,
		builder_url: &str,
		view_key: &str,
		transfers: &[TransferRequest],
		fee: &FeeQuote,
	) -> Result<TxResult, BackendError> {
		self.post(
			"send-tx",
			&json!({
				"block_builder_url": builder_url,
				"view_key": view_key,
				"transfers": transfers,
				"fee_quote": fee,
			}),
		)
		.await
	}

	async fn get_tx_status(
		&self,
		spend_pub: &str,
		tx_tree_root: &str,
	) -> Result<TxStatus, BackendError> {
		self.post(
			"tx-status",
			&json!({ "pubkey": spend_pub, "tx_tree_root": tx_tree_root }),
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::ClientError;

	use wiremock::matchers::{body_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn service(server: &MockServer) -> RemoteSyncService {
		RemoteSyncService::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
	}

	#[tokio::test]
	async fn test_sync_accepts_empty_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/sync"))
			.and(body_json(json!({"view_key": "0xview"})))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		service(&server).sync("0xview").await.unwrap();
	}

	#[tokio::test]
	async fn test_user_data_unwraps_envelope() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/user-data"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": {
					"pubkey": "0x01",
					"balances": [{"token_index": 0, "amount": "12"}],
					"tx_lpt": 5
				}
			})))
			.mount(&server)
			.await;

		let data = service(&server).get_user_data("0xview").await.unwrap();
		assert_eq!(data.pubkey, "0x01");
		assert_eq!(data.tx_lpt, 5);
		assert_eq!(data.balance_of(0), 12);
	}

	#[tokio::test]
	async fn test_error_body_is_classified() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/send-tx"))
			.respond_with(ResponseTemplate::new(500).set_body_json(json!({
				"error": "Pending tx error: pending tx 0xabc is not yet settled"
			})))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/sync"))
			.respond_with(ResponseTemplate::new(500).set_body_string("sync crashed"))
			.mount(&server)
			.await;

		let service = service(&server);
		let error = service
			.send_tx_request(
				"https://builder.one",
				"0xview",
				&[],
				&crate::test_support::valid_quote(),
			)
			.await
			.unwrap_err();
		assert!(error.message().starts_with("Pending tx error"));
		assert!(matches!(ClientError::from(error), ClientError::PendingTransaction));

		let error = service.sync("0xview").await.unwrap_err();
		assert_eq!(error.message(), "sync crashed");
	}

	#[tokio::test]
	async fn test_tx_status() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tx-status"))
			.and(body_json(json!({"pubkey": "0xpub", "tx_tree_root": "0xroot"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!("success")))
			.mount(&server)
			.await;

		let status = service(&server)
			.get_tx_status("0xpub", "0xroot")
			.await
			.unwrap();
		assert_eq!(status, TxStatus::Success);
	}

	#[tokio::test]
	async fn test_invalid_response() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
			.mount(&server)
			.await;

		let error = service(&server).get_user_data("0xview").await.unwrap_err();
		assert!(error.message().starts_with("Invalid sync service response"));
	}
}
