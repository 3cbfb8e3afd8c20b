//!
//! HTTP client for the indexer and token list services.
//!
//! The indexer advertises the block builders that accept transfers; the token service
//! publishes token metadata keyed by layer-2 token index. Both are plain JSON endpoints
//! whose bodies may be wrapped in a `data` envelope.

use super::types::*;
use crate::utils::http::{build_http_client, read_json};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Source of candidate block-builder URLs.
#[async_trait]
pub trait BlockBuilderDirectory: Send + Sync {
	async fn fetch_block_builder_urls(&self) -> Result<Vec<BlockBuilderInfo>, ServiceError>;
}

/// Source of token metadata.
#[async_trait]
pub trait TokenSource: Send + Sync {
	async fn fetch_tokens(&self) -> Result<Vec<Token>, ServiceError>;
}

/// Indexer and token list client
#[derive(Clone)]
pub struct IndexerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the indexer API.
	indexer_url: String,
	/// Base URL of the token list API.
	tokens_url: String,
}

impl IndexerClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `indexer_url` - Base URL of the indexer API.
	/// * `tokens_url` - Base URL of the token list API.
	/// * `timeout` - Per-request timeout.
	pub fn new(
		indexer_url: String,
		tokens_url: String,
		timeout: Duration,
	) -> Result<Self, ServiceError> {
		Ok(Self {
			http_client: build_http_client(timeout)?,
			indexer_url: indexer_url.trim_end_matches('/').to_string(),
			tokens_url: tokens_url.trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl BlockBuilderDirectory for IndexerClient {
	async fn fetch_block_builder_urls(&self) -> Result<Vec<BlockBuilderInfo>, ServiceError> {
		let url = format!("{}/builders", self.indexer_url);
		debug!("Fetching block builders from {}", url);

		let response = self.http_client.get(&url).send().await?;
		let builders: Vec<BlockBuilderInfo> = read_json(response).await?;

		debug!("Indexer returned {} block builders", builders.len());
		Ok(builders)
	}
}

#[async_trait]
impl TokenSource for IndexerClient {
	async fn fetch_tokens(&self) -> Result<Vec<Token>, ServiceError> {
		let url = format!("{}/token-maps/list", self.tokens_url);

		let response = self
			.http_client
			.get(&url)
			.query(&[("perPage", "1000")])
			.send()
			.await?;
		let tokens: Vec<Token> = read_json(response).await?;

		info!("Loaded {} tokens", tokens.len());
		Ok(tokens)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use serde_json::json;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(server: &MockServer) -> IndexerClient {
		IndexerClient::new(
			format!("{}/v1/indexer", server.uri()),
			format!("{}/v1/", server.uri()),
			Duration::from_secs(5),
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_fetch_block_builders_unwraps_envelope() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/indexer/builders"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": [{"url": "https://builder.one"}, {"url": "https://builder.two"}]
			})))
			.expect(1)
			.mount(&server)
			.await;

		let builders = client(&server).fetch_block_builder_urls().await.unwrap();
		let urls: Vec<&str> = builders.iter().map(|b| b.url.as_str()).collect();
		assert_eq!(urls, vec!["https://builder.one", "https://builder.two"]);
	}

	#[tokio::test]
	async fn test_fetch_tokens_requests_full_list() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/token-maps/list"))
			.and(query_param("perPage", "1000"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{
				"contractAddress": "0x0000000000000000000000000000000000000000",
				"decimals": 18,
				"tokenIndex": 0,
				"tokenType": "NATIVE",
				"symbol": "ETH"
			}])))
			.expect(1)
			.mount(&server)
			.await;

		let tokens = client(&server).fetch_tokens().await.unwrap();
		assert_eq!(tokens.len(), 1);
		assert_eq!(tokens[0].token_type, TokenType::Native);
		assert_eq!(tokens[0].symbol, "ETH");
	}

	#[tokio::test]
	async fn test_indexer_unavailable() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let result = client(&server).fetch_block_builder_urls().await;
		assert!(matches!(
			result,
			Err(ServiceError::StatusError { status: 503, .. })
		));
	}

	#[tokio::test]
	async fn test_malformed_token_list() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
			.mount(&server)
			.await;

		let result = client(&server).fetch_tokens().await;
		assert!(matches!(result, Err(ServiceError::JsonError(_))));
	}
}
