//!
//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a valid configuration. Service
//! endpoints follow the selected environment unless `urls` overrides them as a whole.

use crate::transaction::{FeePolicy, MAX_PAGE_LIMIT};
use crate::wallet::ClientError;
use crate::wallet::sync::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment the client talks to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	Mainnet,
	#[default]
	Testnet,
}

/// Endpoints of the services the client depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceUrls {
	pub store_vault_url: String,
	pub validity_prover_url: String,
	pub balance_prover_url: String,
	pub withdrawal_server_url: String,
	pub indexer_url: String,
	pub tokens_url: String,
	pub rpc_url_l1: String,
	pub liquidity_contract: String,
	/// Chain id claim transactions are signed for.
	pub chain_id: u64,
}

impl ServiceUrls {
	pub fn for_environment(environment: Environment) -> Self {
		match environment {
			Environment::Mainnet => Self {
				store_vault_url: "https://api.node.intmax.io/store-vault-server".to_string(),
				validity_prover_url: "https://api.node.intmax.io/validity-prover".to_string(),
				balance_prover_url: "https://api.private.zkp.intmax.io".to_string(),
				withdrawal_server_url: "https://api.node.intmax.io/withdrawal-server".to_string(),
				indexer_url: "https://api.indexer.intmax.io/v1/indexer".to_string(),
				tokens_url: "https://api.token.intmax.io/v1".to_string(),
				rpc_url_l1: "https://api.rpc.intmax.io?network=ethereum".to_string(),
				liquidity_contract: "0xF65e73aAc9182e353600a916a6c7681F810f79C3".to_string(),
				chain_id: 1,
			},
			Environment::Testnet => Self {
				store_vault_url: "https://stage.api.node.intmax.io/store-vault-server".to_string(),
				validity_prover_url: "https://stage.api.node.intmax.io/validity-prover".to_string(),
				balance_prover_url: "https://stage.api.private.zkp.intmax.io".to_string(),
				withdrawal_server_url: "https://stage.api.node.intmax.io/withdrawal-server"
					.to_string(),
				indexer_url: "https://stage.api.indexer.intmax.io/v1/indexer".to_string(),
				tokens_url: "https://stage.api.token.intmax.io/v1".to_string(),
				rpc_url_l1: "https://sepolia.gateway.tenderly.co".to_string(),
				liquidity_contract: "0x81f3843aF1FBaB046B771f0d440C04EBB2b7513F".to_string(),
				chain_id: 11_155_111,
			},
		}
	}
}

/// Configuration of `AccountClient`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
	pub environment: Environment,
	/// Replaces the environment's endpoints when set.
	pub urls: Option<ServiceUrls>,
	/// HTTP endpoint of the sync library service.
	pub sync_service_url: String,
	pub sync_interval_ms: u64,
	/// How long a recorded fetch keeps the snapshot fresh.
	pub freshness_window_ms: u64,
	pub sync_retry: RetryPolicy,
	pub withdrawal_retry: RetryPolicy,
	pub deposit_poll_interval_ms: u64,
	pub claim_poll_interval_ms: u64,
	/// Wait after a withdrawal is submitted before syncing withdrawals.
	pub withdrawal_settle_delay_ms: u64,
	pub http_timeout_ms: u64,
	pub fee_policy: FeePolicy,
	pub max_fee_attempts: u32,
	pub history_limit: usize,
	pub data_dir: PathBuf,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			environment: Environment::default(),
			urls: None,
			sync_service_url: "http://localhost:9080".to_string(),
			sync_interval_ms: 30_000,
			freshness_window_ms: 180_000,
			sync_retry: RetryPolicy::new(Duration::from_secs(10), 5),
			withdrawal_retry: RetryPolicy::new(Duration::from_secs(1), 5),
			deposit_poll_interval_ms: 3_000,
			claim_poll_interval_ms: 1_500,
			withdrawal_settle_delay_ms: 40_000,
			http_timeout_ms: 30_000,
			fee_policy: FeePolicy::default(),
			max_fee_attempts: 3,
			history_limit: MAX_PAGE_LIMIT,
			data_dir: PathBuf::from(".l2-account-sync"),
		}
	}
}

impl ClientConfig {
	/// Load a JSON configuration file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
		let bytes = tokio::fs::read(path.as_ref()).await?;
		let config: Self = serde_json::from_slice(&bytes)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ClientError> {
		if self.history_limit > MAX_PAGE_LIMIT {
			return Err(ClientError::Config(format!(
				"history_limit must be at most {}",
				MAX_PAGE_LIMIT
			)));
		}
		if self.max_fee_attempts == 0 {
			return Err(ClientError::Config(
				"max_fee_attempts must be at least 1".to_string(),
			));
		}
		if self.sync_retry.max_attempts == 0 || self.withdrawal_retry.max_attempts == 0 {
			return Err(ClientError::Config(
				"retry policies need at least one attempt".to_string(),
			));
		}
		let intervals = [
			("sync_interval_ms", self.sync_interval_ms),
			("deposit_poll_interval_ms", self.deposit_poll_interval_ms),
			("claim_poll_interval_ms", self.claim_poll_interval_ms),
			("sync_retry.interval_ms", self.sync_retry.interval_ms),
			("withdrawal_retry.interval_ms", self.withdrawal_retry.interval_ms),
		];
		if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
			return Err(ClientError::Config(format!("{} must be greater than zero", name)));
		}
		Ok(())
	}

	pub fn urls(&self) -> ServiceUrls {
		self.urls
			.clone()
			.unwrap_or_else(|| ServiceUrls::for_environment(self.environment))
	}

	pub fn sync_interval(&self) -> Duration {
		Duration::from_millis(self.sync_interval_ms)
	}

	pub fn freshness_window(&self) -> Duration {
		Duration::from_millis(self.freshness_window_ms)
	}

	pub fn deposit_poll_interval(&self) -> Duration {
		Duration::from_millis(self.deposit_poll_interval_ms)
	}

	pub fn claim_poll_interval(&self) -> Duration {
		Duration::from_millis(self.claim_poll_interval_ms)
	}

	pub fn withdrawal_settle_delay(&self) -> Duration {
		Duration::from_millis(self.withdrawal_settle_delay_ms)
	}

	pub fn http_timeout(&self) -> Duration {
		Duration::from_millis(self.http_timeout_ms)
	}
}
