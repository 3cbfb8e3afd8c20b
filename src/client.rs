//!
//! Account client: the public surface of the crate.
//!
//! `AccountClient` ties the scheduler, the history and withdrawal services and the fee
//! selector to one logged-in account. Broadcasts pause the periodic sync for their whole
//! duration and never run concurrently.

use crate::chain::{EthersSettlementClient, SettlementContract};
use crate::config::ClientConfig;
use crate::indexer::{BlockBuilderDirectory, FeeQuote, IndexerClient, NATIVE_TOKEN_INDEX, Token, TokenSource};
use crate::transaction::{
	ClaimResult, ContractWithdrawal, FeeQuoteSelector, HistoryPage, HistoryService, SelectedQuote,
	TransactionStatus, WithdrawalStatusPoller, WithdrawalsPage,
};
use crate::utils::{is_eth_address, is_public_key, parse_units};
use crate::vault::{LedgerCategory, LedgerSource, StoreVaultClient};
use crate::wallet::sync::{
	FetchTimeStore, RetryController, RetryOutcome, SchedulerConfig, SyncScheduler,
	open_fetch_time_store,
};
use crate::wallet::{
	ClientError, RemoteSyncService, Session, SyncBackend, TransferRequest, TxStatus, UserData,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Environment variable holding the hex private key that signs withdrawal claims.
pub const CLAIM_KEY_ENV: &str = "L2_SYNC_CLAIM_PRIVATE_KEY";

/// External services the client is built from.
pub struct Collaborators {
	pub backend: Arc<dyn SyncBackend>,
	pub ledger: Arc<dyn LedgerSource>,
	pub contract: Arc<dyn SettlementContract>,
	pub directory: Arc<dyn BlockBuilderDirectory>,
	pub tokens: Arc<dyn TokenSource>,
	pub store: Arc<dyn FetchTimeStore>,
}

/// A single-recipient transfer or withdrawal. `amount` is in display units of the token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastRequest {
	pub address: String,
	pub token_index: u32,
	pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
	pub tx_tree_root: String,
	pub transfer_digests: Vec<String>,
	pub builder_url: String,
	pub fee: FeeQuote,
}

/// A balance with its token metadata, when the token list knows the index.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
	pub token_index: u32,
	pub amount: u128,
	pub is_insufficient: bool,
	pub token: Option<Token>,
}

pub struct AccountClient {
	config: ClientConfig,
	scheduler: Arc<SyncScheduler>,
	retry: Arc<RetryController>,
	backend: Arc<dyn SyncBackend>,
	fee_selector: FeeQuoteSelector,
	withdrawals: Arc<WithdrawalStatusPoller>,
	history: HistoryService,
	token_source: Arc<dyn TokenSource>,
	tokens: OnceCell<Vec<Token>>,
}

impl AccountClient {
	/// Build the client from explicit collaborators. Must be called inside a Tokio runtime.
	pub fn new(config: ClientConfig, collaborators: Collaborators) -> Result<Self, ClientError> {
		config.validate()?;

		let retry = Arc::new(RetryController::new());
		let scheduler = SyncScheduler::new(
			collaborators.backend.clone(),
			retry.clone(),
			collaborators.store,
			SchedulerConfig::from(&config),
		);
		let withdrawals = Arc::new(WithdrawalStatusPoller::new(
			collaborators.ledger.clone(),
			collaborators.contract,
			config.deposit_poll_interval(),
			config.claim_poll_interval(),
		));
		let history = HistoryService::new(
			collaborators.ledger,
			collaborators.backend.clone(),
			withdrawals.clone(),
		);
		let fee_selector = FeeQuoteSelector::new(
			collaborators.directory,
			collaborators.backend.clone(),
			config.fee_policy.clone(),
			config.max_fee_attempts,
		);

		Ok(Self {
			config,
			scheduler,
			retry,
			backend: collaborators.backend,
			fee_selector,
			withdrawals,
			history,
			token_source: collaborators.tokens,
			tokens: OnceCell::new(),
		})
	}

	/// Build the client against the HTTP services of the configured environment.
	pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
		let urls = config.urls();
		let timeout = config.http_timeout();

		let backend = RemoteSyncService::new(config.sync_service_url.clone(), timeout)?;
		let ledger = StoreVaultClient::new(urls.store_vault_url, urls.withdrawal_server_url, timeout)?;
		let mut contract = EthersSettlementClient::new(&urls.rpc_url_l1, &urls.liquidity_contract)?;
		match std::env::var(CLAIM_KEY_ENV) {
			Ok(key) => contract = contract.with_signer(&key, urls.chain_id)?,
			Err(_) => warn!("{} is not set, withdrawal claims are disabled", CLAIM_KEY_ENV),
		}
		let indexer = Arc::new(IndexerClient::new(urls.indexer_url, urls.tokens_url, timeout)?);
		let store = open_fetch_time_store(&config.data_dir).await;

		info!("Connecting to {:?} services", config.environment);
		Self::new(
			config,
			Collaborators {
				backend: Arc::new(backend),
				ledger: Arc::new(ledger),
				contract: Arc::new(contract),
				directory: indexer.clone(),
				tokens: indexer,
				store,
			},
		)
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	pub fn scheduler(&self) -> &Arc<SyncScheduler> {
		&self.scheduler
	}

	pub fn login(&self, session: Session) {
		self.scheduler.login(session);
	}

	/// Drop the session and the snapshot, and cancel every retry loop in flight.
	pub async fn logout(&self) {
		self.scheduler.logout();
		self.retry.reset_retry().await;
	}

	pub fn is_logged_in(&self) -> bool {
		self.scheduler.session().is_some()
	}

	fn session(&self) -> Result<Session, ClientError> {
		self.scheduler.session().ok_or(ClientError::NotLoggedIn)
	}

	pub fn start_periodic_sync(&self) {
		self.scheduler.start_periodic();
	}

	pub fn stop_periodic_sync(&self) {
		self.scheduler.stop_periodic();
	}

	/// Run a sync now and return the committed snapshot.
	pub async fn sync(&self) -> Result<Arc<UserData>, ClientError> {
		self.scheduler.sync_now().await
	}

	pub async fn user_data(&self) -> Result<Arc<UserData>, ClientError> {
		self.scheduler.fetch_user_data().await
	}

	/// Last committed snapshot, without touching the network.
	pub fn cached_user_data(&self) -> Result<Arc<UserData>, ClientError> {
		self.session()?;
		self.scheduler.user_data().ok_or(ClientError::NoUserData)
	}

	/// Token list, fetched once. The native token is always present at index 0.
	pub async fn tokens(&self) -> Result<&[Token], ClientError> {
		let tokens = self
			.tokens
			.get_or_try_init(|| async {
				let mut tokens = self.token_source.fetch_tokens().await?;
				if !tokens.iter().any(|t| t.token_index == NATIVE_TOKEN_INDEX) {
					tokens.insert(0, Token::native());
				}
				debug!("Loaded {} tokens", tokens.len());
				Ok::<_, ClientError>(tokens)
			})
			.await?;
		Ok(tokens)
	}

	pub async fn fetch_token_balances(&self) -> Result<Vec<AccountBalance>, ClientError> {
		let user_data = self.user_data().await?;
		let tokens = self.tokens().await?;

		Ok(user_data
			.balances
			.iter()
			.map(|balance| AccountBalance {
				token_index: balance.token_index,
				amount: balance.amount,
				is_insufficient: balance.is_insufficient,
				token: tokens
					.iter()
					.find(|t| t.token_index == balance.token_index)
					.cloned(),
			})
			.collect())
	}

	async fn fetch_history(
		&self,
		category: LedgerCategory,
		cursor: u64,
		limit: usize,
	) -> Result<HistoryPage, ClientError> {
		let session = self.session()?;
		let user_data = self.user_data().await?;
		let tokens = self.tokens().await?;
		self.history
			.fetch(category, &session, &user_data, tokens, cursor, limit)
			.await
	}

	/// Outgoing sends and withdrawals.
	pub async fn fetch_transactions(&self, cursor: u64, limit: usize) -> Result<HistoryPage, ClientError> {
		self.fetch_history(LedgerCategory::Tx, cursor, limit).await
	}

	/// Incoming transfers.
	pub async fn fetch_transfers(&self, cursor: u64, limit: usize) -> Result<HistoryPage, ClientError> {
		self.fetch_history(LedgerCategory::Transfer, cursor, limit).await
	}

	pub async fn fetch_deposits(&self, cursor: u64, limit: usize) -> Result<HistoryPage, ClientError> {
		self.fetch_history(LedgerCategory::Deposit, cursor, limit).await
	}

	pub async fn fetch_withdrawals(&self, cursor: u64, limit: usize) -> Result<WithdrawalsPage, ClientError> {
		let session = self.session()?;
		self.withdrawals
			.fetch_withdrawals(&session.spend_pub, cursor, limit)
			.await
	}

	/// Quote the fee of the next transfer without submitting anything.
	pub async fn get_transfer_fee(&self) -> Result<SelectedQuote, ClientError> {
		let session = self.session()?;
		self.fee_selector
			.select(&session.spend_pub)
			.await
			.ok_or(ClientError::QuoteFailed)
	}

	/// Send tokens to another layer-2 account.
	pub async fn transfer(&self, request: BroadcastRequest) -> Result<BroadcastResult, ClientError> {
		self.broadcast(request, false).await
	}

	/// Withdraw tokens to an L1 address.
	pub async fn withdraw(&self, request: BroadcastRequest) -> Result<BroadcastResult, ClientError> {
		self.broadcast(request, true).await
	}

	async fn broadcast(
		&self,
		request: BroadcastRequest,
		is_withdrawal: bool,
	) -> Result<BroadcastResult, ClientError> {
		let session = self.session()?;
		let valid_recipient = if is_withdrawal {
			is_eth_address(&request.address)
		} else {
			is_public_key(&request.address)
		};
		if !valid_recipient {
			return Err(ClientError::InvalidAddress(request.address));
		}

		let _guard = self.scheduler.begin_broadcast()?;
		self.scheduler.terminate();

		let amount = self.parse_amount(request.token_index, &request.amount).await?;
		let selected = self
			.fee_selector
			.select(&session.spend_pub)
			.await
			.ok_or(ClientError::QuoteFailed)?;

		let transfers = [TransferRequest {
			recipient: request.address.clone(),
			token_index: request.token_index,
			amount,
		}];
		let result = self
			.backend
			.send_tx_request(&selected.builder_url, &session.view_key, &transfers, &selected.quote)
			.await?;
		info!(
			"Submitted {} of {} to {} via {}",
			if is_withdrawal { "withdrawal" } else { "transfer" },
			request.amount,
			request.address,
			selected.builder_url
		);

		if is_withdrawal {
			self.settle_withdrawal(&session).await?;
		}

		Ok(BroadcastResult {
			tx_tree_root: result.tx_tree_root,
			transfer_digests: result.transfer_digests,
			builder_url: selected.builder_url,
			fee: selected.quote,
		})
	}

	async fn settle_withdrawal(&self, session: &Session) -> Result<(), ClientError> {
		tokio::time::sleep(self.config.withdrawal_settle_delay()).await;

		let backend = &self.backend;
		let view_key = session.view_key.as_str();
		let outcome = self
			.retry
			.retry_with_attempts(
				|| async move { backend.sync_withdrawals(view_key, 0).await },
				self.config.withdrawal_retry,
			)
			.await?;
		if let RetryOutcome::Exhausted { last_error, .. } = outcome {
			warn!(
				"Withdrawal submitted but withdrawal sync did not complete: {}",
				last_error.map(|e| e.to_string()).unwrap_or_default()
			);
		}
		Ok(())
	}

	async fn parse_amount(&self, token_index: u32, amount: &str) -> Result<u128, ClientError> {
		let tokens = self.tokens().await?;
		let decimals = match tokens.iter().find(|t| t.token_index == token_index) {
			Some(token) => token.decimals,
			None if token_index == NATIVE_TOKEN_INDEX => Token::native().decimals,
			None => return Err(ClientError::UnknownToken(token_index)),
		};

		parse_units(amount, decimals)
			.filter(|value| *value > 0)
			.ok_or_else(|| ClientError::InvalidAmount(amount.to_string()))
	}

	/// Claim withdrawals addressed to the logged-in account.
	pub async fn claim_withdrawal(
		&self,
		withdrawals: &[ContractWithdrawal],
	) -> Result<ClaimResult, ClientError> {
		let session = self.session()?;
		self.withdrawals.claim(&session.address, withdrawals).await
	}

	pub async fn wait_for_deposit(&self, tx_hash: &str) -> Result<TransactionStatus, ClientError> {
		Ok(self.withdrawals.wait_for_deposit(tx_hash).await?)
	}

	/// Poll a submitted transaction until the validity prover reports a final status.
	///
	/// A failed status query ends the wait with `NotFound`.
	pub async fn wait_for_transaction_confirmation(
		&self,
		tx_tree_root: &str,
		interval: Duration,
	) -> Result<TxStatus, ClientError> {
		let session = self.session()?;
		loop {
			match self
				.backend
				.get_tx_status(&session.spend_pub, tx_tree_root)
				.await
			{
				Ok(status) if status.is_final() => return Ok(status),
				Ok(status) => debug!("Transaction {} is {:?}", tx_tree_root, status),
				Err(e) => {
					warn!("Failed to query transaction {}: {}", tx_tree_root, e);
					return Ok(TxStatus::NotFound);
				}
			}
			tokio::time::sleep(interval).await;
		}
	}
}
