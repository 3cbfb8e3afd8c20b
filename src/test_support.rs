//! In-memory collaborators and fixtures shared by unit tests.

use crate::chain::{ChainError, Receipt, SettlementContract, abi};
use crate::indexer::{
	BlockBuilderDirectory, BlockBuilderInfo, Fee, FeeQuote, ServiceError, Token, TokenSource,
	TokenType,
};
use crate::transaction::{ContractWithdrawal, LedgerEntry};
use crate::vault::{
	LedgerCategory, LedgerPage, LedgerSource, RawLedgerEntry, WithdrawalInfo, WithdrawalInfoPage,
};
use crate::wallet::{
	BackendError, Session, SyncBackend, TokenBalance, TransferRequest, TxResult, TxStatus, UserData,
};

use async_trait::async_trait;
use ethers::types::H256;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub const ERC20_ADDRESS: &str = "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238";

pub fn session() -> Session {
	Session {
		address: "0x81f3843af1fbab046b771f0d440c04ebb2b7513f".to_string(),
		view_key: "view-key-1".to_string(),
		spend_pub: format!("0x{}", "ab".repeat(32)),
	}
}

pub fn other_session() -> Session {
	Session {
		address: "0xf65e73aac9182e353600a916a6c7681f810f79c3".to_string(),
		view_key: "view-key-2".to_string(),
		spend_pub: format!("0x{}", "cd".repeat(32)),
	}
}

pub fn user_data() -> UserData {
	UserData {
		pubkey: session().spend_pub,
		balances: vec![
			TokenBalance {
				token_index: 0,
				amount: 2_000_000_000_000_000_000,
				is_insufficient: false,
			},
			TokenBalance {
				token_index: 1,
				amount: 1_500_000,
				is_insufficient: false,
			},
			TokenBalance {
				token_index: 9,
				amount: 7,
				is_insufficient: false,
			},
		],
		..Default::default()
	}
}

pub fn tokens() -> Vec<Token> {
	vec![
		Token::native(),
		Token {
			contract_address: ERC20_ADDRESS.to_string(),
			decimals: 6,
			token_index: 1,
			token_type: TokenType::Erc20,
			symbol: "USDC".to_string(),
			name: Some("USD Coin".to_string()),
			price: None,
			image: None,
		},
	]
}

/// 32-byte nullifier filled with `byte`.
pub fn nullifier(byte: u8) -> String {
	format!("{:#x}", H256::repeat_byte(byte))
}

pub fn contract_withdrawal(nullifier: &str, recipient: &str) -> ContractWithdrawal {
	ContractWithdrawal {
		recipient: recipient.to_string(),
		token_index: 0,
		amount: 100_000_000_000_000_000,
		nullifier: nullifier.to_string(),
	}
}

pub fn valid_quote() -> FeeQuote {
	FeeQuote {
		beneficiary: Some(format!("0x{}", "ee".repeat(32))),
		fee: Some(Fee {
			token_index: 0,
			amount: 100_000_000_000_000,
		}),
		collateral_fee: None,
		is_registration_block: false,
	}
}

pub fn raw_entry(id: &str, timestamp: u64) -> RawLedgerEntry {
	RawLedgerEntry {
		id: id.to_string(),
		timestamp,
		encrypted_payload: format!("encrypted-{}", id),
		category: LedgerCategory::Tx,
	}
}

/// Number of calls made to each `FakeBackend` operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
	pub sync: u32,
	pub resync: u32,
	pub sync_withdrawals: u32,
	pub get_user_data: u32,
	pub decrypt: u32,
	pub quote: u32,
	pub send_tx: u32,
	pub tx_status: u32,
}

/// A submitted transaction as seen by `FakeBackend`.
#[derive(Debug, Clone)]
pub struct SentTx {
	pub builder_url: String,
	pub transfers: Vec<TransferRequest>,
	pub fee: FeeQuote,
}

#[derive(Default)]
struct BackendState {
	calls: CallCounts,
	sync_failures: VecDeque<BackendError>,
	always_fail_sync: Option<String>,
	withdrawal_failures: u32,
	sync_delay: Option<Duration>,
	user_data: UserData,
	last_resync_full: Option<bool>,
	quotes: HashMap<String, FeeQuote>,
	quoted: Vec<String>,
	decrypted: HashMap<String, LedgerEntry>,
	tx_statuses: VecDeque<TxStatus>,
	send_failure: Option<BackendError>,
	sent: Vec<SentTx>,
}

/// Scripted sync library.
pub struct FakeBackend {
	state: Mutex<BackendState>,
}

impl Default for FakeBackend {
	fn default() -> Self {
		Self {
			state: Mutex::new(BackendState {
				user_data: user_data(),
				..Default::default()
			}),
		}
	}
}

impl FakeBackend {
	pub fn calls(&self) -> CallCounts {
		lock(&self.state).calls
	}

	pub fn fail_next_syncs(&self, errors: Vec<BackendError>) {
		lock(&self.state).sync_failures.extend(errors);
	}

	pub fn fail_all_syncs(&self, message: &str) {
		lock(&self.state).always_fail_sync = Some(message.to_string());
	}

	pub fn fail_next_withdrawal_syncs(&self, count: u32) {
		lock(&self.state).withdrawal_failures = count;
	}

	pub fn set_sync_delay(&self, delay: Duration) {
		lock(&self.state).sync_delay = Some(delay);
	}

	pub fn user_data(&self) -> UserData {
		lock(&self.state).user_data.clone()
	}

	pub fn set_user_data(&self, data: UserData) {
		lock(&self.state).user_data = data;
	}

	pub fn last_resync_full(&self) -> Option<bool> {
		lock(&self.state).last_resync_full
	}

	/// Builders asked for a quote, in order.
	pub fn quoted_builders(&self) -> Vec<String> {
		lock(&self.state).quoted.clone()
	}

	pub fn set_quote(&self, builder_url: &str, quote: FeeQuote) {
		lock(&self.state)
			.quotes
			.insert(builder_url.to_string(), quote);
	}

	pub fn set_decrypted(&self, entry: LedgerEntry) {
		lock(&self.state).decrypted.insert(entry.id.clone(), entry);
	}

	pub fn push_tx_status(&self, status: TxStatus) {
		lock(&self.state).tx_statuses.push_back(status);
	}

	pub fn fail_send(&self, error: BackendError) {
		lock(&self.state).send_failure = Some(error);
	}

	pub fn sent(&self) -> Vec<SentTx> {
		lock(&self.state).sent.clone()
	}
}

#[async_trait]
impl SyncBackend for FakeBackend {
	async fn sync(&self, _view_key: &str) -> Result<(), BackendError> {
		let (delay, result) = {
			let mut state = lock(&self.state);
			state.calls.sync += 1;
			let scripted = state.sync_failures.pop_front();
			let result = match (scripted, &state.always_fail_sync) {
				(Some(error), _) => Err(error),
				(None, Some(message)) => Err(BackendError::new(message.clone())),
				(None, None) => Ok(()),
			};
			(state.sync_delay, result)
		};
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		result
	}

	async fn sync_withdrawals(&self, _view_key: &str, _claim_index: u32) -> Result<(), BackendError> {
		let mut state = lock(&self.state);
		state.calls.sync_withdrawals += 1;
		if state.withdrawal_failures > 0 {
			state.withdrawal_failures -= 1;
			return Err(BackendError::new("withdrawal sync failed"));
		}
		Ok(())
	}

	async fn resync(&self, _view_key: &str, full_rescan: bool) -> Result<(), BackendError> {
		let mut state = lock(&self.state);
		state.calls.resync += 1;
		state.last_resync_full = Some(full_rescan);
		Ok(())
	}

	async fn get_user_data(&self, _view_key: &str) -> Result<UserData, BackendError> {
		let mut state = lock(&self.state);
		state.calls.get_user_data += 1;
		Ok(state.user_data.clone())
	}

	async fn decrypt_entry(
		&self,
		_view_key: &str,
		entry: &RawLedgerEntry,
	) -> Result<LedgerEntry, BackendError> {
		let mut state = lock(&self.state);
		state.calls.decrypt += 1;
		state
			.decrypted
			.get(&entry.id)
			.cloned()
			.ok_or_else(|| BackendError::new("failed to decrypt"))
	}

	async fn quote_transfer_fee(
		&self,
		builder_url: &str,
		_spend_pub: &str,
		_fee_token_index: u32,
	) -> Result<FeeQuote, BackendError> {
		let mut state = lock(&self.state);
		state.calls.quote += 1;
		state.quoted.push(builder_url.to_string());
		state
			.quotes
			.get(builder_url)
			.cloned()
			.ok_or_else(|| BackendError::new("block builder unavailable"))
	}

	async fn send_tx_request(
		&self,
		builder_url: &str,
		_view_key: &str,
		transfers: &[TransferRequest],
		fee: &FeeQuote,
	) -> Result<TxResult, BackendError> {
		let mut state = lock(&self.state);
		state.calls.send_tx += 1;
		if let Some(error) = state.send_failure.take() {
			return Err(error);
		}
		state.sent.push(SentTx {
			builder_url: builder_url.to_string(),
			transfers: transfers.to_vec(),
			fee: fee.clone(),
		});
		Ok(TxResult {
			tx_tree_root: "0xroot".to_string(),
			transfer_digests: vec!["0xdigest".to_string(); transfers.len()],
		})
	}

	async fn get_tx_status(&self, _spend_pub: &str, _tx_tree_root: &str) -> Result<TxStatus, BackendError> {
		let mut state = lock(&self.state);
		state.calls.tx_status += 1;
		Ok(state.tx_statuses.pop_front().unwrap_or(TxStatus::Success))
	}
}

#[derive(Default)]
struct LedgerState {
	pages: HashMap<LedgerCategory, Vec<RawLedgerEntry>>,
	withdrawal_info: Vec<WithdrawalInfo>,
	fail_withdrawal_info: bool,
	page_fetches: u32,
	withdrawal_fetches: u32,
}

/// Store vault and withdrawal server backed by fixed records.
#[derive(Default)]
pub struct FakeLedger {
	state: Mutex<LedgerState>,
}

impl FakeLedger {
	pub fn set_page(&self, category: LedgerCategory, entries: Vec<RawLedgerEntry>) {
		lock(&self.state).pages.insert(category, entries);
	}

	pub fn set_withdrawal_info(&self, items: Vec<WithdrawalInfo>) {
		lock(&self.state).withdrawal_info = items;
	}

	pub fn fail_withdrawal_info(&self) {
		lock(&self.state).fail_withdrawal_info = true;
	}

	pub fn page_fetches(&self) -> u32 {
		lock(&self.state).page_fetches
	}

	pub fn withdrawal_fetches(&self) -> u32 {
		lock(&self.state).withdrawal_fetches
	}
}

#[async_trait]
impl LedgerSource for FakeLedger {
	async fn fetch_page(
		&self,
		category: LedgerCategory,
		_pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<LedgerPage, ServiceError> {
		let mut state = lock(&self.state);
		state.page_fetches += 1;
		let entries: Vec<RawLedgerEntry> = state
			.pages
			.get(&category)
			.map(|entries| {
				entries
					.iter()
					.filter(|e| e.timestamp > cursor)
					.take(limit)
					.cloned()
					.map(|mut e| {
						e.category = category;
						e
					})
					.collect()
			})
			.unwrap_or_default();
		Ok(LedgerPage {
			next_cursor: entries.iter().map(|e| e.timestamp).max(),
			entries,
			has_more: false,
		})
	}

	/// Pages by offset: the cursor is the number of items already returned.
	async fn fetch_withdrawal_info(
		&self,
		_pubkey: &str,
		cursor: u64,
		limit: usize,
	) -> Result<WithdrawalInfoPage, ServiceError> {
		let mut state = lock(&self.state);
		state.withdrawal_fetches += 1;
		if state.fail_withdrawal_info {
			return Err(ServiceError::NoData);
		}
		let items: Vec<WithdrawalInfo> = state
			.withdrawal_info
			.iter()
			.skip(cursor as usize)
			.take(limit)
			.cloned()
			.collect();
		let end = cursor + items.len() as u64;
		Ok(WithdrawalInfoPage {
			has_more: (end as usize) < state.withdrawal_info.len(),
			next_cursor: Some(end),
			items,
		})
	}
}

#[derive(Default)]
struct ContractState {
	claimable: HashMap<[u8; 32], Result<bool, String>>,
	fail_batch: bool,
	truncate_batch: bool,
	batches: Vec<usize>,
	receipts: VecDeque<Result<Option<Receipt>, String>>,
	receipt_calls: u32,
	claimed: Vec<(String, Vec<ContractWithdrawal>)>,
}

/// Settlement contract with scripted reads and receipts.
#[derive(Default)]
pub struct FakeContract {
	state: Mutex<ContractState>,
}

impl FakeContract {
	pub fn set_claimable(&self, withdrawal: &ContractWithdrawal, result: Result<bool, String>) {
		let hash = abi::withdrawal_hash(withdrawal).expect("valid withdrawal");
		lock(&self.state).claimable.insert(hash, result);
	}

	pub fn fail_claimable_batch(&self) {
		lock(&self.state).fail_batch = true;
	}

	/// Drops the last result of every claimable read.
	pub fn truncate_claimable_batch(&self) {
		lock(&self.state).truncate_batch = true;
	}

	pub fn claimable_batches(&self) -> Vec<usize> {
		lock(&self.state).batches.clone()
	}

	pub fn push_receipt(&self, receipt: Result<Option<Receipt>, String>) {
		lock(&self.state).receipts.push_back(receipt);
	}

	pub fn receipt_calls(&self) -> u32 {
		lock(&self.state).receipt_calls
	}

	pub fn claimed(&self) -> Vec<(String, Vec<ContractWithdrawal>)> {
		lock(&self.state).claimed.clone()
	}
}

#[async_trait]
impl SettlementContract for FakeContract {
	async fn claimable_withdrawals(
		&self,
		hashes: &[[u8; 32]],
	) -> Result<Vec<Result<bool, String>>, ChainError> {
		let mut state = lock(&self.state);
		state.batches.push(hashes.len());
		if state.fail_batch {
			return Err(ChainError::Transport("rpc unavailable".to_string()));
		}
		let mut results: Vec<_> = hashes
			.iter()
			.map(|hash| state.claimable.get(hash).cloned().unwrap_or(Ok(false)))
			.collect();
		if state.truncate_batch {
			results.pop();
		}
		Ok(results)
	}

	async fn claim_withdrawals(
		&self,
		from: &str,
		withdrawals: &[ContractWithdrawal],
	) -> Result<String, ChainError> {
		lock(&self.state)
			.claimed
			.push((from.to_string(), withdrawals.to_vec()));
		Ok("0xclaim".to_string())
	}

	async fn get_transaction_receipt(&self, _tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
		let mut state = lock(&self.state);
		state.receipt_calls += 1;
		match state.receipts.pop_front() {
			Some(Ok(receipt)) => Ok(receipt),
			Some(Err(message)) => Err(ChainError::Transport(message)),
			None => Ok(None),
		}
	}
}

/// Indexer returning a configurable builder list.
#[derive(Default)]
pub struct FakeDirectory {
	builders: Mutex<Vec<String>>,
	fetches: Mutex<u32>,
}

impl FakeDirectory {
	pub fn new(urls: &[&str]) -> Self {
		let directory = Self::default();
		directory.set_builders(urls);
		directory
	}

	pub fn set_builders(&self, urls: &[&str]) {
		*lock(&self.builders) = urls.iter().map(|u| u.to_string()).collect();
	}

	pub fn fetches(&self) -> u32 {
		*lock(&self.fetches)
	}
}

#[async_trait]
impl BlockBuilderDirectory for FakeDirectory {
	async fn fetch_block_builder_urls(&self) -> Result<Vec<BlockBuilderInfo>, ServiceError> {
		*lock(&self.fetches) += 1;
		Ok(lock(&self.builders)
			.iter()
			.map(|url| BlockBuilderInfo {
				url: url.clone(),
				address: None,
			})
			.collect())
	}
}

/// Token list returning `tokens()`.
#[derive(Default)]
pub struct FakeTokens {
	fetches: Mutex<u32>,
}

impl FakeTokens {
	pub fn fetches(&self) -> u32 {
		*lock(&self.fetches)
	}
}

#[async_trait]
impl TokenSource for FakeTokens {
	async fn fetch_tokens(&self) -> Result<Vec<Token>, ServiceError> {
		*lock(&self.fetches) += 1;
		Ok(tokens())
	}
}
