//!
//! Classification of decrypted ledger entries into history records.
//!
//! `classify` is pure: it reads the entry, the committed `UserData` watermarks and processed
//! sets, the token list and, for outgoing entries, the pending withdrawals. Calling it twice
//! with the same inputs yields the same record.

use super::types::*;
use crate::indexer::{NATIVE_TOKEN_ADDRESS, NATIVE_TOKEN_INDEX, Token, TokenType};
use crate::wallet::UserData;

use tracing::debug;

/// Native deposits of exactly 0.1, 0.5 or 1 ETH are mining deposits.
const MINING_AMOUNTS: [u128; 3] = [
	100_000_000_000_000_000,
	500_000_000_000_000_000,
	1_000_000_000_000_000_000,
];

fn token_by_index(tokens: &[Token], token_index: u32) -> Option<&Token> {
	tokens.iter().find(|t| t.token_index == token_index)
}

fn token_by_address<'a>(tokens: &'a [Token], address: &str) -> Option<&'a Token> {
	tokens
		.iter()
		.find(|t| t.contract_address.eq_ignore_ascii_case(address))
}

/// Status of an incoming entry against its watermark and processed set.
fn incoming_status(timestamp: u64, watermark: u64, processed: bool) -> TransactionStatus {
	if timestamp > watermark {
		TransactionStatus::Processing
	} else if processed {
		TransactionStatus::Completed
	} else {
		TransactionStatus::Rejected
	}
}

fn withdrawal_status(nullifier: Option<&str>, pending: &PendingWithdrawals) -> TransactionStatus {
	match nullifier.and_then(|n| pending.status_of(n)) {
		Some(WithdrawalStatus::Failed) => TransactionStatus::Rejected,
		Some(WithdrawalStatus::Success) => TransactionStatus::Completed,
		Some(WithdrawalStatus::NeedClaim) => TransactionStatus::ReadyToClaim,
		_ => TransactionStatus::Processing,
	}
}

/// Map a decrypted entry to a history record.
///
/// Outgoing entries need the pending withdrawals and yield `None` without them. Zero-amount
/// transfers are dropped from outgoing entries.
pub fn classify(
	entry: &LedgerEntry,
	user_data: &UserData,
	tokens: &[Token],
	pending: Option<&PendingWithdrawals>,
) -> Option<Transaction> {
	match &entry.payload {
		LedgerPayload::Receive(payload) => Some(classify_receive(entry, payload, user_data, tokens)),
		LedgerPayload::Deposit(payload) => Some(classify_deposit(entry, payload, user_data, tokens)),
		LedgerPayload::Send(payload) | LedgerPayload::Withdraw(payload) => {
			let Some(pending) = pending else {
				debug!("No pending withdrawals, skipping outgoing entry {}", entry.id);
				return None;
			};
			classify_outgoing(entry, payload, user_data, tokens, pending)
		}
	}
}

fn classify_receive(
	entry: &LedgerEntry,
	payload: &TransferPayload,
	user_data: &UserData,
	tokens: &[Token],
) -> Transaction {
	let token = token_by_index(tokens, payload.token_index);
	Transaction {
		id: entry.id.clone(),
		amount: payload.amount,
		from: payload.sender.clone(),
		to: payload.recipient.data.clone(),
		token_index: payload.token_index,
		token_type: token.map(|t| t.token_type),
		token_address: token.map(|t| t.contract_address.clone()),
		timestamp: entry.timestamp,
		status: incoming_status(
			entry.timestamp,
			user_data.transfer_lpt,
			user_data.processed_transfer_uuids.contains(&entry.id),
		),
		tx_type: TransactionType::Receive,
		transfers: Vec::new(),
	}
}

fn classify_deposit(
	entry: &LedgerEntry,
	payload: &DepositPayload,
	user_data: &UserData,
	tokens: &[Token],
) -> Transaction {
	let token = token_by_address(tokens, &payload.token_address);
	let token_index = token.map(|t| t.token_index).unwrap_or(NATIVE_TOKEN_INDEX);
	let is_native = payload.token_address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS);

	let tx_type = if is_native
		&& token_index == NATIVE_TOKEN_INDEX
		&& MINING_AMOUNTS.contains(&payload.amount)
	{
		TransactionType::Mining
	} else {
		TransactionType::Deposit
	};

	Transaction {
		id: entry.id.clone(),
		amount: payload.amount,
		from: payload.depositor.clone(),
		to: user_data.pubkey.clone(),
		token_index,
		token_type: token
			.map(|t| t.token_type)
			.or(is_native.then_some(TokenType::Native)),
		token_address: Some(payload.token_address.clone()),
		timestamp: entry.timestamp,
		status: incoming_status(
			entry.timestamp,
			user_data.deposit_lpt,
			user_data.processed_deposit_uuids.contains(&entry.id),
		),
		tx_type,
		transfers: Vec::new(),
	}
}

fn classify_outgoing(
	entry: &LedgerEntry,
	payload: &TxPayload,
	user_data: &UserData,
	tokens: &[Token],
	pending: &PendingWithdrawals,
) -> Option<Transaction> {
	let transfers: Vec<Transfer> = payload
		.transfers
		.iter()
		.filter(|t| t.amount != 0)
		.map(|t| {
			let is_withdrawal = !t.recipient.is_pubkey;
			Transfer {
				recipient: t.recipient.data.clone(),
				token_index: t.token_index,
				amount: t.amount,
				salt: t.salt.clone(),
				is_withdrawal,
				nullifier: if is_withdrawal { t.nullifier.clone() } else { None },
			}
		})
		.collect();

	let first = transfers.first();
	let tx_type = if transfers.iter().any(|t| t.is_withdrawal) {
		TransactionType::Withdraw
	} else {
		TransactionType::Send
	};

	let status = if entry.timestamp > user_data.tx_lpt {
		TransactionStatus::Processing
	} else {
		match tx_type {
			TransactionType::Send if !user_data.processed_tx_uuids.contains(&entry.id) => {
				TransactionStatus::Rejected
			}
			TransactionType::Withdraw => {
				withdrawal_status(first.and_then(|t| t.nullifier.as_deref()), pending)
			}
			_ => TransactionStatus::Completed,
		}
	};

	// An entry whose transfers are all zero-amount is still a send, just an empty one.
	let token_index = first.map_or(0, |t| t.token_index);
	let token = first.and_then(|t| token_by_index(tokens, t.token_index));
	Some(Transaction {
		id: entry.id.clone(),
		amount: first.map_or(0, |t| t.amount),
		from: user_data.pubkey.clone(),
		to: first.map(|t| t.recipient.clone()).unwrap_or_default(),
		token_index,
		token_type: token.map(|t| t.token_type),
		token_address: token.map(|t| t.contract_address.clone()),
		timestamp: entry.timestamp,
		status,
		tx_type,
		transfers,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{contract_withdrawal, tokens, user_data};

	const L2_RECIPIENT: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
	const L1_RECIPIENT: &str = "0x81f3843aF1FBaB046B771f0d440C04EBB2b7513F";

	fn tx_transfer(recipient: &str, is_pubkey: bool, amount: u128, nullifier: Option<&str>) -> TxTransfer {
		TxTransfer {
			recipient: GenericAddress {
				is_pubkey,
				data: recipient.to_string(),
			},
			token_index: 0,
			amount,
			salt: "0x00".to_string(),
			nullifier: nullifier.map(str::to_string),
		}
	}

	fn outgoing(id: &str, timestamp: u64, transfers: Vec<TxTransfer>) -> LedgerEntry {
		LedgerEntry::outgoing(
			id,
			timestamp,
			TxPayload {
				tx_tree_root: None,
				transfers,
			},
		)
	}

	fn deposit(id: &str, timestamp: u64, token_address: &str, amount: u128) -> LedgerEntry {
		LedgerEntry {
			id: id.to_string(),
			timestamp,
			payload: LedgerPayload::Deposit(DepositPayload {
				depositor: L1_RECIPIENT.to_string(),
				pubkey_salt_hash: "0x00".to_string(),
				token_address: token_address.to_string(),
				amount,
			}),
		}
	}

	fn receive(id: &str, timestamp: u64) -> LedgerEntry {
		LedgerEntry {
			id: id.to_string(),
			timestamp,
			payload: LedgerPayload::Receive(TransferPayload {
				sender: L2_RECIPIENT.to_string(),
				recipient: GenericAddress {
					is_pubkey: true,
					data: "0xme".to_string(),
				},
				token_index: 1,
				amount: 42,
				salt: "0x00".to_string(),
			}),
		}
	}

	#[test]
	fn test_accepted_send_is_completed() {
		let mut user = user_data();
		user.tx_lpt = 100;
		user.processed_tx_uuids.insert("tx-1".to_string());

		let entry = outgoing("tx-1", 90, vec![tx_transfer(L2_RECIPIENT, true, 5, None)]);
		let tx = classify(&entry, &user, &tokens(), Some(&PendingWithdrawals::default())).unwrap();

		assert_eq!(tx.tx_type, TransactionType::Send);
		assert_eq!(tx.status, TransactionStatus::Completed);
		assert_eq!(tx.to, L2_RECIPIENT);
		assert_eq!(tx.amount, 5);
	}

	#[test]
	fn test_unprocessed_send_is_rejected() {
		let mut user = user_data();
		user.tx_lpt = 100;

		let entry = outgoing("tx-1", 90, vec![tx_transfer(L2_RECIPIENT, true, 5, None)]);
		let tx = classify(&entry, &user, &tokens(), Some(&PendingWithdrawals::default())).unwrap();

		assert_eq!(tx.status, TransactionStatus::Rejected);
	}

	#[test]
	fn test_entry_past_watermark_is_processing() {
		let mut user = user_data();
		user.tx_lpt = 100;
		let mut pending = PendingWithdrawals::default();
		pending
			.failed
			.push(contract_withdrawal("0xaa", L1_RECIPIENT));

		let send = outgoing("tx-1", 101, vec![tx_transfer(L2_RECIPIENT, true, 5, None)]);
		let withdraw = outgoing(
			"tx-2",
			101,
			vec![tx_transfer(L1_RECIPIENT, false, 5, Some("0xaa"))],
		);

		for entry in [send, withdraw] {
			let tx = classify(&entry, &user, &tokens(), Some(&pending)).unwrap();
			assert_eq!(tx.status, TransactionStatus::Processing);
		}
	}

	#[test]
	fn test_withdrawal_status_follows_bucket() {
		let mut user = user_data();
		user.tx_lpt = 100;
		let mut pending = PendingWithdrawals::default();
		pending
			.need_claim
			.push(contract_withdrawal("0xaa", L1_RECIPIENT));
		pending
			.success
			.push(contract_withdrawal("0xbb", L1_RECIPIENT));
		pending
			.failed
			.push(contract_withdrawal("0xcc", L1_RECIPIENT));

		let cases = [
			("0xaa", TransactionStatus::ReadyToClaim),
			("0xbb", TransactionStatus::Completed),
			("0xcc", TransactionStatus::Rejected),
			("0xdd", TransactionStatus::Processing),
		];
		for (nullifier, expected) in cases {
			let entry = outgoing(
				"w",
				50,
				vec![
					tx_transfer(L1_RECIPIENT, false, 5, Some(nullifier)),
					tx_transfer(L2_RECIPIENT, true, 1, None),
				],
			);
			let tx = classify(&entry, &user, &tokens(), Some(&pending)).unwrap();
			assert_eq!(tx.tx_type, TransactionType::Withdraw);
			assert_eq!(tx.status, expected, "nullifier {}", nullifier);
			assert_eq!(tx.transfers.len(), 2);
			assert!(tx.transfers[0].is_withdrawal);
			assert!(tx.transfers[1].nullifier.is_none());
		}
	}

	#[test]
	fn test_outgoing_requires_pending_withdrawals() {
		let user = user_data();
		let entry = outgoing("tx-1", 1, vec![tx_transfer(L2_RECIPIENT, true, 5, None)]);
		assert_eq!(classify(&entry, &user, &tokens(), None), None);
	}

	#[test]
	fn test_zero_amount_transfers_dropped() {
		let mut user = user_data();
		user.tx_lpt = 100;
		let pending = PendingWithdrawals::default();

		let entry = outgoing(
			"tx-1",
			10,
			vec![
				tx_transfer(L1_RECIPIENT, false, 0, Some("0xaa")),
				tx_transfer(L2_RECIPIENT, true, 7, None),
			],
		);
		let tx = classify(&entry, &user, &tokens(), Some(&pending)).unwrap();
		assert_eq!(tx.tx_type, TransactionType::Send);
		assert_eq!(tx.transfers.len(), 1);
		assert_eq!(tx.amount, 7);

	}

	#[test]
	fn test_all_zero_outgoing_is_empty_send() {
		let mut user = user_data();
		user.tx_lpt = 100;
		user.processed_tx_uuids.insert("tx-2".to_string());
		let pending = PendingWithdrawals::default();

		let entry = outgoing(
			"tx-2",
			10,
			vec![
				tx_transfer(L2_RECIPIENT, true, 0, None),
				tx_transfer(L1_RECIPIENT, false, 0, Some("0xaa")),
			],
		);
		let tx = classify(&entry, &user, &tokens(), Some(&pending)).unwrap();
		assert_eq!(tx.tx_type, TransactionType::Send);
		assert_eq!(tx.status, TransactionStatus::Completed);
		assert!(tx.transfers.is_empty());
		assert_eq!(tx.amount, 0);
		assert_eq!(tx.to, "");
		assert_eq!(tx.token_index, 0);
		assert_eq!(tx.from, user.pubkey);
	}

	#[test]
	fn test_native_half_ether_deposit_is_mining() {
		let mut user = user_data();
		user.deposit_lpt = 100;
		user.processed_deposit_uuids.insert("d-1".to_string());

		let entry = deposit("d-1", 50, NATIVE_TOKEN_ADDRESS, 500_000_000_000_000_000);
		let tx = classify(&entry, &user, &tokens(), None).unwrap();

		assert_eq!(tx.tx_type, TransactionType::Mining);
		assert_eq!(tx.status, TransactionStatus::Completed);
		assert_eq!(tx.token_index, 0);
		assert_eq!(tx.token_type, Some(TokenType::Native));
	}

	#[test]
	fn test_other_deposits_stay_deposits() {
		let mut user = user_data();
		user.deposit_lpt = 100;

		let odd_amount = deposit("d-1", 50, NATIVE_TOKEN_ADDRESS, 300_000_000_000_000_000);
		let tx = classify(&odd_amount, &user, &tokens(), None).unwrap();
		assert_eq!(tx.tx_type, TransactionType::Deposit);
		assert_eq!(tx.status, TransactionStatus::Rejected);

		let usdc = tokens()[1].contract_address.to_uppercase().replacen("0X", "0x", 1);
		let erc20 = deposit("d-2", 150, &usdc, 1_000_000_000_000_000_000);
		let tx = classify(&erc20, &user, &tokens(), None).unwrap();
		assert_eq!(tx.tx_type, TransactionType::Deposit);
		assert_eq!(tx.token_index, 1);
		assert_eq!(tx.status, TransactionStatus::Processing);
	}

	#[test]
	fn test_receive_against_transfer_watermark() {
		let mut user = user_data();
		user.transfer_lpt = 100;
		user.processed_transfer_uuids.insert("r-1".to_string());

		let accepted = classify(&receive("r-1", 10), &user, &tokens(), None).unwrap();
		assert_eq!(accepted.status, TransactionStatus::Completed);
		assert_eq!(accepted.tx_type, TransactionType::Receive);
		assert_eq!(accepted.token_type, Some(TokenType::Erc20));

		let rejected = classify(&receive("r-2", 10), &user, &tokens(), None).unwrap();
		assert_eq!(rejected.status, TransactionStatus::Rejected);

		let pending = classify(&receive("r-3", 200), &user, &tokens(), None).unwrap();
		assert_eq!(pending.status, TransactionStatus::Processing);
	}

	#[test]
	fn test_classification_is_idempotent() {
		let mut user = user_data();
		user.tx_lpt = 100;
		let mut pending = PendingWithdrawals::default();
		pending
			.need_claim
			.push(contract_withdrawal("0xaa", L1_RECIPIENT));
		let entry = outgoing(
			"w",
			50,
			vec![tx_transfer(L1_RECIPIENT, false, 5, Some("0xaa"))],
		);

		let first = classify(&entry, &user, &tokens(), Some(&pending));
		let second = classify(&entry, &user, &tokens(), Some(&pending));
		assert_eq!(first, second);
	}
}
