//!
//! Block-builder selection and fee validation.
//!
//! A transfer may only proceed with a quote from a live block builder whose terms pass the
//! fee policy. The selector keeps the last builder it used and re-draws a random builder
//! from a freshly fetched list whenever a quote is missing or unacceptable. Builders that
//! already failed during a selection are only drawn again once no other builder is left.

use crate::indexer::{BlockBuilderDirectory, Fee, FeeQuote, NATIVE_TOKEN_INDEX};
use crate::utils::u128_string;
use crate::wallet::SyncBackend;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Acceptable terms for a block-builder fee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeePolicy {
	/// Token the fee must be paid in.
	pub fee_token_index: u32,
	/// Cap when the next block registers new senders.
	#[serde(with = "u128_string")]
	pub max_registration_fee: u128,
	/// Cap for ordinary blocks.
	#[serde(with = "u128_string")]
	pub max_non_registration_fee: u128,
}

impl Default for FeePolicy {
	fn default() -> Self {
		Self {
			fee_token_index: NATIVE_TOKEN_INDEX,
			max_registration_fee: 1_000_000_000_000_000,
			max_non_registration_fee: 500_000_000_000_000,
		}
	}
}

impl FeePolicy {
	pub fn is_valid(&self, fee: &Fee, is_registration_block: bool) -> bool {
		let cap = if is_registration_block {
			self.max_registration_fee
		} else {
			self.max_non_registration_fee
		};
		fee.token_index == self.fee_token_index && fee.amount <= cap
	}

	/// A quote is acceptable with a valid fee and no collateral requirement.
	pub fn accepts(&self, quote: &FeeQuote) -> bool {
		quote.collateral_fee.is_none()
			&& quote
				.fee
				.as_ref()
				.is_some_and(|fee| self.is_valid(fee, quote.is_registration_block))
	}
}

/// An accepted quote and the builder that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedQuote {
	pub builder_url: String,
	pub quote: FeeQuote,
}

/// Chooses a block builder and obtains a valid fee quote
pub struct FeeQuoteSelector {
	directory: Arc<dyn BlockBuilderDirectory>,
	backend: Arc<dyn SyncBackend>,
	policy: FeePolicy,
	max_attempts: u32,
	cached_url: Mutex<Option<String>>,
}

impl FeeQuoteSelector {
	pub fn new(
		directory: Arc<dyn BlockBuilderDirectory>,
		backend: Arc<dyn SyncBackend>,
		policy: FeePolicy,
		max_attempts: u32,
	) -> Self {
		Self {
			directory,
			backend,
			policy,
			max_attempts,
			cached_url: Mutex::new(None),
		}
	}

	pub fn cached_url(&self) -> Option<String> {
		self.cached_url
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}

	fn set_cached_url(&self, url: Option<String>) {
		*self.cached_url.lock().unwrap_or_else(|e| e.into_inner()) = url;
	}

	/// Random builder from a freshly fetched list, preferring ones not in `tried`. `None`
	/// when the list is empty or unavailable.
	async fn draw_candidate(&self, tried: &[String]) -> Option<String> {
		let builders = match self.directory.fetch_block_builder_urls().await {
			Ok(builders) => builders,
			Err(e) => {
				warn!("Failed to fetch block builders: {}", e);
				return None;
			}
		};

		let untried: Vec<&str> = builders
			.iter()
			.map(|b| b.url.as_str())
			.filter(|url| !tried.iter().any(|t| t == url))
			.collect();
		let pool = if untried.is_empty() {
			builders.iter().map(|b| b.url.as_str()).collect()
		} else {
			untried
		};
		pool.choose(&mut rand::rng()).map(|url| url.to_string())
	}

	/// Obtain a valid quote, trying at most `max_attempts` builders.
	///
	/// The builder in use when the loop ends is cached for the next call whether or not a
	/// quote was accepted. `None` means every attempt failed.
	pub async fn select(&self, spend_pub: &str) -> Option<SelectedQuote> {
		let mut url = self.cached_url();
		let mut accepted = None;
		let mut tried: Vec<String> = Vec::new();

		for attempt in 1..=self.max_attempts {
			if url.is_none() {
				url = self.draw_candidate(&tried).await;
			}

			match url.as_deref() {
				Some(builder_url) => {
					match self
						.backend
						.quote_transfer_fee(builder_url, spend_pub, self.policy.fee_token_index)
						.await
					{
						Ok(quote) if self.policy.accepts(&quote) => {
							debug!("Accepted fee quote from {}", builder_url);
							accepted = Some(SelectedQuote {
								builder_url: builder_url.to_string(),
								quote,
							});
							break;
						}
						Ok(quote) => warn!(
							"Attempt {} rejected quote from {}: {:?}",
							attempt, builder_url, quote
						),
						Err(e) => warn!("Attempt {} failed: {}", attempt, e),
					}
					tried.push(builder_url.to_string());
				}
				None => warn!("Attempt {} has no block builder to ask", attempt),
			}

			if attempt < self.max_attempts {
				if let Some(next) = self.draw_candidate(&tried).await {
					url = Some(next);
				}
			}
		}

		self.set_cached_url(url);
		if accepted.is_none() {
			info!(
				"No valid fee quote after {} attempts",
				self.max_attempts
			);
		}
		accepted
	}
}
