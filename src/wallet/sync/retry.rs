//! Cancellable fixed-interval retry.
//!
//! `RetryController` runs fallible operations a bounded number of times and lets the owner
//! cancel every loop in flight at once. Cancellation is a generation value published over a
//! `watch` channel: `reset_retry` marks the current generation cancelled, waits for running
//! loops to drain, then publishes a fresh generation. Loops started under an older
//! generation can never resolve with a value.

use backoff::backoff::{Backoff, Constant};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Interval between drain checks while resetting.
const DRAIN_INTERVAL: Duration = Duration::from_millis(300);

/// Attempt budget and spacing for one retry loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
	pub interval_ms: u64,
	pub max_attempts: u32,
}

impl RetryPolicy {
	pub fn new(interval: Duration, max_attempts: u32) -> Self {
		Self {
			interval_ms: interval.as_millis() as u64,
			max_attempts,
		}
	}

	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

/// Result of a retry loop that was not cancelled.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
	Succeeded(T),
	/// Every attempt failed. The caller checks its own post-conditions.
	Exhausted { attempts: u32, last_error: Option<E> },
}

impl<T, E> RetryOutcome<T, E> {
	pub fn is_success(&self) -> bool {
		matches!(self, RetryOutcome::Succeeded(_))
	}

	pub fn ok(self) -> Option<T> {
		match self {
			RetryOutcome::Succeeded(value) => Some(value),
			RetryOutcome::Exhausted { .. } => None,
		}
	}
}

/// The loop observed a reset and stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Retry cancelled")]
pub struct RetryCancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
	id: u64,
	cancelled: bool,
}

impl Generation {
	fn is_live(&self, token: u64) -> bool {
		self.id == token && !self.cancelled
	}
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Shared retry primitive with cooperative cancellation
pub struct RetryController {
	generation: watch::Sender<Generation>,
	pending: AtomicUsize,
}

impl Default for RetryController {
	fn default() -> Self {
		Self::new()
	}
}

impl RetryController {
	pub fn new() -> Self {
		let (generation, _) = watch::channel(Generation {
			id: 0,
			cancelled: false,
		});
		Self {
			generation,
			pending: AtomicUsize::new(0),
		}
	}

	/// Number of retry loops currently running.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	fn is_live(&self, token: u64) -> bool {
		self.generation.borrow().is_live(token)
	}

	/// Run `operation` up to `policy.max_attempts` times, sleeping `policy.interval()`
	/// between attempts.
	///
	/// Returns `Err(RetryCancelled)` when a reset happens before the loop resolves, even if
	/// the attempt in flight at that moment later succeeds. A caller arriving while a reset
	/// is draining waits for the fresh generation before its first attempt.
	pub async fn retry_with_attempts<T, E, F, Fut>(
		&self,
		mut operation: F,
		policy: RetryPolicy,
	) -> Result<RetryOutcome<T, E>, RetryCancelled>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
	{
		let mut generation = self.generation.subscribe();
		let token = generation
			.wait_for(|g| !g.cancelled)
			.await
			.map_err(|_| RetryCancelled)?
			.id;

		self.pending.fetch_add(1, Ordering::SeqCst);
		let _guard = PendingGuard(&self.pending);

		let mut schedule = Constant::new(policy.interval());
		let mut last_error = None;

		for attempt in 1..=policy.max_attempts {
			if !self.is_live(token) {
				return Err(RetryCancelled);
			}

			match operation().await {
				Ok(value) => {
					if !self.is_live(token) {
						debug!("Discarding result of a cancelled retry loop");
						return Err(RetryCancelled);
					}
					return Ok(RetryOutcome::Succeeded(value));
				}
				Err(e) => {
					if !self.is_live(token) {
						return Err(RetryCancelled);
					}
					warn!(
						"Attempt {}/{} failed: {}",
						attempt, policy.max_attempts, e
					);
					last_error = Some(e);
				}
			}

			if attempt < policy.max_attempts {
				let delay = schedule.next_backoff().unwrap_or(policy.interval());
				tokio::select! {
					_ = tokio::time::sleep(delay) => {}
					_ = generation.wait_for(|g| !g.is_live(token)) => {
						return Err(RetryCancelled);
					}
				}
			}
		}

		error!(
			"Max retry attempts ({}) reached",
			policy.max_attempts
		);
		Ok(RetryOutcome::Exhausted {
			attempts: policy.max_attempts,
			last_error,
		})
	}

	/// Cancel every running loop, wait for them to finish, then issue a fresh generation.
	pub async fn reset_retry(&self) {
		self.generation.send_modify(|g| g.cancelled = true);

		while self.pending() > 0 {
			tokio::time::sleep(DRAIN_INTERVAL).await;
		}

		self.generation.send_modify(|g| {
			g.id += 1;
			g.cancelled = false;
		});
		debug!("Retry generation reset to {}", self.generation.borrow().id);
	}
}
