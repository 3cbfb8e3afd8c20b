//! Sync worker task.
//!
//! One worker runs one job: sync the account (falling back to a resync when the library
//! reports an unreachable state), sync withdrawals, then read the fresh `UserData`. Each
//! step is retried through the shared `RetryController`. The worker owns nothing shared and
//! reports through a channel; terminating it aborts the task and drops whatever it had.

use super::events::WorkerMessage;
use super::retry::{RetryController, RetryOutcome, RetryPolicy};
use crate::wallet::{ClientError, Session, SyncBackend, UserData};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dependencies a worker needs to run a job.
#[derive(Clone)]
pub struct WorkerContext {
	pub backend: Arc<dyn SyncBackend>,
	pub retry: Arc<RetryController>,
	pub sync_retry: RetryPolicy,
	pub withdrawal_retry: RetryPolicy,
}

/// A sync request for one account.
#[derive(Debug, Clone)]
pub struct SyncJob {
	pub id: u64,
	pub session: Session,
}

/// Handle to a running worker. Dropping it aborts the task.
pub struct WorkerHandle {
	job: u64,
	handle: JoinHandle<()>,
}

impl WorkerHandle {
	pub fn spawn(
		job: SyncJob,
		context: WorkerContext,
		messages: mpsc::UnboundedSender<WorkerMessage>,
	) -> Self {
		let id = job.id;
		let handle = tokio::spawn(async move {
			info!("Sync worker started for job {}", job.id);
			let message = match run_sync_job(&context, &job.session).await {
				Ok(data) => WorkerMessage::UserData {
					job: job.id,
					address: job.session.address.clone(),
					data,
				},
				Err(e) => WorkerMessage::Failed {
					job: job.id,
					error: e.to_string(),
				},
			};
			if messages.send(message).is_err() {
				debug!("Scheduler gone, dropping result of job {}", job.id);
			}
		});

		Self { job: id, handle }
	}

	pub fn job(&self) -> u64 {
		self.job
	}

	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Abort the worker. Anything it has not reported yet is lost.
	pub fn terminate(self) {
		drop(self);
	}
}

impl Drop for WorkerHandle {
	fn drop(&mut self) {
		if !self.handle.is_finished() {
			debug!("Terminating sync worker for job {}", self.job);
		}
		self.handle.abort();
	}
}

/// Run the sync steps of one job and return the resulting snapshot.
///
/// An exhausted account sync fails the job. An exhausted withdrawal sync is logged and the
/// job continues, since balances are still current.
pub async fn run_sync_job(context: &WorkerContext, session: &Session) -> Result<UserData, ClientError> {
	let backend = &context.backend;
	let view_key = session.view_key.as_str();

	let synced = context
		.retry
		.retry_with_attempts(
			|| async move {
				match backend.sync(view_key).await {
					Ok(()) => Ok(()),
					Err(e) if e.is_unreachable() => {
						warn!("Sync reported an unreachable state, resyncing: {}", e);
						backend.resync(view_key, false).await
					}
					Err(e) => Err(e),
				}
			},
			context.sync_retry,
		)
		.await?;

	if let RetryOutcome::Exhausted { last_error, .. } = synced {
		return Err(ClientError::SyncFailed(
			last_error.map(|e| e.to_string()).unwrap_or_default(),
		));
	}

	let withdrawals = context
		.retry
		.retry_with_attempts(
			|| async move { backend.sync_withdrawals(view_key, 0).await },
			context.withdrawal_retry,
		)
		.await?;
	if !withdrawals.is_success() {
		warn!("Withdrawal sync exhausted, continuing with balance data");
	}

	Ok(backend.get_user_data(view_key).await?)
}
