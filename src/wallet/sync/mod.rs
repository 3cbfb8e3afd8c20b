//! Account Synchronization Module
//!
//! This module keeps the locally cached account view in step with the settlement network.
//! It is composed of several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `scheduler`: The main entry point. Owns the snapshot, enforces a single running sync and drives the periodic timer.
//! - `worker`: Runs one sync job in its own task and reports the outcome.
//! - `events`: Messages exchanged between the worker and the scheduler.
//! - `retry`: Cancellable fixed-interval retry shared by every network step.
//! - `repositories`: Persistence of the last fetch time per account.
//!
//! The scheduler delegates sync calls to a worker, commits the worker's result only while its
//! job is current, and exposes the snapshot to the rest of the client.

/// Messages from the sync worker
pub mod events;
/// Fetch-time persistence
pub mod repositories;
/// Cancellable retry primitive
pub mod retry;
/// Single-flight sync orchestrator
pub mod scheduler;
/// Sync worker task
pub mod worker;

pub use events::WorkerMessage;
pub use repositories::{FetchTimeStore, FileFetchTimeStore, MemoryFetchTimeStore, open_fetch_time_store};
pub use retry::{RetryCancelled, RetryController, RetryOutcome, RetryPolicy};
pub use scheduler::{BroadcastGuard, CachedUserData, SchedulerConfig, SyncScheduler, SyncState};
