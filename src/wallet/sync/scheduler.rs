//! Sync scheduler and integration point for the account view.
//!
//! `SyncScheduler` owns the cached `UserData` snapshot and guarantees that at most one sync
//! job runs at a time. A job is delegated to a worker task; the worker reports back over a
//! channel and the scheduler commits the result only if the job is still the current one.
//!
//! The scheduler is responsible for:
//! - Idle to Syncing to Idle transitions, refusing a second sync while one runs
//! - Blocking new syncs while a transaction broadcast is in progress
//! - Serving the snapshot within the freshness window and refreshing it when stale
//! - Re-arming a fresh worker on every periodic tick while an account is logged in
//!
//! The snapshot and the state are published through `watch` channels, so readers always
//! see the last committed value and writers replace it wholesale.

use super::events::WorkerMessage;
use super::repositories::FetchTimeStore;
use super::retry::{RetryController, RetryPolicy};
use super::worker::{SyncJob, WorkerContext, WorkerHandle};
use crate::config::ClientConfig;
use crate::wallet::{ClientError, Session, SyncBackend, UserData};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Pause between terminating a worker and starting its replacement.
const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing { job: u64 },
}

/// The committed account view.
#[derive(Debug, Clone)]
pub struct CachedUserData {
    pub address: String,
    pub data: Arc<UserData>,
    pub fetched_at: DateTime<Utc>,
    /// Job that produced the snapshot, `None` when read through outside a sync.
    pub job: Option<u64>,
}

/// Timing and retry settings of the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_interval: Duration,
    pub freshness_window: Duration,
    pub sync_retry: RetryPolicy,
    pub withdrawal_retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            freshness_window: Duration::from_secs(180),
            sync_retry: RetryPolicy::new(Duration::from_secs(10), 5),
            withdrawal_retry: RetryPolicy::new(Duration::from_secs(1), 5),
        }
    }
}

impl From<&ClientConfig> for SchedulerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            sync_interval: config.sync_interval(),
            freshness_window: config.freshness_window(),
            sync_retry: config.sync_retry,
            withdrawal_retry: config.withdrawal_retry,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the broadcast flag when dropped.
pub struct BroadcastGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BroadcastGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        debug!("Broadcast finished, periodic sync unblocked");
    }
}

/// Single-flight sync orchestrator
pub struct SyncScheduler {
    backend: Arc<dyn SyncBackend>,
    retry: Arc<RetryController>,
    store: Arc<dyn FetchTimeStore>,
    config: SchedulerConfig,

    state: watch::Sender<SyncState>,
    snapshot: watch::Sender<Option<CachedUserData>>,
    session: RwLock<Option<Session>>,
    broadcast_in_progress: AtomicBool,

    worker: Mutex<Option<WorkerHandle>>,
    last_failure: Mutex<Option<(u64, String)>>,
    next_job: AtomicU64,
    messages: mpsc::UnboundedSender<WorkerMessage>,

    listener: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Create the scheduler and start its message listener. Must be called inside a Tokio runtime.
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        retry: Arc<RetryController>,
        store: Arc<dyn FetchTimeStore>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (messages, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SyncState::Idle);
        let (snapshot, _) = watch::channel(None);

        let scheduler = Arc::new(Self {
            backend,
            retry,
            store,
            config,
            state,
            snapshot,
            session: RwLock::new(None),
            broadcast_in_progress: AtomicBool::new(false),
            worker: Mutex::new(None),
            last_failure: Mutex::new(None),
            next_job: AtomicU64::new(0),
            messages,
            listener: Mutex::new(None),
            ticker: Mutex::new(None),
        });

        let listener = tokio::spawn(Self::listen(Arc::downgrade(&scheduler), receiver));
        *lock(&scheduler.listener) = Some(listener);
        scheduler
    }

    async fn listen(scheduler: Weak<Self>, mut receiver: mpsc::UnboundedReceiver<WorkerMessage>) {
        while let Some(message) = receiver.recv().await {
            let Some(scheduler) = scheduler.upgrade() else {
                break;
            };
            scheduler.handle_message(message).await;
        }
    }

    async fn handle_message(&self, message: WorkerMessage) {
        let job = message.job();
        if self.state() != (SyncState::Syncing { job }) {
            debug!("Discarding message from superseded job {}", job);
            return;
        }

        match message {
            WorkerMessage::UserData { address, data, .. } => {
                if self.is_current_account(&address) {
                    let fetched_at = Utc::now();
                    self.snapshot.send_replace(Some(CachedUserData {
                        address: address.clone(),
                        data: Arc::new(data),
                        fetched_at,
                        job: Some(job),
                    }));
                    info!("Committed user data from job {}", job);

                    if let Err(e) = self.store.record_fetch(&address, fetched_at).await {
                        warn!("Failed to record fetch time for {}: {}", address, e);
                    }
                } else {
                    debug!("Account changed during job {}, discarding snapshot", job);
                }
            }
            WorkerMessage::Failed { error, .. } => {
                error!("Sync job {} failed: {}", job, error);
                *lock(&self.last_failure) = Some((job, error));
            }
        }

        self.finish(job);
    }

    fn finish(&self, job: u64) {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| w.job() == job) {
            worker.take();
        }
        self.state.send_if_modified(|state| {
            if *state == (SyncState::Syncing { job }) {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            backend: self.backend.clone(),
            retry: self.retry.clone(),
            sync_retry: self.config.sync_retry,
            withdrawal_retry: self.config.withdrawal_retry,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self.state(), SyncState::Syncing { .. })
    }

    pub fn is_broadcast_in_progress(&self) -> bool {
        self.broadcast_in_progress.load(Ordering::SeqCst)
    }

    /// Mark a broadcast as running until the guard is dropped.
    ///
    /// The flag is raised under the worker lock, the same lock `start_sync` holds while it
    /// checks the flag and spawns a worker.
    pub fn begin_broadcast(&self) -> Result<BroadcastGuard<'_>, ClientError> {
        let _worker = lock(&self.worker);
        self.broadcast_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ClientError::BroadcastInProgress)?;
        Ok(BroadcastGuard {
            flag: &self.broadcast_in_progress,
        })
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn is_current_account(&self, address: &str) -> bool {
        self.session()
            .is_some_and(|session| session.is_same_account(address))
    }

    /// Install the account. Switching to another address drops the worker and the snapshot.
    pub fn login(&self, session: Session) {
        let switched = {
            let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
            let switched = current
                .as_ref()
                .is_some_and(|c| !c.is_same_account(&session.address));
            *current = Some(session.clone());
            switched
        };

        if switched {
            self.terminate();
        }
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot
                .as_ref()
                .is_some_and(|c| !session.is_same_account(&c.address))
            {
                *snapshot = None;
                true
            } else {
                false
            }
        });
        info!("Logged in as {}", session.address);
    }

    pub fn logout(&self) {
        self.terminate();
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.snapshot.send_replace(None);
        info!("Logged out");
    }

    /// Latest committed snapshot for the logged-in account.
    pub fn user_data(&self) -> Option<Arc<UserData>> {
        let session = self.session()?;
        self.cached_for(&session.address).map(|c| c.data)
    }

    pub fn cached(&self) -> Option<CachedUserData> {
        self.snapshot.borrow().clone()
    }

    fn cached_for(&self, address: &str) -> Option<CachedUserData> {
        self.snapshot
            .borrow()
            .as_ref()
            .filter(|c| c.address.eq_ignore_ascii_case(address))
            .cloned()
    }

    /// Start a sync job unless one is running, a broadcast is in progress, or nobody is
    /// logged in. Returns the new job id.
    pub fn start_sync(&self) -> Option<u64> {
        let session = self.session()?;

        let mut worker = lock(&self.worker);
        if self.is_broadcast_in_progress() {
            debug!("Broadcast in progress, not starting a sync");
            return None;
        }
        let job = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        let started = self.state.send_if_modified(|state| match state {
            SyncState::Idle => {
                *state = SyncState::Syncing { job };
                true
            }
            SyncState::Syncing { .. } => false,
        });
        if !started {
            debug!("Sync already in progress");
            return None;
        }

        *worker = Some(WorkerHandle::spawn(
            SyncJob { id: job, session },
            self.worker_context(),
            self.messages.clone(),
        ));
        info!("Started sync job {}", job);
        Some(job)
    }

    /// Abort the running worker, if any, and return to Idle. Its results are discarded.
    pub fn terminate(&self) -> bool {
        let mut worker = lock(&self.worker);
        let handle = worker.take();
        let was_syncing = self.state.send_if_modified(|state| {
            if matches!(state, SyncState::Syncing { .. }) {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });

        if let Some(handle) = handle {
            handle.terminate();
        }
        if was_syncing {
            info!("Terminated running sync worker");
        }
        was_syncing
    }

    /// Terminate the current worker and start a fresh one.
    pub async fn restart(&self) -> Option<u64> {
        self.terminate();
        tokio::time::sleep(RESTART_DELAY).await;
        self.start_sync()
    }

    /// Wait until `job` is no longer the running job.
    pub async fn wait_for_job(&self, job: u64) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s != SyncState::Syncing { job }).await;
    }

    pub async fn wait_idle(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == SyncState::Idle).await;
    }

    /// Run a sync to completion and return its snapshot.
    pub async fn sync_now(&self) -> Result<Arc<UserData>, ClientError> {
        let session = self.session().ok_or(ClientError::NotLoggedIn)?;
        if self.is_syncing() {
            return Err(ClientError::SyncInProgress);
        }
        if self.is_broadcast_in_progress() {
            return Err(ClientError::BroadcastInProgress);
        }

        let job = self.start_sync().ok_or(ClientError::SyncInProgress)?;
        self.wait_for_job(job).await;

        if let Some(cached) = self
            .cached_for(&session.address)
            .filter(|c| c.job == Some(job))
        {
            return Ok(cached.data);
        }

        match lock(&self.last_failure).as_ref() {
            Some((failed, error)) if *failed == job => Err(ClientError::SyncFailed(error.clone())),
            _ => Err(ClientError::SyncFailed(format!(
                "sync job {} was terminated",
                job
            ))),
        }
    }

    async fn is_fresh(&self, address: &str) -> Result<bool, ClientError> {
        let Some(last) = self.store.last_fetch(address).await? else {
            return Ok(false);
        };
        let elapsed = (Utc::now() - last).to_std().unwrap_or_default();
        Ok(elapsed < self.config.freshness_window)
    }

    /// Account view for callers.
    ///
    /// Within the freshness window the committed snapshot is returned as is. Outside it the
    /// library is read directly and a background sync is started.
    pub async fn fetch_user_data(&self) -> Result<Arc<UserData>, ClientError> {
        let session = self.session().ok_or(ClientError::NotLoggedIn)?;

        if self.is_fresh(&session.address).await? {
            if let Some(cached) = self.cached_for(&session.address) {
                return Ok(cached.data);
            }
            return self.read_through(&session).await;
        }

        let data = self.read_through(&session).await?;
        if self.start_sync().is_none() {
            debug!("User data is stale but no sync could be started");
        }
        Ok(data)
    }

    async fn read_through(&self, session: &Session) -> Result<Arc<UserData>, ClientError> {
        let data = Arc::new(self.backend.get_user_data(&session.view_key).await?);

        self.snapshot.send_if_modified(|snapshot| {
            let has_snapshot = snapshot
                .as_ref()
                .is_some_and(|c| session.is_same_account(&c.address));
            if has_snapshot || !self.is_current_account(&session.address) {
                return false;
            }
            *snapshot = Some(CachedUserData {
                address: session.address.clone(),
                data: data.clone(),
                fetched_at: Utc::now(),
                job: None,
            });
            true
        });
        Ok(data)
    }

    /// Start the periodic timer. Each tick restarts the worker while an account is logged
    /// in and no broadcast is running.
    pub fn start_periodic(self: &Arc<Self>) {
        let scheduler = Arc::downgrade(self);
        let period = self.config.sync_interval;
        if period.is_zero() {
            warn!("Sync interval is zero, periodic sync not started");
            return;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.tick().await;
            }
        });

        if let Some(previous) = lock(&self.ticker).replace(handle) {
            previous.abort();
        }
        info!("Periodic sync every {:?}", period);
    }

    pub fn stop_periodic(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
    }

    /// One periodic tick. Returns true when a fresh worker was started.
    pub async fn tick(&self) -> bool {
        if self.session().is_none() {
            debug!("Skipping periodic sync: not logged in");
            return false;
        }
        if self.is_broadcast_in_progress() {
            debug!("Skipping periodic sync: broadcast in progress");
            return false;
        }
        self.restart().await.is_some()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop_periodic();
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}
