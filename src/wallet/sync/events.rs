//! Messages sent from the sync worker back to the scheduler.
//!
//! The worker never touches shared state. It reports exactly one message per job, and the
//! scheduler decides whether the job is still current before committing anything.

use crate::wallet::UserData;

/// Outcome of one sync job
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// The job finished and produced a fresh snapshot for `address`.
    UserData {
        job: u64,
        address: String,
        data: UserData,
    },
    /// The job failed. The previous snapshot stays in place.
    Failed { job: u64, error: String },
}

impl WorkerMessage {
    pub fn job(&self) -> u64 {
        match self {
            WorkerMessage::UserData { job, .. } | WorkerMessage::Failed { job, .. } => *job,
        }
    }
}
