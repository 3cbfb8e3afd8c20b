pub mod backend;
pub mod remote_backend;
pub mod sync;
pub mod types;

pub use backend::{BackendError, SyncBackend, TransferRequest, TxResult, TxStatus};
pub use remote_backend::RemoteSyncService;
pub use types::*;
