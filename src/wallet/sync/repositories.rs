use crate::wallet::ClientError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// File name of the fetch-time list inside the data directory.
const FETCH_TIMES_FILE: &str = "user_data_fetch.json";

/// Repository for the last successful sync time of each account.
///
/// Only the freshness window reads it. Addresses compare case-insensitively.
#[async_trait::async_trait]
pub trait FetchTimeStore: Send + Sync {
	async fn last_fetch(&self, address: &str) -> Result<Option<DateTime<Utc>>, ClientError>;
	async fn record_fetch(&self, address: &str, at: DateTime<Utc>) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct FetchRecord {
	address: String,
	fetch_date: DateTime<Utc>,
}

/// File-based implementation of FetchTimeStore
///
/// Keeps one JSON list of `{ address, fetchDate }` records. Writes go to a sibling temp
/// file that is renamed over the list, so readers never see a partial file.
pub struct FileFetchTimeStore {
	path: PathBuf,
	lock: tokio::sync::Mutex<()>,
}

impl FileFetchTimeStore {
	pub fn new(data_dir: impl AsRef<Path>) -> Self {
		Self {
			path: data_dir.as_ref().join(FETCH_TIMES_FILE),
			lock: tokio::sync::Mutex::new(()),
		}
	}

	async fn load(&self) -> Result<Vec<FetchRecord>, ClientError> {
		if !tokio::fs::try_exists(&self.path).await? {
			return Ok(Vec::new());
		}

		let contents = tokio::fs::read_to_string(&self.path).await?;
		if contents.trim().is_empty() {
			return Ok(Vec::new());
		}
		match serde_json::from_str(&contents) {
			Ok(records) => Ok(records),
			Err(e) => {
				warn!(
					"Discarding unreadable fetch times in {:?}: {}",
					self.path, e
				);
				Ok(Vec::new())
			}
		}
	}

	async fn store(&self, records: &[FetchRecord]) -> Result<(), ClientError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, serde_json::to_string_pretty(records)?).await?;
		tokio::fs::rename(&tmp, &self.path).await?;
		Ok(())
	}
}

#[async_trait::async_trait]
impl FetchTimeStore for FileFetchTimeStore {
	async fn last_fetch(&self, address: &str) -> Result<Option<DateTime<Utc>>, ClientError> {
		let _lock = self.lock.lock().await;
		Ok(self
			.load()
			.await?
			.into_iter()
			.find(|r| r.address.eq_ignore_ascii_case(address))
			.map(|r| r.fetch_date))
	}

	async fn record_fetch(&self, address: &str, at: DateTime<Utc>) -> Result<(), ClientError> {
		let _lock = self.lock.lock().await;

		let mut records = self.load().await?;
		records.retain(|r| !r.address.eq_ignore_ascii_case(address));
		records.push(FetchRecord {
			address: address.to_lowercase(),
			fetch_date: at,
		});

		self.store(&records).await?;

		debug!("Recorded fetch time {} for {}", at.to_rfc3339(), address);
		Ok(())
	}
}

/// In-memory implementation of FetchTimeStore
#[derive(Default)]
pub struct MemoryFetchTimeStore {
	records: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryFetchTimeStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
		self.records.lock().unwrap_or_else(|e| e.into_inner())
	}
}

#[async_trait::async_trait]
impl FetchTimeStore for MemoryFetchTimeStore {
	async fn last_fetch(&self, address: &str) -> Result<Option<DateTime<Utc>>, ClientError> {
		Ok(self.records().get(&address.to_lowercase()).copied())
	}

	async fn record_fetch(&self, address: &str, at: DateTime<Utc>) -> Result<(), ClientError> {
		self.records().insert(address.to_lowercase(), at);
		Ok(())
	}
}

/// Opens the file store under `data_dir`, falling back to memory when it cannot be created.
pub async fn open_fetch_time_store(data_dir: &Path) -> Arc<dyn FetchTimeStore> {
	match tokio::fs::create_dir_all(data_dir).await {
		Ok(()) => Arc::new(FileFetchTimeStore::new(data_dir)),
		Err(e) => {
			info!(
				"Data directory {:?} unavailable ({}), keeping fetch times in memory",
				data_dir, e
			);
			Arc::new(MemoryFetchTimeStore::new())
		}
	}
}
