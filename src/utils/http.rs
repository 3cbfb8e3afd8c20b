use crate::indexer::{Envelope, ServiceError};

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Builds the shared HTTP client used by every service adapter.
pub fn build_http_client(timeout: Duration) -> Result<Client, ServiceError> {
	Ok(Client::builder().timeout(timeout).build()?)
}

/// Checks the status and decodes a `{ "data": ... }` or bare JSON body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
	let status = response.status();
	let url = response.url().to_string();
	let body = response.text().await?;

	if !status.is_success() {
		debug!("{} returned {}: {}", url, status, body);
		return Err(ServiceError::StatusError {
			status: status.as_u16(),
			url,
			body,
		});
	}

	if body.trim().is_empty() {
		return Err(ServiceError::NoData);
	}

	let envelope: Envelope<T> = serde_json::from_str(&body)?;
	Ok(envelope.into_inner())
}
