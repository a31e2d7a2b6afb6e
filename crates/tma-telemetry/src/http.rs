// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP implementations of the delivery primitives.
//!
//! Both paths authenticate with the same headers: `X-API-Key` carries the key
//! and `X-Project-Id` the project. A 403 from the collector therefore means the
//! credentials were refused and maps to [`TelemetryError::InvalidCredentials`].

use std::time::Duration;

use reqwest::header::{CONNECTION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::{Result, TelemetryError};
use crate::transport::{BatchPayload, BatchSender, BeaconSink};
use crate::{SDK_NAME, SDK_VERSION};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const PROJECT_ID_HEADER: &str = "X-Project-Id";

/// Beacons get a short fuse: the page is already going away.
const BEACON_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Returns the SDK User-Agent string.
///
/// Format: `{sdk_name}/{version}`
pub fn user_agent() -> String {
	format!("{SDK_NAME}/{SDK_VERSION}")
}

/// Sends batches with `reqwest`.
pub struct HttpBatchSender {
	client: Client,
	endpoint: Url,
	credentials: Credentials,
}

impl HttpBatchSender {
	pub fn new(endpoint: Url, credentials: Credentials, timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.user_agent(user_agent())
			.timeout(timeout)
			.tcp_keepalive(TCP_KEEPALIVE)
			.build()?;

		Ok(Self {
			client,
			endpoint,
			credentials,
		})
	}
}

#[async_trait::async_trait]
impl BatchSender for HttpBatchSender {
	async fn send_batch(&self, payload: &BatchPayload) -> Result<()> {
		debug!(
			url = %self.endpoint,
			count = payload.updates.len(),
			"Sending event batch"
		);

		let response = self
			.client
			.post(self.endpoint.clone())
			.header(API_KEY_HEADER, &self.credentials.api_key)
			.header(PROJECT_ID_HEADER, &self.credentials.project_id)
			.header(CONNECTION, "keep-alive")
			.json(payload)
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			return Ok(());
		}

		let body = response.text().await.ok();
		let message = error_detail(body.as_deref(), status);

		if status == StatusCode::FORBIDDEN {
			Err(TelemetryError::InvalidCredentials {
				status: status.as_u16(),
				message,
			})
		} else {
			Err(TelemetryError::Api {
				status: status.as_u16(),
				message,
			})
		}
	}
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	details: Option<String>,
	message: Option<String>,
}

/// Picks a human-readable detail for a failed response.
///
/// Uses the body's `details`, then its `message`; falls back to the status
/// reason phrase when the body is absent, not JSON, or has neither field.
pub(crate) fn error_detail(body: Option<&str>, status: StatusCode) -> String {
	let parsed = body.and_then(|raw| serde_json::from_str::<ErrorBody>(raw).ok());
	let non_blank = |s: Option<String>| s.filter(|s| !s.trim().is_empty());

	parsed
		.and_then(|b| non_blank(b.details).or_else(|| non_blank(b.message)))
		.unwrap_or_else(|| {
			status
				.canonical_reason()
				.map(str::to_string)
				.unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
		})
}

/// Beacon delivery over HTTP.
///
/// The request runs on a detached thread with a blocking client, so the call
/// returns as soon as the hand-off succeeds and nothing needs to be polled
/// afterwards.
pub struct HttpBeacon {
	endpoint: Url,
	credentials: Credentials,
	timeout: Duration,
}

impl HttpBeacon {
	pub fn new(endpoint: Url, credentials: Credentials) -> Self {
		Self {
			endpoint,
			credentials,
			timeout: BEACON_TIMEOUT,
		}
	}
}

impl BeaconSink for HttpBeacon {
	fn send_beacon(&self, body: Vec<u8>) -> bool {
		let endpoint = self.endpoint.clone();
		let credentials = self.credentials.clone();
		let timeout = self.timeout;

		let spawned = std::thread::Builder::new()
			.name("tma-telemetry-beacon".to_string())
			.spawn(move || {
				let client = match reqwest::blocking::Client::builder()
					.user_agent(user_agent())
					.timeout(timeout)
					.build()
				{
					Ok(client) => client,
					Err(e) => {
						debug!(error = %e, "Failed to build beacon client");
						return;
					}
				};

				let result = client
					.post(endpoint)
					.header(API_KEY_HEADER, credentials.api_key)
					.header(PROJECT_ID_HEADER, credentials.project_id)
					.header(CONTENT_TYPE, "application/json")
					.body(body)
					.send();

				match result {
					Ok(response) => debug!(status = response.status().as_u16(), "Beacon delivered"),
					Err(e) => debug!(error = %e, "Beacon delivery failed"),
				}
			});

		match spawned {
			Ok(_) => true,
			Err(e) => {
				warn!(error = %e, "Failed to start beacon thread");
				false
			}
		}
	}
}
