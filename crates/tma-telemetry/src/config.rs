// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolved client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tma_telemetry_core::TrackLevel;

use crate::batch::BatchConfig;
use crate::error::{Result, TelemetryError};

/// Default number of queued events that triggers an eager flush.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default interval between timer-driven flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Default queue capacity before the oldest events are dropped.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
/// Default timeout for a single delivery request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked once per failed delivery attempt.
pub type ErrorCallback = Arc<dyn Fn(&TelemetryError) + Send + Sync>;

/// Tenant identification sent with every batch.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub api_key: String,
	pub project_id: String,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("api_key", &"[REDACTED]")
			.field("project_id", &self.project_id)
			.finish()
	}
}

/// Validated, immutable settings consumed by the pipeline.
#[derive(Clone)]
pub struct TelemetryConfig {
	pub endpoint: Url,
	pub credentials: Credentials,
	pub batch: BatchConfig,
	pub request_timeout: Duration,
	pub track_level: TrackLevel,
	pub disabled: bool,
	pub debug: bool,
	pub origin: Option<String>,
	pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for TelemetryConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TelemetryConfig")
			.field("endpoint", &self.endpoint.as_str())
			.field("credentials", &self.credentials)
			.field("batch", &self.batch)
			.field("request_timeout", &self.request_timeout)
			.field("track_level", &self.track_level)
			.field("disabled", &self.disabled)
			.field("debug", &self.debug)
			.field("origin", &self.origin)
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}

/// Unvalidated settings as collected by the builder.
#[derive(Clone, Default)]
pub(crate) struct RawConfig {
	pub endpoint: Option<String>,
	pub api_key: Option<String>,
	pub project_id: Option<String>,
	pub batch_size: Option<usize>,
	pub flush_interval: Option<Duration>,
	pub max_queue_size: Option<usize>,
	pub request_timeout: Option<Duration>,
	pub track_level: Option<u8>,
	pub disabled: bool,
	pub debug: bool,
	pub origin: Option<String>,
	pub on_error: Option<ErrorCallback>,
}

impl RawConfig {
	pub fn validate(self) -> Result<TelemetryConfig> {
		let endpoint = parse_endpoint(self.endpoint.as_deref())?;
		let api_key = required(self.api_key, "API key")?;
		let project_id = required(self.project_id, "project id")?;

		let batch = BatchConfig {
			max_batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
			flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
			max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
		};
		if batch.max_batch_size == 0 {
			return Err(TelemetryError::configuration("batch size must be positive"));
		}
		if batch.flush_interval.is_zero() {
			return Err(TelemetryError::configuration(
				"flush interval must be positive",
			));
		}
		if batch.max_queue_size < batch.max_batch_size {
			return Err(TelemetryError::configuration(format!(
				"max queue size ({}) must be at least the batch size ({})",
				batch.max_queue_size, batch.max_batch_size
			)));
		}

		let track_level = match self.track_level {
			Some(raw) => TrackLevel::try_from(raw)?,
			None => TrackLevel::default(),
		};

		Ok(TelemetryConfig {
			endpoint,
			credentials: Credentials {
				api_key,
				project_id,
			},
			batch,
			request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
			track_level,
			disabled: self.disabled,
			debug: self.debug,
			origin: self.origin,
			on_error: self.on_error,
		})
	}
}

fn parse_endpoint(raw: Option<&str>) -> Result<Url> {
	let raw = raw
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.ok_or_else(|| TelemetryError::configuration("endpoint is required"))?;

	let url = Url::parse(raw)
		.map_err(|e| TelemetryError::configuration(format!("invalid endpoint {raw:?}: {e}")))?;

	match url.scheme() {
		"http" | "https" => Ok(url),
		other => Err(TelemetryError::configuration(format!(
			"endpoint scheme must be http or https, got {other:?}"
		))),
	}
}

fn required(value: Option<String>, what: &str) -> Result<String> {
	value
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
		.ok_or_else(|| TelemetryError::configuration(format!("{what} is required")))
}
