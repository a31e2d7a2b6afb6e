// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry SDK.

use thiserror::Error;
use tma_telemetry_core::TrackLevelError;

/// Boxed underlying cause of a network failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Telemetry SDK errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
	/// A required setting is missing or invalid, or the client is not usable.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// The collector rejected the credentials.
	#[error("invalid credentials (status {status}): {message}")]
	InvalidCredentials { status: u16, message: String },

	/// The collector rejected the batch for any other reason.
	#[error("API error (status {status}): {message}")]
	Api { status: u16, message: String },

	/// The attempt never produced a response.
	#[error("network error: {0}")]
	Network(#[source] BoxError),
}

/// The taxonomy of [`TelemetryError`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Configuration,
	InvalidCredentials,
	Api,
	Network,
}

impl TelemetryError {
	pub fn configuration(message: impl Into<String>) -> Self {
		TelemetryError::Configuration(message.into())
	}

	/// Wraps any lower-level failure as a network error.
	pub fn network<E>(cause: E) -> Self
	where
		E: Into<BoxError>,
	{
		TelemetryError::Network(cause.into())
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			TelemetryError::Configuration(_) => ErrorKind::Configuration,
			TelemetryError::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
			TelemetryError::Api { .. } => ErrorKind::Api,
			TelemetryError::Network(_) => ErrorKind::Network,
		}
	}

	/// HTTP status carried by the error, if the collector responded.
	pub fn status(&self) -> Option<u16> {
		match self {
			TelemetryError::InvalidCredentials { status, .. } | TelemetryError::Api { status, .. } => {
				Some(*status)
			}
			_ => None,
		}
	}

	/// Whether a later attempt could plausibly succeed.
	///
	/// The pipeline itself never retries; this is for error callbacks.
	pub fn is_retryable(&self) -> bool {
		match self {
			TelemetryError::Network(_) => true,
			TelemetryError::Api { status, .. } => {
				matches!(*status, 408 | 429 | 500..=599)
			}
			TelemetryError::Configuration(_) | TelemetryError::InvalidCredentials { .. } => false,
		}
	}
}

impl From<reqwest::Error> for TelemetryError {
	fn from(err: reqwest::Error) -> Self {
		TelemetryError::Network(Box::new(err))
	}
}

impl From<serde_json::Error> for TelemetryError {
	fn from(err: serde_json::Error) -> Self {
		TelemetryError::Network(Box::new(err))
	}
}

impl From<TrackLevelError> for TelemetryError {
	fn from(err: TrackLevelError) -> Self {
		TelemetryError::Configuration(err.to_string())
	}
}

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
