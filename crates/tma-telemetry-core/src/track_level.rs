// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Track levels gate which automatic producers run.
//!
//! The level is also attached to each event's context so the collector can tell
//! how much automatic data a session was allowed to produce.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How much the SDK captures automatically.
///
/// Levels are ordered: a producer runs when its minimum level is less than or
/// equal to the configured level.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum TrackLevel {
	/// Only events tracked manually by the host application.
	Manual = 0,
	/// App open/close, visibility, connectivity, and bridge events.
	Lifecycle = 1,
	/// Lifecycle plus scroll milestones, rage clicks, and form submits.
	#[default]
	Interactions = 2,
	/// Everything, including individual clicks.
	Full = 3,
}

impl TrackLevel {
	pub const MAX: u8 = 3;

	pub fn as_u8(self) -> u8 {
		self as u8
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackLevelError {
	#[error("track level {0} is out of range (expected 0..={max})", max = TrackLevel::MAX)]
	OutOfRange(u8),
}

impl TryFrom<u8> for TrackLevel {
	type Error = TrackLevelError;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(TrackLevel::Manual),
			1 => Ok(TrackLevel::Lifecycle),
			2 => Ok(TrackLevel::Interactions),
			3 => Ok(TrackLevel::Full),
			other => Err(TrackLevelError::OutOfRange(other)),
		}
	}
}

impl From<TrackLevel> for u8 {
	fn from(level: TrackLevel) -> Self {
		level.as_u8()
	}
}

impl std::fmt::Display for TrackLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			TrackLevel::Manual => "manual",
			TrackLevel::Lifecycle => "lifecycle",
			TrackLevel::Interactions => "interactions",
			TrackLevel::Full => "full",
		};
		write!(f, "{name}")
	}
}
