// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::EventContext;
use crate::properties::Properties;

/// Unique identifier for a captured event.
///
/// UUIDv7, so ids sort roughly by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EventId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for EventId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
	/// Captured by an automatic producer.
	Auto,
	/// Tracked explicitly by the host application.
	Manual,
}

impl std::fmt::Display for EventSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EventSource::Auto => write!(f, "auto"),
			EventSource::Manual => write!(f, "manual"),
		}
	}
}

/// One captured occurrence.
///
/// Records are immutable once created: fields are only readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
	id: EventId,
	name: String,
	#[serde(default)]
	properties: Properties,
	#[serde(default)]
	context: EventContext,
	source: EventSource,
	captured_at: DateTime<Utc>,
}

impl EventRecord {
	/// Creates a record with a freshly generated id.
	pub fn new(
		name: impl Into<String>,
		properties: Properties,
		context: EventContext,
		source: EventSource,
		captured_at: DateTime<Utc>,
	) -> Self {
		Self {
			id: EventId::new(),
			name: name.into(),
			properties,
			context,
			source,
			captured_at,
		}
	}

	pub fn id(&self) -> EventId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn properties(&self) -> &Properties {
		&self.properties
	}

	pub fn context(&self) -> &EventContext {
		&self.context
	}

	pub fn source(&self) -> EventSource {
		self.source
	}

	pub fn captured_at(&self) -> DateTime<Utc> {
		self.captured_at
	}
}
