// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Automatic event producers.
//!
//! A producer watches some source of activity and turns it into `auto`
//! events through the [`Emitter`] it is handed on start. The client starts
//! every registered producer whose [`Producer::min_track_level`] is at or
//! below the configured track level, and stops them all on shutdown.

use std::sync::Weak;

use tma_telemetry_core::{EventId, EventSource, Properties, TrackLevel};
use tracing::trace;

use crate::error::Result;
use crate::signals::HostSignals;

/// Where emitted events end up. Implemented by the client.
pub(crate) trait EventSink: Send + Sync {
	fn record(&self, name: &str, properties: Properties, source: EventSource) -> Result<EventId>;

	fn is_closed(&self) -> bool;
}

pub trait Producer: Send + Sync {
	fn name(&self) -> &str;

	/// Lowest track level at which this producer runs.
	fn min_track_level(&self) -> TrackLevel;

	/// Begins observing. Called at most once per client, before the batch
	/// scheduler starts.
	fn start(&self, emitter: Emitter);

	/// Stops observing and releases any host subscriptions. Must be idempotent.
	fn stop(&self);
}

/// Producer-side handle to a client.
///
/// Holds the client weakly: once the client is shut down or dropped, emitting
/// is a silent no-op.
#[derive(Clone)]
pub struct Emitter {
	sink: Weak<dyn EventSink>,
	signals: HostSignals,
	track_level: TrackLevel,
}

impl Emitter {
	pub(crate) fn new(sink: Weak<dyn EventSink>, signals: HostSignals, track_level: TrackLevel) -> Self {
		Self {
			sink,
			signals,
			track_level,
		}
	}

	/// Queues an `auto` event. Returns `None` when the client is gone or
	/// refused the event.
	pub fn emit(&self, name: &str, properties: Properties) -> Option<EventId> {
		let sink = self.sink.upgrade()?;
		match sink.record(name, properties, EventSource::Auto) {
			Ok(id) => Some(id),
			Err(e) => {
				trace!(event = name, error = %e, "Producer event dropped");
				None
			}
		}
	}

	/// The host signal registry the client listens on.
	pub fn host_signals(&self) -> &HostSignals {
		&self.signals
	}

	pub fn track_level(&self) -> TrackLevel {
		self.track_level
	}

	pub fn is_active(&self) -> bool {
		self.sink.upgrade().is_some_and(|s| !s.is_closed())
	}
}

impl std::fmt::Debug for Emitter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Emitter")
			.field("track_level", &self.track_level)
			.field("active", &self.is_active())
			.finish()
	}
}
