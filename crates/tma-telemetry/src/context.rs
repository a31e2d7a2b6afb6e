// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host context snapshots.

use tma_telemetry_core::EventContext;

/// Supplies the host environment at the moment an event is captured.
///
/// Called once per emitted event, on the emitting thread. Implementations
/// should return quickly and must not call back into the client.
pub trait ContextProvider: Send + Sync {
	fn snapshot(&self) -> EventContext;
}

/// A provider that always returns the same context.
#[derive(Debug, Clone, Default)]
pub struct StaticContext(EventContext);

impl StaticContext {
	pub fn new(context: EventContext) -> Self {
		Self(context)
	}
}

impl ContextProvider for StaticContext {
	fn snapshot(&self) -> EventContext {
		self.0.clone()
	}
}

impl<F> ContextProvider for F
where
	F: Fn() -> EventContext + Send + Sync,
{
	fn snapshot(&self) -> EventContext {
		self()
	}
}
