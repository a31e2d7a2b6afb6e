// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! App lifecycle and connectivity events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tma_telemetry_core::{Properties, TrackLevel};
use tracing::debug;

use crate::producer::{Emitter, Producer};
use crate::signals::{HostSignal, HostSignals, SubscriptionId};

pub const APP_OPEN: &str = "app_open";
pub const APP_HIDDEN: &str = "app_hidden";
pub const APP_CLOSE: &str = "app_close";
pub const CONNECTIVITY_CHANGE: &str = "connectivity_change";

#[derive(Default)]
struct Running {
	signals: Option<HostSignals>,
	subscriptions: Vec<SubscriptionId>,
}

/// Emits `app_open` on start, then follows the host signals:
///
/// | signal                        | event                           |
/// |-------------------------------|---------------------------------|
/// | visibility hidden             | `app_hidden`                    |
/// | page hide / before unload     | `app_close` (once)              |
/// | online / offline              | `connectivity_change { online }`|
#[derive(Default)]
pub struct LifecycleProducer {
	running: Mutex<Running>,
	closed: Arc<AtomicBool>,
}

impl LifecycleProducer {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Producer for LifecycleProducer {
	fn name(&self) -> &str {
		"lifecycle"
	}

	fn min_track_level(&self) -> TrackLevel {
		TrackLevel::Lifecycle
	}

	fn start(&self, emitter: Emitter) {
		let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
		if running.signals.is_some() {
			return;
		}

		let signals = emitter.host_signals().clone();
		self.closed.store(false, Ordering::SeqCst);
		emitter.emit(APP_OPEN, Properties::new());

		let hidden = emitter.clone();
		running.subscriptions.push(signals.subscribe(HostSignal::VisibilityHidden, move || {
			hidden.emit(APP_HIDDEN, Properties::new());
		}));

		for signal in [HostSignal::PageHide, HostSignal::BeforeUnload] {
			let closing = emitter.clone();
			let closed = self.closed.clone();
			running.subscriptions.push(signals.subscribe(signal, move || {
				if !closed.swap(true, Ordering::SeqCst) {
					closing.emit(APP_CLOSE, Properties::new().insert("trigger", signal.as_str()));
				}
			}));
		}

		for (signal, online) in [(HostSignal::Online, true), (HostSignal::Offline, false)] {
			let changed = emitter.clone();
			running.subscriptions.push(signals.subscribe(signal, move || {
				changed.emit(CONNECTIVITY_CHANGE, Properties::new().insert("online", online));
			}));
		}

		running.signals = Some(signals);
		debug!(subscriptions = running.subscriptions.len(), "Lifecycle producer started");
	}

	fn stop(&self) {
		let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
		let Some(signals) = running.signals.take() else {
			return;
		};
		for id in running.subscriptions.drain(..) {
			signals.unsubscribe(id);
		}
		debug!("Lifecycle producer stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::producer::testing::RecordingSink;
	use tma_telemetry_core::PropertyValue;

	fn started() -> (LifecycleProducer, Arc<RecordingSink>, HostSignals) {
		let signals = HostSignals::new();
		let sink = Arc::new(RecordingSink::default());
		let producer = LifecycleProducer::new();
		producer.start(sink.emitter(signals.clone(), TrackLevel::Lifecycle));
		(producer, sink, signals)
	}

	#[test]
	fn test_start_emits_app_open() {
		let (_producer, sink, _signals) = started();
		assert_eq!(sink.names(), vec![APP_OPEN]);
	}

	#[test]
	fn test_visibility_hidden_emits_app_hidden_each_time() {
		let (_producer, sink, signals) = started();

		signals.notify(HostSignal::VisibilityHidden);
		signals.notify(HostSignal::VisibilityHidden);

		assert_eq!(sink.names(), vec![APP_OPEN, APP_HIDDEN, APP_HIDDEN]);
	}

	#[test]
	fn test_app_close_fires_once_across_unload_signals() {
		let (_producer, sink, signals) = started();

		signals.notify(HostSignal::PageHide);
		signals.notify(HostSignal::BeforeUnload);
		signals.notify(HostSignal::PageHide);

		let events = sink.events();
		let closes: Vec<_> = events.iter().filter(|(n, _, _)| n == APP_CLOSE).collect();
		assert_eq!(closes.len(), 1);
		assert_eq!(
			closes[0].1.get("trigger"),
			Some(&PropertyValue::Text("page_hide".to_string()))
		);
	}

	#[test]
	fn test_connectivity_changes_carry_state() {
		let (_producer, sink, signals) = started();

		signals.notify(HostSignal::Offline);
		signals.notify(HostSignal::Online);

		let online: Vec<Option<bool>> = sink
			.events()
			.iter()
			.filter(|(n, _, _)| n == CONNECTIVITY_CHANGE)
			.map(|(_, p, _)| p.get("online").and_then(PropertyValue::as_bool))
			.collect();
		assert_eq!(online, vec![Some(false), Some(true)]);
	}

	#[test]
	fn test_stop_releases_subscriptions_and_is_idempotent() {
		let (producer, sink, signals) = started();

		producer.stop();
		producer.stop();
		signals.notify(HostSignal::VisibilityHidden);

		assert_eq!(sink.names(), vec![APP_OPEN]);
		assert_eq!(signals.subscriber_count(HostSignal::PageHide), 0);
		assert_eq!(signals.subscriber_count(HostSignal::Online), 0);
	}

	#[test]
	fn test_second_start_is_ignored() {
		let (producer, sink, signals) = started();

		producer.start(sink.emitter(signals.clone(), TrackLevel::Lifecycle));

		assert_eq!(sink.names(), vec![APP_OPEN]);
		assert_eq!(signals.subscriber_count(HostSignal::VisibilityHidden), 1);
	}
}
