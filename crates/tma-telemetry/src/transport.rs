// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batch delivery.
//!
//! [`Transport`] wraps the two delivery primitives the host provides:
//!
//! - an async [`BatchSender`] used for normal flushes, tracked in the pending
//!   set so callers can wait for it, and
//! - an optional synchronous [`BeaconSink`] used during page teardown, where
//!   nothing can be awaited.
//!
//! Which primitive runs is always the caller's choice. The transport never
//! retries and never falls back from one to the other.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tma_telemetry_core::EventRecord;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::config::ErrorCallback;
use crate::error::{Result, TelemetryError};
use crate::pending::PendingRequests;
use crate::signals::{Connectivity, HostSignal, HostSignals, SubscriptionId};

/// Wire payload for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	pub sent_at: DateTime<Utc>,
	pub updates: Vec<EventRecord>,
}

/// Async delivery of a batch to the collector.
#[async_trait::async_trait]
pub trait BatchSender: Send + Sync {
	/// Sends one batch as a single request.
	async fn send_batch(&self, payload: &BatchPayload) -> Result<()>;
}

/// Fire-and-forget delivery that must not block.
pub trait BeaconSink: Send + Sync {
	/// Hands a serialized payload to the platform. Returns whether it was
	/// accepted locally; nothing is known about remote delivery.
	fn send_beacon(&self, body: Vec<u8>) -> bool;
}

/// Delivery behaviour switches taken from the client configuration.
#[derive(Clone, Default)]
pub struct TransportOptions {
	pub disabled: bool,
	pub debug: bool,
	pub origin: Option<String>,
	pub on_error: Option<ErrorCallback>,
}

pub struct Transport {
	sender: Arc<dyn BatchSender>,
	beacon: Option<Arc<dyn BeaconSink>>,
	options: TransportOptions,
	connectivity: Connectivity,
	pending: PendingRequests,
	signals: HostSignals,
	subscriptions: Vec<SubscriptionId>,
	runtime: Handle,
}

impl Transport {
	/// Creates a transport and subscribes it to connectivity signals for its
	/// lifetime.
	pub fn new(
		sender: Arc<dyn BatchSender>,
		beacon: Option<Arc<dyn BeaconSink>>,
		options: TransportOptions,
		signals: &HostSignals,
		runtime: Handle,
	) -> Self {
		let connectivity = Connectivity::new();

		let online = connectivity.clone();
		let offline = connectivity.clone();
		let subscriptions = vec![
			signals.subscribe(HostSignal::Online, move || online.set_online(true)),
			signals.subscribe(HostSignal::Offline, move || offline.set_online(false)),
		];

		Self {
			sender,
			beacon,
			options,
			connectivity,
			pending: PendingRequests::new(),
			signals: signals.clone(),
			subscriptions,
			runtime,
		}
	}

	pub fn connectivity(&self) -> &Connectivity {
		&self.connectivity
	}

	pub fn has_beacon(&self) -> bool {
		self.beacon.is_some()
	}

	/// Number of `send` attempts that have not settled yet.
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Delivers `records` and waits for the outcome.
	///
	/// Empty batches, a disabled client, and an offline host all succeed
	/// immediately without touching the network.
	pub async fn send(&self, records: Vec<EventRecord>) -> Result<()> {
		if self.skip_send(&records) {
			return Ok(());
		}
		let _guard = self.pending.register();
		self.deliver(records).await
	}

	/// Starts delivering `records` on the runtime without waiting.
	///
	/// The attempt joins the pending set before this returns, so a following
	/// [`Transport::flush`] waits for it.
	pub fn spawn_send(self: &Arc<Self>, records: Vec<EventRecord>) {
		if self.skip_send(&records) {
			return;
		}
		let guard = self.pending.register();
		let transport = Arc::clone(self);
		self.runtime.spawn(async move {
			let _guard = guard;
			// Failures are already logged and reported by `deliver`.
			let _ = transport.deliver(records).await;
		});
	}

	/// Hands `records` to the beacon primitive without blocking.
	///
	/// Connectivity is deliberately not checked here: the online flag is a
	/// heuristic and the beacon fails on its own if the host is unreachable.
	pub fn send_beacon(&self, records: Vec<EventRecord>) -> bool {
		if records.is_empty() || self.options.disabled {
			return true;
		}

		let Some(beacon) = &self.beacon else {
			debug!(count = records.len(), "Beacon unavailable on this host");
			return false;
		};

		let count = records.len();
		let body = match serde_json::to_vec(&self.payload(records)) {
			Ok(body) => body,
			Err(e) => {
				warn!(error = %e, count, "Failed to serialize beacon payload");
				return false;
			}
		};

		let accepted = beacon.send_beacon(body);
		debug!(count, accepted, "Beacon handed off");
		accepted
	}

	/// Waits for every `send` that is in flight right now. Beacons are not
	/// tracked.
	pub async fn flush(&self) {
		self.pending.wait_all().await;
	}

	fn skip_send(&self, records: &[EventRecord]) -> bool {
		if records.is_empty() {
			return true;
		}
		if self.options.disabled {
			debug!(count = records.len(), "Telemetry disabled, skipping send");
			return true;
		}
		if !self.connectivity.is_online() {
			debug!(count = records.len(), "Host offline, skipping send");
			return true;
		}
		false
	}

	fn payload(&self, records: Vec<EventRecord>) -> BatchPayload {
		BatchPayload {
			origin: self.options.origin.clone(),
			sent_at: Utc::now(),
			updates: records,
		}
	}

	async fn deliver(&self, records: Vec<EventRecord>) -> Result<()> {
		let count = records.len();
		let payload = self.payload(records);

		match self.sender.send_batch(&payload).await {
			Ok(()) => {
				debug!(count, "Delivered event batch");
				Ok(())
			}
			Err(e) => {
				self.report_failure(&e, count);
				Err(e)
			}
		}
	}

	fn report_failure(&self, error: &TelemetryError, count: usize) {
		if self.options.debug {
			warn!(error = %error, kind = ?error.kind(), count, "Failed to deliver event batch");
		} else {
			debug!(error = %error, kind = ?error.kind(), count, "Failed to deliver event batch");
		}

		if let Some(callback) = &self.options.on_error {
			if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
				error!(kind = ?error.kind(), "Telemetry error callback panicked");
			}
		}
	}
}

impl Drop for Transport {
	fn drop(&mut self) {
		for id in self.subscriptions.drain(..) {
			self.signals.unsubscribe(id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::test_support::{event, MockBeacon, MockSender};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	fn transport(
		sender: Arc<MockSender>,
		beacon: Option<Arc<MockBeacon>>,
		options: TransportOptions,
		signals: &HostSignals,
	) -> Arc<Transport> {
		Arc::new(Transport::new(
			sender,
			beacon.map(|b| b as Arc<dyn BeaconSink>),
			options,
			signals,
			Handle::current(),
		))
	}

	#[tokio::test]
	async fn test_send_delivers_whole_batch_in_one_call() {
		let sender = Arc::new(MockSender::new());
		let t = transport(sender.clone(), None, TransportOptions::default(), &HostSignals::new());

		t.send(vec![event("a"), event("b")]).await.unwrap();

		let batches = sender.batches();
		assert_eq!(batches.len(), 1);
		assert_eq!(batches[0].len(), 2);
		assert_eq!(t.pending_len(), 0);
	}

	#[tokio::test]
	async fn test_send_attaches_origin() {
		let sender = Arc::new(MockSender::new());
		let options = TransportOptions {
			origin: Some("https://app.example".to_string()),
			..Default::default()
		};
		let t = transport(sender.clone(), None, options, &HostSignals::new());

		t.send(vec![event("a")]).await.unwrap();

		let payloads = sender.payloads();
		assert_eq!(payloads[0].origin.as_deref(), Some("https://app.example"));
	}

	#[tokio::test]
	async fn test_empty_batch_is_noop() {
		let sender = Arc::new(MockSender::new());
		let beacon = Arc::new(MockBeacon::accepting());
		let t = transport(
			sender.clone(),
			Some(beacon.clone()),
			TransportOptions::default(),
			&HostSignals::new(),
		);

		t.send(Vec::new()).await.unwrap();
		assert!(t.send_beacon(Vec::new()));

		assert_eq!(sender.call_count(), 0);
		assert_eq!(beacon.call_count(), 0);
	}

	#[tokio::test]
	async fn test_disabled_skips_both_paths() {
		let sender = Arc::new(MockSender::new());
		let beacon = Arc::new(MockBeacon::accepting());
		let options = TransportOptions {
			disabled: true,
			..Default::default()
		};
		let t = transport(sender.clone(), Some(beacon.clone()), options, &HostSignals::new());

		t.send(vec![event("a")]).await.unwrap();
		assert!(t.send_beacon(vec![event("a")]));

		assert_eq!(sender.call_count(), 0);
		assert_eq!(beacon.call_count(), 0);
	}

	#[tokio::test]
	async fn test_offline_skips_send_but_not_beacon() {
		let signals = HostSignals::new();
		let sender = Arc::new(MockSender::new());
		let beacon = Arc::new(MockBeacon::accepting());
		let t = transport(
			sender.clone(),
			Some(beacon.clone()),
			TransportOptions::default(),
			&signals,
		);

		signals.notify(HostSignal::Offline);
		assert!(!t.connectivity().is_online());

		t.send(vec![event("a")]).await.unwrap();
		assert_eq!(sender.call_count(), 0);

		assert!(t.send_beacon(vec![event("b")]));
		assert_eq!(beacon.call_count(), 1);

		signals.notify(HostSignal::Online);
		t.send(vec![event("c")]).await.unwrap();
		assert_eq!(sender.call_count(), 1);
	}

	#[tokio::test]
	async fn test_missing_beacon_returns_false() {
		let sender = Arc::new(MockSender::new());
		let t = transport(sender.clone(), None, TransportOptions::default(), &HostSignals::new());

		assert!(!t.send_beacon(vec![event("a"), event("b")]));
		assert_eq!(sender.call_count(), 0);
	}

	#[tokio::test]
	async fn test_beacon_result_is_propagated() {
		let beacon = Arc::new(MockBeacon::rejecting());
		let t = transport(
			Arc::new(MockSender::new()),
			Some(beacon.clone()),
			TransportOptions::default(),
			&HostSignals::new(),
		);

		assert!(!t.send_beacon(vec![event("a")]));

		let bodies = beacon.payloads();
		assert_eq!(bodies.len(), 1);
		assert_eq!(bodies[0].updates[0].name(), "a");
	}

	#[tokio::test]
	async fn test_failure_invokes_callback_once() {
		let sender = Arc::new(MockSender::failing_with(|| TelemetryError::Api {
			status: 500,
			message: "boom".into(),
		}));
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen_cb = seen.clone();
		let options = TransportOptions {
			on_error: Some(Arc::new(move |e: &TelemetryError| {
				seen_cb.lock().unwrap().push(e.kind());
			})),
			..Default::default()
		};
		let t = transport(sender, None, options, &HostSignals::new());

		let err = t.send(vec![event("a")]).await.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::Api);
		assert_eq!(*seen.lock().unwrap(), vec![ErrorKind::Api]);
		assert_eq!(t.pending_len(), 0);
	}

	#[tokio::test]
	async fn test_panicking_callback_is_contained() {
		let sender = Arc::new(MockSender::failing_with(|| {
			TelemetryError::network("connection reset")
		}));
		let calls = Arc::new(AtomicUsize::new(0));
		let calls_cb = calls.clone();
		let options = TransportOptions {
			debug: true,
			on_error: Some(Arc::new(move |_: &TelemetryError| {
				calls_cb.fetch_add(1, Ordering::SeqCst);
				panic!("callback failure");
			})),
			..Default::default()
		};
		let t = transport(sender, None, options, &HostSignals::new());

		let err = t.send(vec![event("a")]).await.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::Network);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_spawn_send_registers_before_returning() {
		let sender = Arc::new(MockSender::gated());
		let t = transport(sender.clone(), None, TransportOptions::default(), &HostSignals::new());

		t.spawn_send(vec![event("a")]);
		assert_eq!(t.pending_len(), 1);

		sender.release(1);
		t.flush().await;

		assert_eq!(t.pending_len(), 0);
		assert_eq!(sender.call_count(), 1);
	}

	#[tokio::test]
	async fn test_flush_waits_for_all_inflight_sends() {
		let sender = Arc::new(MockSender::gated());
		let t = transport(sender.clone(), None, TransportOptions::default(), &HostSignals::new());

		t.spawn_send(vec![event("a")]);
		t.spawn_send(vec![event("b")]);

		let flushing = tokio::spawn({
			let t = t.clone();
			async move { t.flush().await }
		});
		tokio::task::yield_now().await;
		assert!(!flushing.is_finished());

		sender.release(2);
		flushing.await.unwrap();
		assert_eq!(sender.call_count(), 2);
	}

	#[tokio::test]
	async fn test_drop_unsubscribes_connectivity() {
		let signals = HostSignals::new();
		let t = transport(
			Arc::new(MockSender::new()),
			None,
			TransportOptions::default(),
			&signals,
		);
		assert_eq!(signals.subscriber_count(HostSignal::Offline), 1);

		drop(t);
		assert_eq!(signals.subscriber_count(HostSignal::Offline), 0);
		assert_eq!(signals.subscriber_count(HostSignal::Online), 0);
	}
}
