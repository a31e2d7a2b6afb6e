// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host lifecycle and connectivity signals.
//!
//! The host adapter calls [`HostSignals::notify`] whenever the platform reports
//! a change; the pipeline only subscribes. Callbacks run synchronously on the
//! notifying thread, in subscription order, so a page-teardown handler gets
//! its work done before `notify` returns.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

/// A signal the host platform can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSignal {
	Online,
	Offline,
	VisibilityHidden,
	PageHide,
	BeforeUnload,
}

impl HostSignal {
	/// Signals that mean the page may be gone before async work completes.
	pub const UNLOAD: [HostSignal; 3] = [
		HostSignal::VisibilityHidden,
		HostSignal::PageHide,
		HostSignal::BeforeUnload,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			HostSignal::Online => "online",
			HostSignal::Offline => "offline",
			HostSignal::VisibilityHidden => "visibility_hidden",
			HostSignal::PageHide => "page_hide",
			HostSignal::BeforeUnload => "before_unload",
		}
	}
}

impl std::fmt::Display for HostSignal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Handle returned by [`HostSignals::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
	next_id: u64,
	subscribers: Vec<(SubscriptionId, HostSignal, Callback)>,
}

/// Registry of host signal subscribers.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct HostSignals {
	registry: Arc<Mutex<Registry>>,
}

impl HostSignals {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `callback` to run every time `signal` is notified.
	pub fn subscribe<F>(&self, signal: HostSignal, callback: F) -> SubscriptionId
	where
		F: Fn() + Send + Sync + 'static,
	{
		let mut registry = self.lock();
		let id = SubscriptionId(registry.next_id);
		registry.next_id += 1;
		registry.subscribers.push((id, signal, Arc::new(callback)));
		id
	}

	/// Like [`subscribe`](Self::subscribe), but `callback` runs ahead of every
	/// subscriber already registered for `signal`.
	pub fn subscribe_first<F>(&self, signal: HostSignal, callback: F) -> SubscriptionId
	where
		F: Fn() + Send + Sync + 'static,
	{
		let mut registry = self.lock();
		let id = SubscriptionId(registry.next_id);
		registry.next_id += 1;
		registry.subscribers.insert(0, (id, signal, Arc::new(callback)));
		id
	}

	/// Removes a subscription. Returns false if it was already gone.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut registry = self.lock();
		let before = registry.subscribers.len();
		registry.subscribers.retain(|(sub_id, _, _)| *sub_id != id);
		registry.subscribers.len() != before
	}

	/// Delivers `signal` to its subscribers and returns how many ran.
	///
	/// A subscription removed by an earlier callback of the same delivery is
	/// skipped.
	pub fn notify(&self, signal: HostSignal) -> usize {
		// Callbacks may subscribe or unsubscribe, so they run outside the lock.
		let callbacks: Vec<(SubscriptionId, Callback)> = self
			.lock()
			.subscribers
			.iter()
			.filter(|(_, s, _)| *s == signal)
			.map(|(id, _, cb)| (*id, Arc::clone(cb)))
			.collect();

		debug!(signal = %signal, subscribers = callbacks.len(), "Host signal received");

		let mut ran = 0;
		for (id, callback) in &callbacks {
			if !self.is_subscribed(*id) {
				continue;
			}
			ran += 1;
			if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
				error!(signal = %signal, "Host signal subscriber panicked");
			}
		}
		ran
	}

	pub fn subscriber_count(&self, signal: HostSignal) -> usize {
		self.lock()
			.subscribers
			.iter()
			.filter(|(_, s, _)| *s == signal)
			.count()
	}

	fn is_subscribed(&self, id: SubscriptionId) -> bool {
		self.lock().subscribers.iter().any(|(sub_id, _, _)| *sub_id == id)
	}

	fn lock(&self) -> MutexGuard<'_, Registry> {
		self.registry.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Online/offline flag. Starts online so hosts without connectivity signals
/// still deliver.
#[derive(Debug, Clone)]
pub struct Connectivity {
	online: Arc<AtomicBool>,
}

impl Connectivity {
	pub fn new() -> Self {
		Self {
			online: Arc::new(AtomicBool::new(true)),
		}
	}

	pub fn is_online(&self) -> bool {
		self.online.load(Ordering::SeqCst)
	}

	pub fn set_online(&self, online: bool) {
		let was = self.online.swap(online, Ordering::SeqCst);
		if was != online {
			debug!(online, "Connectivity changed");
		}
	}
}

impl Default for Connectivity {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;

	#[test]
	fn test_notify_runs_matching_subscribers_only() {
		let signals = HostSignals::new();
		let hidden = Arc::new(AtomicUsize::new(0));
		let offline = Arc::new(AtomicUsize::new(0));

		let h = hidden.clone();
		signals.subscribe(HostSignal::PageHide, move || {
			h.fetch_add(1, Ordering::SeqCst);
		});
		let o = offline.clone();
		signals.subscribe(HostSignal::Offline, move || {
			o.fetch_add(1, Ordering::SeqCst);
		});

		assert_eq!(signals.notify(HostSignal::PageHide), 1);
		assert_eq!(signals.notify(HostSignal::PageHide), 1);
		assert_eq!(signals.notify(HostSignal::Online), 0);

		assert_eq!(hidden.load(Ordering::SeqCst), 2);
		assert_eq!(offline.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_subscribers_run_in_subscription_order() {
		let signals = HostSignals::new();
		let order = Arc::new(Mutex::new(Vec::new()));
		for n in 0..3 {
			let order = order.clone();
			signals.subscribe(HostSignal::BeforeUnload, move || {
				order.lock().unwrap().push(n);
			});
		}

		signals.notify(HostSignal::BeforeUnload);
		assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
	}

	#[test]
	fn test_unsubscribe_stops_delivery() {
		let signals = HostSignals::new();
		let count = Arc::new(AtomicUsize::new(0));
		let c = count.clone();
		let id = signals.subscribe(HostSignal::Online, move || {
			c.fetch_add(1, Ordering::SeqCst);
		});

		assert!(signals.unsubscribe(id));
		assert!(!signals.unsubscribe(id));
		signals.notify(HostSignal::Online);
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_callback_may_unsubscribe_itself() {
		let signals = HostSignals::new();
		let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
		let inner_signals = signals.clone();
		let inner_slot = slot.clone();
		let id = signals.subscribe(HostSignal::PageHide, move || {
			if let Some(id) = inner_slot.lock().unwrap().take() {
				inner_signals.unsubscribe(id);
			}
		});
		*slot.lock().unwrap() = Some(id);

		assert_eq!(signals.notify(HostSignal::PageHide), 1);
		assert_eq!(signals.subscriber_count(HostSignal::PageHide), 0);
	}

	#[test]
	fn test_subscriber_removed_mid_delivery_is_skipped() {
		let signals = HostSignals::new();
		let later: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
		let ran = Arc::new(AtomicBool::new(false));

		let inner_signals = signals.clone();
		let inner_later = later.clone();
		signals.subscribe(HostSignal::PageHide, move || {
			if let Some(id) = *inner_later.lock().unwrap() {
				inner_signals.unsubscribe(id);
			}
		});
		let r = ran.clone();
		let id = signals.subscribe(HostSignal::PageHide, move || r.store(true, Ordering::SeqCst));
		*later.lock().unwrap() = Some(id);

		assert_eq!(signals.notify(HostSignal::PageHide), 1);
		assert!(!ran.load(Ordering::SeqCst));
	}

	#[test]
	fn test_subscribe_first_runs_ahead_of_existing() {
		let signals = HostSignals::new();
		let order = Arc::new(Mutex::new(Vec::new()));
		let o = order.clone();
		signals.subscribe(HostSignal::PageHide, move || o.lock().unwrap().push("late"));
		let o = order.clone();
		signals.subscribe(HostSignal::Online, move || o.lock().unwrap().push("other"));
		let o = order.clone();
		signals.subscribe_first(HostSignal::PageHide, move || o.lock().unwrap().push("first"));

		signals.notify(HostSignal::PageHide);
		assert_eq!(*order.lock().unwrap(), vec!["first", "late"]);
	}

	#[test]
	fn test_panicking_subscriber_does_not_stop_others() {
		let signals = HostSignals::new();
		let ran = Arc::new(AtomicBool::new(false));
		signals.subscribe(HostSignal::PageHide, || panic!("subscriber failure"));
		let r = ran.clone();
		signals.subscribe(HostSignal::PageHide, move || r.store(true, Ordering::SeqCst));

		assert_eq!(signals.notify(HostSignal::PageHide), 2);
		assert!(ran.load(Ordering::SeqCst));
	}

	#[test]
	fn test_connectivity_defaults_online() {
		let connectivity = Connectivity::new();
		assert!(connectivity.is_online());
		connectivity.set_online(false);
		assert!(!connectivity.is_online());
		assert!(!connectivity.clone().is_online());
	}
}
