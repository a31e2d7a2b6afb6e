// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event batching and flush scheduling.
//!
//! The scheduler owns the event queue and decides when to flush it:
//!
//! - eagerly, when an insert brings the queue to the batch size;
//! - periodically, on a timer armed by [`BatchScheduler::start`];
//! - on page teardown, through the beacon path, when the host delivers one
//!   of the unload signals.
//!
//! While an unload signal is being delivered, the eager and timer flushes
//! leave the queue alone or go through the beacon, so records captured by
//! teardown handlers never end up on the async path.
//!
//! None of these paths ever returns an error to the caller. Delivery failures
//! are logged and reported by the transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tma_telemetry_core::EventRecord;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::EventQueue;
use crate::signals::{HostSignal, HostSignals, SubscriptionId};
use crate::transport::Transport;

/// Configuration for the event batch queue.
#[derive(Debug, Clone)]
pub struct BatchConfig {
	/// Queue length that triggers an immediate flush.
	pub max_batch_size: usize,
	/// Interval between automatic flushes.
	pub flush_interval: Duration,
	/// Maximum number of events to queue before dropping oldest.
	pub max_queue_size: usize,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			max_batch_size: crate::config::DEFAULT_BATCH_SIZE,
			flush_interval: crate::config::DEFAULT_FLUSH_INTERVAL,
			max_queue_size: crate::config::DEFAULT_MAX_QUEUE_SIZE,
		}
	}
}

#[derive(Default)]
struct SchedulerState {
	started: bool,
	// Bumped by every start so a timer from an earlier run can tell it is stale.
	generation: u64,
	timer: Option<JoinHandle<()>>,
	hooks: Vec<SubscriptionId>,
}

pub struct BatchScheduler {
	config: BatchConfig,
	queue: EventQueue,
	transport: Arc<Transport>,
	signals: HostSignals,
	runtime: Handle,
	state: Mutex<SchedulerState>,
	// Unload deliveries currently between their opening and closing hooks.
	unloading: AtomicUsize,
}

impl BatchScheduler {
	pub fn new(
		config: BatchConfig,
		transport: Arc<Transport>,
		signals: HostSignals,
		runtime: Handle,
	) -> Arc<Self> {
		Arc::new(Self {
			queue: EventQueue::new(config.max_queue_size),
			config,
			transport,
			signals,
			runtime,
			state: Mutex::new(SchedulerState::default()),
			unloading: AtomicUsize::new(0),
		})
	}

	/// Arms the flush timer and the unload hooks. No-op when already started.
	pub fn start(self: &Arc<Self>) {
		let mut state = self.state();
		if state.started {
			return;
		}

		state.started = true;
		state.generation += 1;
		state.timer = Some(self.arm_timer(state.generation));
		state.hooks.clear();
		for signal in HostSignal::UNLOAD {
			// The opening hook runs before any other subscriber, so teardown
			// events emitted by producers stay queued for the beacon.
			let scheduler = Arc::downgrade(self);
			state.hooks.push(self.signals.subscribe_first(signal, move || {
				if let Some(scheduler) = scheduler.upgrade() {
					scheduler.unloading.fetch_add(1, Ordering::SeqCst);
				}
			}));

			let scheduler = Arc::downgrade(self);
			state.hooks.push(self.signals.subscribe(signal, move || {
				if let Some(scheduler) = scheduler.upgrade() {
					scheduler.flush_on_unload();
					scheduler.end_unload();
				}
			}));
		}

		info!(
			flush_interval_ms = self.config.flush_interval.as_millis() as u64,
			max_batch_size = self.config.max_batch_size,
			max_queue_size = self.config.max_queue_size,
			"Batch scheduler started"
		);
	}

	/// Disarms the timer and unload hooks. Does not flush. No-op when stopped.
	pub fn stop(&self) {
		let mut state = self.state();
		if !state.started {
			return;
		}

		state.started = false;
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}
		for id in state.hooks.drain(..) {
			self.signals.unsubscribe(id);
		}
		self.unloading.store(0, Ordering::SeqCst);

		info!(queued = self.queue.len(), "Batch scheduler stopped");
	}

	pub fn is_started(&self) -> bool {
		self.state().started
	}

	/// Queues a record, flushing immediately once the batch size is reached.
	pub fn add_event(&self, record: EventRecord) {
		let len = self.queue.enqueue(record);
		if len >= self.config.max_batch_size {
			if self.is_unloading() {
				debug!(queued = len, "Batch size reached during unload, leaving it for the beacon");
				return;
			}
			debug!(queued = len, "Batch size reached, flushing");
			self.flush();
		}
	}

	/// Drains the queue and starts delivering it without waiting.
	///
	/// During an unload delivery the batch goes to the beacon instead.
	pub fn flush(&self) {
		if self.is_unloading() {
			self.flush_on_unload();
			return;
		}

		let batch = self.queue.drain();
		if batch.is_empty() {
			return;
		}

		debug!(count = batch.len(), "Flushing event batch");
		self.transport.spawn_send(batch);
	}

	/// Drains the queue, delivers it, and waits for every other in-flight
	/// send as well.
	pub async fn flush_async(&self) {
		let batch = self.queue.drain();
		if !batch.is_empty() {
			debug!(count = batch.len(), "Flushing event batch and waiting");
			// The transport has already logged and reported any failure.
			let _ = self.transport.send(batch).await;
		}
		self.transport.flush().await;
	}

	/// Drains the queue into a beacon. Never awaits.
	///
	/// Returns false when the beacon was rejected or is unavailable; the
	/// drained records are lost in that case.
	pub fn flush_on_unload(&self) -> bool {
		let batch = self.queue.drain();
		if batch.is_empty() {
			return true;
		}

		let count = batch.len();
		let accepted = self.transport.send_beacon(batch);
		if accepted {
			debug!(count, "Unload flush handed to beacon");
		} else {
			warn!(count, "Unload flush rejected, events dropped");
		}
		accepted
	}

	/// Waits for sends that are in flight right now.
	pub async fn wait_pending(&self) {
		self.transport.flush().await;
	}

	/// Whether an unload signal is being delivered right now.
	pub fn is_unloading(&self) -> bool {
		self.unloading.load(Ordering::SeqCst) > 0
	}

	pub fn queue_len(&self) -> usize {
		self.queue.len()
	}

	/// Copy of the queued records, for diagnostics.
	pub fn peek(&self) -> Vec<EventRecord> {
		self.queue.peek()
	}

	pub fn transport(&self) -> &Arc<Transport> {
		&self.transport
	}

	fn arm_timer(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
		let scheduler: Weak<Self> = Arc::downgrade(self);
		let interval = self.config.flush_interval;

		self.runtime.spawn(async move {
			loop {
				tokio::time::sleep(interval).await;

				let Some(scheduler) = scheduler.upgrade() else {
					break;
				};
				if !scheduler.is_current(generation) {
					break;
				}

				scheduler.flush();

				// `flush` returns at once; stop() may have run meanwhile.
				if !scheduler.is_current(generation) {
					debug!("Scheduler stopped during flush, timer not rearmed");
					break;
				}
			}
		})
	}

	fn end_unload(&self) {
		// stop() may have reset the count while the delivery was running.
		let _ = self
			.unloading
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
	}

	fn is_current(&self, generation: u64) -> bool {
		let state = self.state();
		state.started && state.generation == generation
	}

	fn state(&self) -> MutexGuard<'_, SchedulerState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Drop for BatchScheduler {
	fn drop(&mut self) {
		let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}
		for id in state.hooks.drain(..) {
			self.signals.unsubscribe(id);
		}
	}
}
