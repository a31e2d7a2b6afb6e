// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded FIFO of pending events.
//!
//! The queue never blocks and never fails: when full it drops the oldest
//! record. `enqueue` and `drain` are mutually exclusive, so a drain always
//! observes a whole number of enqueues.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tma_telemetry_core::EventRecord;
use tracing::warn;

pub struct EventQueue {
	capacity: usize,
	records: Mutex<VecDeque<EventRecord>>,
}

impl EventQueue {
	/// Creates a queue holding at most `capacity` records (minimum one).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			capacity,
			records: Mutex::new(VecDeque::with_capacity(capacity)),
		}
	}

	/// Appends a record, dropping the oldest ones past capacity.
	///
	/// Returns the queue length after insertion.
	pub fn enqueue(&self, record: EventRecord) -> usize {
		let mut records = self.lock();
		records.push_back(record);

		while records.len() > self.capacity {
			if let Some(dropped) = records.pop_front() {
				warn!(
					event_id = %dropped.id(),
					event_name = %dropped.name(),
					capacity = self.capacity,
					"Dropped event due to queue overflow"
				);
			}
		}

		records.len()
	}

	/// Takes the full contents in order, leaving the queue empty.
	pub fn drain(&self) -> Vec<EventRecord> {
		let mut records = self.lock();
		std::mem::take(&mut *records).into()
	}

	/// Returns a copy of the current contents without removing them.
	pub fn peek(&self) -> Vec<EventRecord> {
		self.lock().iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	// The deque is never left half-updated, so poisoning is ignored.
	fn lock(&self) -> MutexGuard<'_, VecDeque<EventRecord>> {
		self.records.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use proptest::prelude::*;
	use tma_telemetry_core::{EventContext, EventSource, Properties};

	fn event(name: &str) -> EventRecord {
		EventRecord::new(
			name,
			Properties::new(),
			EventContext::default(),
			EventSource::Manual,
			Utc::now(),
		)
	}

	fn names(records: &[EventRecord]) -> Vec<String> {
		records.iter().map(|r| r.name().to_string()).collect()
	}

	#[test]
	fn test_overflow_drops_oldest() {
		let queue = EventQueue::new(3);
		for name in ["A", "B", "C", "D"] {
			queue.enqueue(event(name));
		}

		assert_eq!(names(&queue.drain()), vec!["B", "C", "D"]);
	}

	#[test]
	fn test_enqueue_reports_length() {
		let queue = EventQueue::new(2);
		assert_eq!(queue.enqueue(event("a")), 1);
		assert_eq!(queue.enqueue(event("b")), 2);
		assert_eq!(queue.enqueue(event("c")), 2);
	}

	#[test]
	fn test_drain_empties_queue() {
		let queue = EventQueue::new(10);
		queue.enqueue(event("a"));
		queue.enqueue(event("b"));

		assert_eq!(names(&queue.drain()), vec!["a", "b"]);
		assert!(queue.is_empty());
		assert_eq!(queue.len(), 0);
	}

	#[test]
	fn test_drain_empty_is_idempotent() {
		let queue = EventQueue::new(10);
		assert!(queue.drain().is_empty());
		assert!(queue.drain().is_empty());
		assert!(queue.is_empty());
	}

	#[test]
	fn test_peek_does_not_mutate() {
		let queue = EventQueue::new(10);
		queue.enqueue(event("a"));

		assert_eq!(names(&queue.peek()), vec!["a"]);
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn test_zero_capacity_is_clamped() {
		let queue = EventQueue::new(0);
		assert_eq!(queue.capacity(), 1);
		queue.enqueue(event("a"));
		queue.enqueue(event("b"));
		assert_eq!(names(&queue.drain()), vec!["b"]);
	}

	#[test]
	fn test_concurrent_enqueue_and_drain_lose_nothing() {
		let queue = std::sync::Arc::new(EventQueue::new(10_000));
		let producers: Vec<_> = (0..4)
			.map(|t| {
				let queue = queue.clone();
				std::thread::spawn(move || {
					for i in 0..500 {
						queue.enqueue(event(&format!("{t}-{i}")));
					}
				})
			})
			.collect();

		let mut drained = Vec::new();
		for _ in 0..50 {
			drained.extend(queue.drain());
		}
		for handle in producers {
			handle.join().unwrap();
		}
		drained.extend(queue.drain());

		assert_eq!(drained.len(), 2000);
		let unique: std::collections::HashSet<_> = drained.iter().map(|r| r.id()).collect();
		assert_eq!(unique.len(), 2000);
	}

	proptest! {
		#[test]
		fn drain_returns_last_n_in_order(capacity in 1usize..20, count in 0usize..60) {
			let queue = EventQueue::new(capacity);
			let all: Vec<String> = (0..count).map(|i| format!("e{i}")).collect();
			for name in &all {
				queue.enqueue(event(name));
			}

			let expected: Vec<String> = all.iter().skip(count.saturating_sub(capacity)).cloned().collect();
			prop_assert_eq!(names(&queue.drain()), expected);
			prop_assert!(queue.is_empty());
		}

		#[test]
		fn length_never_exceeds_capacity(capacity in 1usize..10, count in 0usize..40) {
			let queue = EventQueue::new(capacity);
			for i in 0..count {
				let len = queue.enqueue(event(&format!("e{i}")));
				prop_assert!(len <= capacity);
			}
		}
	}
}
