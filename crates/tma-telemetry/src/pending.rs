// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracking of in-flight delivery attempts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::watch;

type Inflight = Arc<Mutex<HashMap<u64, watch::Receiver<()>>>>;

/// The set of delivery attempts that have started but not settled.
///
/// Members are only ever awaited as a group via [`PendingRequests::wait_all`].
#[derive(Default)]
pub struct PendingRequests {
	next_id: AtomicU64,
	inflight: Inflight,
}

/// Membership of one attempt; dropping it removes the attempt from the set.
///
/// Dropping happens on success, failure, or when the owning task is dropped,
/// so membership never outlives the attempt.
#[must_use = "the request leaves the pending set as soon as the guard is dropped"]
pub struct PendingGuard {
	id: u64,
	inflight: Inflight,
	_settled: watch::Sender<()>,
}

impl PendingRequests {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a new attempt to the set.
	pub fn register(&self) -> PendingGuard {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = watch::channel(());
		lock(&self.inflight).insert(id, rx);
		PendingGuard {
			id,
			inflight: Arc::clone(&self.inflight),
			_settled: tx,
		}
	}

	pub fn len(&self) -> usize {
		lock(&self.inflight).len()
	}

	pub fn is_empty(&self) -> bool {
		lock(&self.inflight).is_empty()
	}

	/// Waits until every attempt pending at the time of the call has settled.
	///
	/// Attempts registered afterwards are not waited on.
	pub async fn wait_all(&self) {
		let snapshot: Vec<watch::Receiver<()>> = lock(&self.inflight).values().cloned().collect();
		if snapshot.is_empty() {
			return;
		}

		// Nothing is ever sent on these channels; `changed` only returns once
		// the guard drops its sender.
		join_all(snapshot.into_iter().map(|mut rx| async move {
			while rx.changed().await.is_ok() {}
		}))
		.await;
	}
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		lock(&self.inflight).remove(&self.id);
	}
}

fn lock(inflight: &Inflight) -> MutexGuard<'_, HashMap<u64, watch::Receiver<()>>> {
	inflight.lock().unwrap_or_else(PoisonError::into_inner)
}
