// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mock delivery primitives shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tma_telemetry_core::{EventContext, EventRecord, EventSource, Properties};
use tokio::sync::Semaphore;

use crate::error::{Result, TelemetryError};
use crate::transport::{BatchPayload, BatchSender, BeaconSink};

pub fn event(name: &str) -> EventRecord {
	EventRecord::new(
		name,
		Properties::new(),
		EventContext::default(),
		EventSource::Manual,
		Utc::now(),
	)
}

pub fn names(records: &[EventRecord]) -> Vec<String> {
	records.iter().map(|r| r.name().to_string()).collect()
}

type ErrorFactory = Box<dyn Fn() -> TelemetryError + Send + Sync>;

/// Records every batch it is asked to send.
pub struct MockSender {
	payloads: Mutex<Vec<BatchPayload>>,
	calls: AtomicUsize,
	fail_next: Mutex<VecDeque<TelemetryError>>,
	always_fail: Option<ErrorFactory>,
	gate: Option<Semaphore>,
}

impl MockSender {
	pub fn new() -> Self {
		Self {
			payloads: Mutex::new(Vec::new()),
			calls: AtomicUsize::new(0),
			fail_next: Mutex::new(VecDeque::new()),
			always_fail: None,
			gate: None,
		}
	}

	/// Every send fails with a fresh error from `factory`.
	pub fn failing_with<F>(factory: F) -> Self
	where
		F: Fn() -> TelemetryError + Send + Sync + 'static,
	{
		Self {
			always_fail: Some(Box::new(factory)),
			..Self::new()
		}
	}

	/// Every send blocks until [`MockSender::release`] grants it a permit.
	pub fn gated() -> Self {
		Self {
			gate: Some(Semaphore::new(0)),
			..Self::new()
		}
	}

	/// Makes the next send fail with `error`.
	pub fn fail_next(&self, error: TelemetryError) {
		self.fail_next.lock().unwrap().push_back(error);
	}

	pub fn release(&self, permits: usize) {
		if let Some(gate) = &self.gate {
			gate.add_permits(permits);
		}
	}

	/// Number of sends started, including ones still blocked or failed.
	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn payloads(&self) -> Vec<BatchPayload> {
		self.payloads.lock().unwrap().clone()
	}

	pub fn batches(&self) -> Vec<Vec<EventRecord>> {
		self.payloads().into_iter().map(|p| p.updates).collect()
	}
}

#[async_trait::async_trait]
impl BatchSender for MockSender {
	async fn send_batch(&self, payload: &BatchPayload) -> Result<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.payloads.lock().unwrap().push(payload.clone());

		if let Some(gate) = &self.gate {
			if let Ok(permit) = gate.acquire().await {
				permit.forget();
			}
		}

		if let Some(error) = self.fail_next.lock().unwrap().pop_front() {
			return Err(error);
		}
		match &self.always_fail {
			Some(factory) => Err(factory()),
			None => Ok(()),
		}
	}
}

/// Beacon that records payloads and answers with a fixed result.
pub struct MockBeacon {
	accept: AtomicBool,
	bodies: Mutex<Vec<Vec<u8>>>,
}

impl MockBeacon {
	pub fn accepting() -> Self {
		Self {
			accept: AtomicBool::new(true),
			bodies: Mutex::new(Vec::new()),
		}
	}

	pub fn rejecting() -> Self {
		Self {
			accept: AtomicBool::new(false),
			bodies: Mutex::new(Vec::new()),
		}
	}

	pub fn call_count(&self) -> usize {
		self.bodies.lock().unwrap().len()
	}

	pub fn payloads(&self) -> Vec<BatchPayload> {
		self.bodies
			.lock()
			.unwrap()
			.iter()
			.map(|body| serde_json::from_slice(body).unwrap())
			.collect()
	}
}

impl BeaconSink for MockBeacon {
	fn send_beacon(&self, body: Vec<u8>) -> bool {
		self.bodies.lock().unwrap().push(body);
		self.accept.load(Ordering::SeqCst)
	}
}
