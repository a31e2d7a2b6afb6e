// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry client for capturing events and shipping them in batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tma_telemetry_core::{
	EventContext, EventId, EventRecord, EventSource, Properties, SdkInfo, TrackLevel,
};
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::batch::BatchScheduler;
use crate::config::{RawConfig, TelemetryConfig};
use crate::context::{ContextProvider, StaticContext};
use crate::error::{Result, TelemetryError};
use crate::http::{HttpBatchSender, HttpBeacon};
use crate::producer::{Emitter, EventSink, Producer};
use crate::producers::{BridgeEventProducer, BridgeEvents, LifecycleProducer};
use crate::signals::{Connectivity, HostSignals};
use crate::transport::{BatchSender, BeaconSink, Transport, TransportOptions};
use crate::{SDK_NAME, SDK_VERSION};

enum BeaconChoice {
	Http,
	Custom(Arc<dyn BeaconSink>),
	Unavailable,
}

/// Builder for constructing a [`Telemetry`] client.
pub struct TelemetryBuilder {
	raw: RawConfig,
	context: Option<Arc<dyn ContextProvider>>,
	signals: Option<HostSignals>,
	sender: Option<Arc<dyn BatchSender>>,
	beacon: BeaconChoice,
	bridge: Option<Arc<dyn BridgeEvents>>,
	producers: Vec<Box<dyn Producer>>,
	session_id: Option<String>,
}

impl TelemetryBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			raw: RawConfig::default(),
			context: None,
			signals: None,
			sender: None,
			beacon: BeaconChoice::Http,
			bridge: None,
			producers: Vec::new(),
			session_id: None,
		}
	}

	/// Sets the collector URL batches are posted to.
	///
	/// Example: `https://telemetry.example.com/v1/batch`
	pub fn endpoint(mut self, url: impl Into<String>) -> Self {
		self.raw.endpoint = Some(url.into());
		self
	}

	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.raw.api_key = Some(key.into());
		self
	}

	pub fn project_id(mut self, id: impl Into<String>) -> Self {
		self.raw.project_id = Some(id.into());
		self
	}

	/// Sets the queue length that triggers an immediate flush.
	pub fn batch_size(mut self, size: usize) -> Self {
		self.raw.batch_size = Some(size);
		self
	}

	/// Sets the interval between automatic flushes.
	pub fn flush_interval(mut self, interval: Duration) -> Self {
		self.raw.flush_interval = Some(interval);
		self
	}

	/// Sets how many events are held before the oldest are dropped.
	pub fn max_queue_size(mut self, size: usize) -> Self {
		self.raw.max_queue_size = Some(size);
		self
	}

	/// Sets the HTTP request timeout for batch sends.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.raw.request_timeout = Some(timeout);
		self
	}

	/// Sets the track level, `0..=3`. Validated by [`TelemetryBuilder::build`].
	pub fn track_level(mut self, level: u8) -> Self {
		self.raw.track_level = Some(level);
		self
	}

	/// When disabled, events are still accepted but nothing is sent.
	pub fn disabled(mut self, disabled: bool) -> Self {
		self.raw.disabled = disabled;
		self
	}

	/// Logs delivery failures at warn instead of debug.
	pub fn debug(mut self, debug: bool) -> Self {
		self.raw.debug = debug;
		self
	}

	/// Sets the origin reported with every batch.
	pub fn origin(mut self, origin: impl Into<String>) -> Self {
		self.raw.origin = Some(origin.into());
		self
	}

	/// Registers a callback for failed batch deliveries.
	///
	/// The callback runs on a runtime worker. A panic inside it is caught and
	/// logged.
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&TelemetryError) + Send + Sync + 'static,
	{
		self.raw.on_error = Some(Arc::new(callback));
		self
	}

	/// Sets the source of per-event host context.
	pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
		self.context = Some(Arc::new(provider));
		self
	}

	/// Attaches the same context to every event.
	pub fn context(self, context: EventContext) -> Self {
		self.context_provider(StaticContext::new(context))
	}

	/// Uses an existing signal registry, typically one the host adapter feeds.
	pub fn host_signals(mut self, signals: HostSignals) -> Self {
		self.signals = Some(signals);
		self
	}

	/// Replaces the HTTP batch sender.
	pub fn batch_sender(mut self, sender: Arc<dyn BatchSender>) -> Self {
		self.sender = Some(sender);
		self
	}

	/// Replaces the HTTP beacon.
	pub fn beacon_sink(mut self, beacon: Arc<dyn BeaconSink>) -> Self {
		self.beacon = BeaconChoice::Custom(beacon);
		self
	}

	/// Declares that the host has no beacon primitive. Unload flushes then
	/// drop their events.
	pub fn without_beacon(mut self) -> Self {
		self.beacon = BeaconChoice::Unavailable;
		self
	}

	/// Records host bridge events through the given bridge.
	pub fn bridge_events(mut self, bridge: Arc<dyn BridgeEvents>) -> Self {
		self.bridge = Some(bridge);
		self
	}

	/// Registers an additional producer.
	pub fn producer(mut self, producer: impl Producer + 'static) -> Self {
		self.producers.push(Box::new(producer));
		self
	}

	/// Overrides the generated session id.
	pub fn session_id(mut self, id: impl Into<String>) -> Self {
		self.session_id = Some(id.into());
		self
	}

	/// Builds the client, starts its producers, then starts the batch
	/// scheduler.
	///
	/// Must be called within a Tokio runtime; the client keeps a handle to it
	/// for timers and sends, so it can be used from any thread afterwards.
	pub fn build(self) -> Result<Telemetry> {
		let config = self.raw.validate()?;
		let runtime = Handle::try_current().map_err(|_| {
			TelemetryError::configuration("a Tokio runtime is required to build the client")
		})?;

		let signals = self.signals.unwrap_or_default();

		let sender = match self.sender {
			Some(sender) => sender,
			None => Arc::new(HttpBatchSender::new(
				config.endpoint.clone(),
				config.credentials.clone(),
				config.request_timeout,
			)?),
		};
		let beacon: Option<Arc<dyn BeaconSink>> = match self.beacon {
			BeaconChoice::Http => Some(Arc::new(HttpBeacon::new(
				config.endpoint.clone(),
				config.credentials.clone(),
			))),
			BeaconChoice::Custom(beacon) => Some(beacon),
			BeaconChoice::Unavailable => None,
		};

		let options = TransportOptions {
			disabled: config.disabled,
			debug: config.debug,
			origin: config.origin.clone(),
			on_error: config.on_error.clone(),
		};
		let transport = Arc::new(Transport::new(
			sender,
			beacon,
			options,
			&signals,
			runtime.clone(),
		));
		let scheduler =
			BatchScheduler::new(config.batch.clone(), transport, signals.clone(), runtime);

		let mut producers: Vec<Box<dyn Producer>> = vec![Box::new(LifecycleProducer::new())];
		if let Some(bridge) = self.bridge {
			producers.push(Box::new(BridgeEventProducer::new(bridge)));
		}
		producers.extend(self.producers);

		let inner = Arc::new(ClientInner {
			scheduler,
			context: self
				.context
				.unwrap_or_else(|| Arc::new(StaticContext::default())),
			session_id: self
				.session_id
				.unwrap_or_else(|| Uuid::new_v4().to_string()),
			signals,
			producers: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
			last_captured: Mutex::new(DateTime::<Utc>::MIN_UTC),
			config,
		});

		// Producers first, so their unload handlers run before the unload flush.
		let emitter = inner.emitter();
		let level = inner.config.track_level;
		let mut started = Vec::new();
		for producer in producers {
			if producer.min_track_level() <= level {
				debug!(producer = producer.name(), "Starting producer");
				producer.start(emitter.clone());
				started.push(producer);
			} else {
				debug!(
					producer = producer.name(),
					track_level = %level,
					"Producer disabled at this track level"
				);
			}
		}
		*inner.producers() = started;

		inner.scheduler.start();

		info!(
			endpoint = %inner.config.endpoint,
			track_level = %level,
			disabled = inner.config.disabled,
			session_id = %inner.session_id,
			"Telemetry client initialized"
		);

		Ok(Telemetry { inner })
	}
}

impl Default for TelemetryBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) struct ClientInner {
	config: TelemetryConfig,
	scheduler: Arc<BatchScheduler>,
	context: Arc<dyn ContextProvider>,
	session_id: String,
	signals: HostSignals,
	producers: Mutex<Vec<Box<dyn Producer>>>,
	closed: AtomicBool,
	last_captured: Mutex<DateTime<Utc>>,
}

impl ClientInner {
	fn emitter(self: &Arc<Self>) -> Emitter {
		let sink: Arc<dyn EventSink> = self.clone();
		Emitter::new(
			Arc::downgrade(&sink),
			self.signals.clone(),
			self.config.track_level,
		)
	}

	fn enrich(&self, mut context: EventContext) -> EventContext {
		context
			.session_id
			.get_or_insert_with(|| self.session_id.clone());
		context.track_level = Some(self.config.track_level);
		context.sdk = Some(SdkInfo {
			name: SDK_NAME.to_string(),
			version: SDK_VERSION.to_string(),
		});
		context
	}

	fn producers(&self) -> MutexGuard<'_, Vec<Box<dyn Producer>>> {
		self.producers.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn stop_producers(&self) {
		let producers = std::mem::take(&mut *self.producers());
		for producer in producers {
			producer.stop();
			debug!(producer = producer.name(), "Stopped producer");
		}
	}
}

impl EventSink for ClientInner {
	fn record(&self, name: &str, properties: Properties, source: EventSource) -> Result<EventId> {
		if self.is_closed() {
			return Err(TelemetryError::configuration(
				"telemetry client is not initialized or has been shut down",
			));
		}
		let name = name.trim();
		if name.is_empty() {
			return Err(TelemetryError::configuration("event name is required"));
		}

		let context = self.enrich(self.context.snapshot());

		// Timestamps are taken and records queued under one lock, so queue
		// order and capture order agree.
		let mut last = self
			.last_captured
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		let captured_at = Utc::now().max(*last);
		*last = captured_at;

		let record = EventRecord::new(name, properties, context, source, captured_at);
		let id = record.id();
		self.scheduler.add_event(record);
		Ok(id)
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

impl Drop for ClientInner {
	fn drop(&mut self) {
		self.stop_producers();
	}
}

/// Client for capturing telemetry events.
///
/// # Example
///
/// ```ignore
/// use tma_telemetry::{Properties, Telemetry};
///
/// let telemetry = Telemetry::builder()
///     .endpoint("https://telemetry.example.com/v1/batch")
///     .api_key("tk_live_xxx")
///     .project_id("proj_xxx")
///     .build()?;
///
/// telemetry.track("checkout_started", Properties::new().insert("items", 3))?;
///
/// // Deliver what is queued and wait for it.
/// telemetry.flush().await?;
///
/// telemetry.close().await;
/// ```
#[derive(Clone)]
pub struct Telemetry {
	inner: Arc<ClientInner>,
}

impl Telemetry {
	pub fn builder() -> TelemetryBuilder {
		TelemetryBuilder::new()
	}

	/// Captures an event.
	///
	/// Fails only when the name is blank or the client has been shut down;
	/// delivery failures are reported later through the error callback.
	pub fn emit(&self, name: &str, properties: Properties, source: EventSource) -> Result<EventId> {
		self.inner.record(name, properties, source)
	}

	/// Captures an event tracked by the host application.
	pub fn track(&self, name: &str, properties: Properties) -> Result<EventId> {
		self.emit(name, properties, EventSource::Manual)
	}

	/// Delivers everything queued and waits until all in-flight sends settle.
	pub async fn flush(&self) -> Result<()> {
		if self.inner.is_closed() {
			return Err(TelemetryError::configuration(
				"telemetry client is not initialized or has been shut down",
			));
		}
		self.inner.scheduler.flush_async().await;
		Ok(())
	}

	/// Stops producers, starts delivering what is queued, and stops the
	/// scheduler. Does not wait for delivery; see [`Telemetry::close`].
	///
	/// Idempotent. After shutdown every capture call fails.
	pub fn shutdown(&self) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}

		self.inner.stop_producers();
		self.inner.scheduler.flush();
		self.inner.scheduler.stop();

		info!(session_id = %self.inner.session_id, "Telemetry client shut down");
	}

	/// Shuts down and waits for in-flight sends to settle.
	pub async fn close(&self) {
		self.shutdown();
		self.inner.scheduler.wait_pending().await;
	}

	pub fn session_id(&self) -> &str {
		&self.inner.session_id
	}

	pub fn track_level(&self) -> TrackLevel {
		self.inner.config.track_level
	}

	pub fn config(&self) -> &TelemetryConfig {
		&self.inner.config
	}

	/// Number of events waiting for the next flush.
	pub fn queue_len(&self) -> usize {
		self.inner.scheduler.queue_len()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// The signal registry the host adapter should notify.
	pub fn host_signals(&self) -> &HostSignals {
		&self.inner.signals
	}

	pub fn connectivity(&self) -> &Connectivity {
		self.inner.scheduler.transport().connectivity()
	}

	/// An emitter for producers the host drives itself.
	pub fn emitter(&self) -> Emitter {
		self.inner.emitter()
	}
}

impl std::fmt::Debug for Telemetry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Telemetry")
			.field("session_id", &self.inner.session_id)
			.field("config", &self.inner.config)
			.field("closed", &self.is_closed())
			.finish()
	}
}
