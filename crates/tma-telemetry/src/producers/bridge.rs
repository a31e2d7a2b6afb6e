// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host bridge events.
//!
//! The mini-app container reports its own UI events (main button presses,
//! theme changes, closed popups) over a bridge. The host adapter exposes that
//! bridge through [`BridgeEvents`]; this producer subscribes to the events it
//! knows and re-emits them as `tg_*` telemetry events carrying the bridge
//! payload as properties.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tma_telemetry_core::{Properties, TrackLevel};
use tracing::{debug, warn};

use crate::producer::{Emitter, Producer};

/// Bridge event names and the telemetry names they are recorded under.
pub const BRIDGE_EVENTS: [(&str, &str); 11] = [
	("viewportChanged", "tg_viewport_changed"),
	("themeChanged", "tg_theme_changed"),
	("mainButtonClicked", "tg_main_button_clicked"),
	("backButtonClicked", "tg_back_button_clicked"),
	("settingsButtonClicked", "tg_settings_button_clicked"),
	("invoiceClosed", "tg_invoice_closed"),
	("popupClosed", "tg_popup_closed"),
	("qrTextReceived", "tg_qr_text_received"),
	("clipboardTextReceived", "tg_clipboard_text_received"),
	("writeAccessRequested", "tg_write_access_requested"),
	("contactRequested", "tg_contact_requested"),
];

/// Telemetry name for a bridge event, or `None` if it is not tracked.
pub fn telemetry_name(bridge_event: &str) -> Option<&'static str> {
	BRIDGE_EVENTS
		.iter()
		.find(|(bridge, _)| *bridge == bridge_event)
		.map(|(_, name)| *name)
}

#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("bridge is not available")]
	Unavailable,

	#[error("bridge does not support event {0:?}")]
	Unsupported(String),

	#[error("bridge subscription not found")]
	UnknownSubscription,

	#[error("bridge error: {0}")]
	Other(String),
}

/// Token identifying one bridge subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeSubscription(pub u64);

/// Called with the event payload each time the bridge event fires.
pub type BridgeHandler = Arc<dyn Fn(Properties) + Send + Sync>;

/// Subscribe-by-name access to the host bridge.
pub trait BridgeEvents: Send + Sync {
	fn subscribe(
		&self,
		event: &str,
		handler: BridgeHandler,
	) -> std::result::Result<BridgeSubscription, BridgeError>;

	fn unsubscribe(&self, subscription: BridgeSubscription) -> std::result::Result<(), BridgeError>;
}

pub struct BridgeEventProducer {
	bridge: Arc<dyn BridgeEvents>,
	subscriptions: Mutex<Option<Vec<(&'static str, BridgeSubscription)>>>,
}

impl BridgeEventProducer {
	pub fn new(bridge: Arc<dyn BridgeEvents>) -> Self {
		Self {
			bridge,
			subscriptions: Mutex::new(None),
		}
	}
}

impl Producer for BridgeEventProducer {
	fn name(&self) -> &str {
		"bridge"
	}

	fn min_track_level(&self) -> TrackLevel {
		TrackLevel::Lifecycle
	}

	fn start(&self, emitter: Emitter) {
		let mut subscriptions = self
			.subscriptions
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		if subscriptions.is_some() {
			return;
		}

		let mut active = Vec::with_capacity(BRIDGE_EVENTS.len());
		for (bridge_event, name) in BRIDGE_EVENTS {
			let emitter = emitter.clone();
			let handler: BridgeHandler = Arc::new(move |payload| {
				emitter.emit(name, payload);
			});

			match self.bridge.subscribe(bridge_event, handler) {
				Ok(subscription) => active.push((bridge_event, subscription)),
				Err(e) => warn!(event = bridge_event, error = %e, "Failed to subscribe to bridge event"),
			}
		}

		debug!(
			subscribed = active.len(),
			available = BRIDGE_EVENTS.len(),
			"Bridge producer started"
		);
		*subscriptions = Some(active);
	}

	fn stop(&self) {
		let active = self
			.subscriptions
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		let Some(active) = active else {
			return;
		};

		for (bridge_event, subscription) in active {
			if let Err(e) = self.bridge.unsubscribe(subscription) {
				warn!(event = bridge_event, error = %e, "Failed to unsubscribe from bridge event");
			}
		}
		debug!("Bridge producer stopped");
	}
}
