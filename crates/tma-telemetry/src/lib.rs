// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry SDK for chat-platform mini-apps.
//!
//! Events are captured through a [`Telemetry`] client, held in a bounded
//! queue, and shipped to a collector in batches. Batches go out when the queue
//! reaches the configured size, on a periodic timer, and on page teardown.
//! Teardown flushes use a non-blocking beacon since nothing can be awaited
//! while the page goes away.
//!
//! # Example
//!
//! ```ignore
//! use tma_telemetry::{HostSignal, Properties, Telemetry};
//!
//! let telemetry = Telemetry::builder()
//!     .endpoint("https://telemetry.example.com/v1/batch")
//!     .api_key("tk_live_xxx")
//!     .project_id("proj_xxx")
//!     .track_level(2)
//!     .build()?;
//!
//! telemetry.track("level_completed", Properties::new().insert("level", 4))?;
//!
//! // The host adapter forwards platform signals.
//! telemetry.host_signals().notify(HostSignal::PageHide);
//! ```
//!
//! # Delivery
//!
//! Delivery is best effort: no retries, no persistence. Failed sends are
//! logged and passed to the optional error callback; they never surface at
//! the capture call.

mod batch;
mod client;
mod config;
mod context;
mod error;
mod http;
mod pending;
mod producer;
pub mod producers;
mod queue;
mod signals;
mod transport;

#[cfg(test)]
mod test_support;

pub use batch::{BatchConfig, BatchScheduler};
pub use client::{Telemetry, TelemetryBuilder};
pub use config::{
	Credentials, ErrorCallback, TelemetryConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL,
	DEFAULT_MAX_QUEUE_SIZE, DEFAULT_REQUEST_TIMEOUT,
};
pub use context::{ContextProvider, StaticContext};
pub use error::{BoxError, ErrorKind, Result, TelemetryError};
pub use http::{user_agent, HttpBatchSender, HttpBeacon, API_KEY_HEADER, PROJECT_ID_HEADER};
pub use pending::{PendingGuard, PendingRequests};
pub use producer::{Emitter, Producer};
pub use queue::EventQueue;
pub use signals::{Connectivity, HostSignal, HostSignals, SubscriptionId};
pub use transport::{BatchPayload, BatchSender, BeaconSink, Transport, TransportOptions};

pub use tma_telemetry_core::{
	ColorScheme, EventContext, EventId, EventRecord, EventSource, Properties, PropertyValue,
	SdkInfo, TrackLevel, TrackLevelError, Viewport,
};

/// SDK name reported in the User-Agent and in every event's context.
pub const SDK_NAME: &str = "tma-telemetry-rust";
/// SDK version reported in the User-Agent and in every event's context.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
