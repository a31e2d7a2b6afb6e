// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for mini-app telemetry.
//!
//! These types are shared between the SDK client and anything that needs to
//! read the wire format (collectors, test harnesses). They carry no I/O.

pub mod context;
pub mod event;
pub mod properties;
pub mod track_level;

pub use context::{ColorScheme, EventContext, SdkInfo, Viewport};
pub use event::{EventId, EventRecord, EventSource};
pub use properties::{Properties, PropertyValue};
pub use track_level::{TrackLevel, TrackLevelError};
