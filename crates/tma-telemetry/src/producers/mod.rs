// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Built-in producers.

pub mod bridge;
pub mod interactions;
pub mod lifecycle;

pub use bridge::{BridgeError, BridgeEventProducer, BridgeEvents, BridgeHandler, BridgeSubscription};
pub use interactions::{InteractionProducer, RageClickDetector, ScrollDepthTracker};
pub use lifecycle::LifecycleProducer;
