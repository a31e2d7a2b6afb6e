// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User interaction events.
//!
//! The host adapter forwards raw input through an [`InteractionProducer`]
//! handle; the producer decides what is worth recording:
//!
//! - `rage_click { target, count }` when clicks pile up on one spot;
//! - `scroll_depth { depth }` the first time each scroll milestone is reached;
//! - `form_submit { form_id }` for every submission;
//! - `click { target, x, y }` for every click, at [`TrackLevel::Full`] only.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tma_telemetry_core::{Properties, TrackLevel};
use tracing::debug;

use crate::producer::{Emitter, Producer};

pub const CLICK: &str = "click";
pub const RAGE_CLICK: &str = "rage_click";
pub const SCROLL_DEPTH: &str = "scroll_depth";
pub const FORM_SUBMIT: &str = "form_submit";

pub const RAGE_CLICK_THRESHOLD: usize = 3;
pub const RAGE_CLICK_WINDOW: Duration = Duration::from_secs(1);
pub const RAGE_CLICK_RADIUS: f64 = 30.0;

pub const SCROLL_MILESTONES: [u8; 4] = [25, 50, 75, 100];

#[derive(Debug, Clone, Copy)]
struct ClickWindow {
	started: Instant,
	x: f64,
	y: f64,
	count: usize,
}

/// Detects bursts of clicks on one spot.
///
/// A window opens at a click and collects later clicks that land within
/// [`RAGE_CLICK_RADIUS`] pixels of it and within [`RAGE_CLICK_WINDOW`] of it.
/// A click outside either bound opens a new window. Reaching
/// [`RAGE_CLICK_THRESHOLD`] reports the burst once and closes the window.
#[derive(Debug, Default)]
pub struct RageClickDetector {
	window: Option<ClickWindow>,
}

impl RageClickDetector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a click. Returns the burst size when it completes a rage click.
	pub fn record(&mut self, at: Instant, x: f64, y: f64) -> Option<usize> {
		let fresh = ClickWindow {
			started: at,
			x,
			y,
			count: 1,
		};

		let window = match self.window {
			Some(mut w)
				if at.saturating_duration_since(w.started) <= RAGE_CLICK_WINDOW
					&& (x - w.x).hypot(y - w.y) <= RAGE_CLICK_RADIUS =>
			{
				w.count += 1;
				w
			}
			_ => fresh,
		};

		if window.count >= RAGE_CLICK_THRESHOLD {
			self.window = None;
			Some(window.count)
		} else {
			self.window = Some(window);
			None
		}
	}
}

/// Tracks the deepest scroll position and reports milestones.
///
/// Every milestone the maximum depth passes is reported exactly once, in
/// ascending order, including milestones skipped over by a single large jump.
#[derive(Debug, Default)]
pub struct ScrollDepthTracker {
	max_depth: f64,
	reached: usize,
}

impl ScrollDepthTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Deepest scroll position seen so far, in percent.
	pub fn max_depth(&self) -> f64 {
		self.max_depth
	}

	/// Records a scroll position in percent and returns the milestones it
	/// newly reached.
	pub fn record(&mut self, depth_percent: f64) -> Vec<u8> {
		if depth_percent.is_nan() {
			return Vec::new();
		}
		let depth = depth_percent.clamp(0.0, 100.0);
		if depth > self.max_depth {
			self.max_depth = depth;
		}

		let newly: Vec<u8> = SCROLL_MILESTONES[self.reached..]
			.iter()
			.copied()
			.take_while(|&m| self.max_depth >= f64::from(m))
			.collect();
		self.reached += newly.len();
		newly
	}
}

#[derive(Default)]
struct InteractionState {
	emitter: Option<Emitter>,
	rage: RageClickDetector,
	scroll: ScrollDepthTracker,
}

/// Feeds host input into interaction events.
///
/// Cloning yields another handle to the same producer, so the host adapter can
/// keep one while the client owns another. Input received before start or
/// after stop is ignored.
#[derive(Clone, Default)]
pub struct InteractionProducer {
	state: Arc<Mutex<InteractionState>>,
}

impl InteractionProducer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn click(&self, target: &str, x: f64, y: f64) {
		self.click_at(Instant::now(), target, x, y);
	}

	pub(crate) fn click_at(&self, at: Instant, target: &str, x: f64, y: f64) {
		let (emitter, burst) = {
			let mut state = self.state();
			let Some(emitter) = state.emitter.clone() else {
				return;
			};
			(emitter, state.rage.record(at, x, y))
		};

		if emitter.track_level() >= TrackLevel::Full {
			emitter.emit(
				CLICK,
				Properties::new()
					.insert("target", target)
					.insert("x", x)
					.insert("y", y),
			);
		}

		if let Some(count) = burst {
			debug!(element = target, count, "Rage click detected");
			emitter.emit(
				RAGE_CLICK,
				Properties::new().insert("target", target).insert("count", count),
			);
		}
	}

	pub fn scroll(&self, depth_percent: f64) {
		let (emitter, milestones) = {
			let mut state = self.state();
			let Some(emitter) = state.emitter.clone() else {
				return;
			};
			(emitter, state.scroll.record(depth_percent))
		};

		for depth in milestones {
			emitter.emit(SCROLL_DEPTH, Properties::new().insert("depth", u32::from(depth)));
		}
	}

	pub fn form_submit(&self, form_id: &str) {
		let Some(emitter) = self.state().emitter.clone() else {
			return;
		};
		emitter.emit(FORM_SUBMIT, Properties::new().insert("form_id", form_id));
	}

	fn state(&self) -> MutexGuard<'_, InteractionState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Producer for InteractionProducer {
	fn name(&self) -> &str {
		"interactions"
	}

	fn min_track_level(&self) -> TrackLevel {
		TrackLevel::Interactions
	}

	fn start(&self, emitter: Emitter) {
		let mut state = self.state();
		if state.emitter.is_none() {
			*state = InteractionState {
				emitter: Some(emitter),
				..Default::default()
			};
		}
	}

	fn stop(&self) {
		self.state().emitter = None;
	}
}
