// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic timers driving flag re-synchronization and analytics flushing.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The timers a client can run. At most one of each kind is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
	FlagPolling,
	Analytics,
}

/// Set of cancelable periodic tasks.
#[derive(Debug, Default)]
pub struct PollScheduler {
	timers: Mutex<HashMap<TimerKind, JoinHandle<()>>>,
}

impl PollScheduler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `tick` every `period`, first after one full period.
	///
	/// Returns `false` without starting anything if a timer of this kind is
	/// already running or `period` is zero. `tick` returns `false` to end the
	/// timer.
	pub fn start<F, Fut>(&self, kind: TimerKind, period: Duration, mut tick: F) -> bool
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = bool> + Send + 'static,
	{
		if period.is_zero() {
			warn!(?kind, "Refusing to start a timer with a zero period");
			return false;
		}

		let mut timers = self.timers.lock();
		if let Some(handle) = timers.get(&kind) {
			if !handle.is_finished() {
				debug!(?kind, "Timer already running");
				return false;
			}
		}

		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// The first tick completes immediately.
			interval.tick().await;
			loop {
				interval.tick().await;
				if !tick().await {
					break;
				}
			}
		});

		info!(?kind, period_ms = period.as_millis() as u64, "Timer started");
		timers.insert(kind, handle);
		true
	}

	pub fn is_running(&self, kind: TimerKind) -> bool {
		self.timers
			.lock()
			.get(&kind)
			.map(|handle| !handle.is_finished())
			.unwrap_or(false)
	}

	/// Number of timers currently running.
	pub fn active(&self) -> usize {
		self.timers
			.lock()
			.values()
			.filter(|handle| !handle.is_finished())
			.count()
	}

	/// Cancels every timer. A tick already in progress is aborted at its next
	/// await point; requests it handed to another task are not.
	pub fn stop_all(&self) {
		let drained: Vec<_> = self.timers.lock().drain().collect();
		for (kind, handle) in drained {
			handle.abort();
			debug!(?kind, "Timer stopped");
		}
	}
}

impl Drop for PollScheduler {
	fn drop(&mut self) {
		for handle in self.timers.get_mut().values() {
			handle.abort();
		}
	}
}
