// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns server responses into committed state and change notifications.

use std::sync::Arc;

use beacon_flags_core::{FlagMap, IdentityPayload};
use tracing::debug;

use crate::cache::CachePersistence;
use crate::store::{Commit, StateStore};

/// Describes a state change delivered to the change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeInfo {
	/// `true` for a fetch response, `false` for a cache restore.
	pub is_from_server: bool,
	pub flags_changed: bool,
	pub traits_changed: bool,
}

/// Change callback: receives the flags held before the change.
pub type OnChange = Arc<dyn Fn(&FlagMap, &ChangeInfo) + Send + Sync>;

/// Result of reconciling one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
	Committed(ChangeInfo),
	/// A newer fetch had already committed; nothing changed.
	Superseded,
}

pub struct Reconciler {
	state: Arc<StateStore>,
	cache: Arc<CachePersistence>,
	on_change: Option<OnChange>,
}

impl Reconciler {
	pub fn new(
		state: Arc<StateStore>,
		cache: Arc<CachePersistence>,
		on_change: Option<OnChange>,
	) -> Self {
		Self {
			state,
			cache,
			on_change,
		}
	}

	/// Normalizes `payload`, commits it as the new state, persists the
	/// snapshot, and notifies the change callback.
	pub fn apply(&self, generation: u64, payload: IdentityPayload) -> Reconciled {
		let update = payload.normalize();
		let flag_count = update.flags.len();

		let (previous_flags, info) = match self.state.replace(generation, update) {
			Commit::Applied {
				previous_flags,
				flags_changed,
				traits_changed,
				..
			} => (
				previous_flags,
				ChangeInfo {
					is_from_server: true,
					flags_changed,
					traits_changed,
				},
			),
			Commit::Superseded { committed } => {
				debug!(generation, committed, "Dropping response from an older fetch");
				return Reconciled::Superseded;
			}
		};

		self.cache.snapshot_state();
		debug!(
			generation,
			flags = flag_count,
			flags_changed = info.flags_changed,
			traits_changed = info.traits_changed,
			"Reconciled server state"
		);

		self.notify(&previous_flags, &info);
		Reconciled::Committed(info)
	}

	/// Invokes the change callback, if any.
	pub fn notify(&self, previous_flags: &FlagMap, info: &ChangeInfo) {
		if let Some(on_change) = &self.on_change {
			on_change(previous_flags, info);
		}
	}
}
