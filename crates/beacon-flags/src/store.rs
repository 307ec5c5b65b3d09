// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory state store: the single source of truth for all reads.
//!
//! Every mutation happens inside one write-lock critical section, so readers
//! observe either the previous committed snapshot or the next one, never a
//! mix of the two.

use beacon_flags_core::{
	ClientState, EvaluationCounters, Flag, FlagId, FlagMap, FlagValue, NormalizedState,
	PersistedState, SegmentMap,
};
use parking_lot::RwLock;

/// Outcome of [`StateStore::replace`].
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
	/// The update was committed. Carries the flags it replaced.
	Applied {
		previous_flags: FlagMap,
		flags_changed: bool,
		traits_changed: bool,
	},
	/// A fetch started later has already committed; the update was dropped.
	Superseded { committed: u64 },
}

/// Generation and identity of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
	pub generation: u64,
	pub identity: Option<String>,
}

#[derive(Debug, Default)]
struct StoreInner {
	state: ClientState,
	/// Generation of the fetch whose response is currently committed.
	committed: u64,
	/// Last generation handed out by [`StateStore::begin_fetch`].
	issued: u64,
}

#[derive(Debug, Default)]
pub struct StateStore {
	inner: RwLock<StoreInner>,
}

impl StateStore {
	pub fn new(state: ClientState) -> Self {
		Self {
			inner: RwLock::new(StoreInner {
				state,
				committed: 0,
				issued: 0,
			}),
		}
	}

	/// Latest committed snapshot.
	pub fn read(&self) -> ClientState {
		self.inner.read().state.clone()
	}

	pub fn flag(&self, key: &str) -> Option<Flag> {
		self.inner.read().state.flags.get(key).cloned()
	}

	pub fn flags(&self) -> FlagMap {
		self.inner.read().state.flags.clone()
	}

	pub fn trait_value(&self, key: &str) -> Option<FlagValue> {
		self.inner.read().state.traits.get(key).cloned().flatten()
	}

	pub fn segments(&self) -> SegmentMap {
		self.inner.read().state.segments.clone()
	}

	pub fn identity(&self) -> Option<String> {
		self.inner.read().state.identity.clone()
	}

	pub fn counters(&self) -> EvaluationCounters {
		self.inner.read().state.evaluation_event_counters.clone()
	}

	/// Hands out the generation for a fetch that is about to start, together
	/// with the identity it must fetch for. Both are taken under one lock so an
	/// identity switch can never slip between them.
	pub fn begin_fetch(&self) -> FetchTicket {
		let mut inner = self.inner.write();
		inner.issued += 1;
		FetchTicket {
			generation: inner.issued,
			identity: inner.state.identity.clone(),
		}
	}

	/// Whole-map replacement of flags and traits (and segments, when the
	/// response carried them).
	///
	/// A response from a fetch older than the committed one is dropped so a
	/// slow request can never overwrite the result of a newer one.
	pub fn replace(&self, generation: u64, update: NormalizedState) -> Commit {
		let mut inner = self.inner.write();

		if generation < inner.committed {
			return Commit::Superseded {
				committed: inner.committed,
			};
		}
		inner.committed = generation;

		let flags_changed = inner.state.flags != update.flags;
		let traits_changed = inner.state.traits != update.traits;

		let previous_flags = std::mem::replace(&mut inner.state.flags, update.flags);
		inner.state.traits = update.traits;
		if let Some(segments) = update.segments {
			inner.state.segments = segments;
		}

		Commit::Applied {
			previous_flags,
			flags_changed,
			traits_changed,
		}
	}

	/// Partial restore: fields present in `snapshot` override, absent ones stay.
	/// Returns the flags held before the merge.
	pub fn merge(&self, snapshot: PersistedState) -> FlagMap {
		let mut inner = self.inner.write();
		let previous = inner.state.flags.clone();
		inner.state.merge(snapshot);
		previous
	}

	/// Switches identity. Fetches already in flight belong to the old identity,
	/// so their responses are invalidated.
	pub fn set_identity(&self, identity: Option<String>) {
		let mut inner = self.inner.write();
		inner.state.identity = identity;
		inner.issued += 1;
		inner.committed = inner.issued;
	}

	/// Logout: identity, traits, and segments are cleared; flags are kept.
	pub fn clear_identity(&self) {
		let mut inner = self.inner.write();
		inner.state.identity = None;
		inner.state.traits.clear();
		inner.state.segments.clear();
		inner.issued += 1;
		inner.committed = inner.issued;
	}

	/// Adds one evaluation of `flag_id`.
	pub fn record_evaluation(&self, flag_id: FlagId) -> u64 {
		let mut inner = self.inner.write();
		let count = inner
			.state
			.evaluation_event_counters
			.entry(flag_id)
			.or_insert(0);
		*count += 1;
		*count
	}

	/// Removes counts that were delivered. Evaluations recorded while the
	/// delivery was in flight remain.
	pub fn acknowledge(&self, delivered: &EvaluationCounters) {
		let mut inner = self.inner.write();
		let counters = &mut inner.state.evaluation_event_counters;
		for (id, sent) in delivered {
			match counters.get(id).map(|count| count.saturating_sub(*sent)) {
				Some(0) => {
					counters.remove(id);
				}
				Some(remaining) => {
					counters.insert(*id, remaining);
				}
				None => {}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use beacon_flags_core::TraitMap;
	use proptest::prelude::*;

	fn update(flags: &[(&str, i64, bool)]) -> NormalizedState {
		NormalizedState {
			flags: flags
				.iter()
				.map(|(name, id, enabled)| (name.to_string(), Flag::new(*id, *enabled, None)))
				.collect(),
			traits: TraitMap::new(),
			segments: None,
		}
	}

	#[test]
	fn test_replace_swaps_whole_map() {
		let store = StateStore::default();
		let g1 = store.begin_fetch().generation;
		store.replace(g1, update(&[("a", 1, true), ("b", 2, true)]));

		let g2 = store.begin_fetch().generation;
		let commit = store.replace(g2, update(&[("c", 3, false)]));

		let flags = store.flags();
		assert_eq!(flags.len(), 1);
		assert!(flags.contains_key("c"));
		match commit {
			Commit::Applied {
				previous_flags,
				flags_changed,
				traits_changed,
				..
			} => {
				assert_eq!(previous_flags.len(), 2);
				assert!(flags_changed);
				assert!(!traits_changed);
			}
			other => panic!("unexpected commit: {other:?}"),
		}
	}

	#[test]
	fn test_identical_update_reports_no_change() {
		let store = StateStore::default();
		let g1 = store.begin_fetch().generation;
		store.replace(g1, update(&[("a", 1, true)]));
		let g2 = store.begin_fetch().generation;

		assert!(matches!(
			store.replace(g2, update(&[("a", 1, true)])),
			Commit::Applied {
				flags_changed: false,
				traits_changed: false,
				..
			}
		));
	}

	#[test]
	fn test_older_response_is_superseded() {
		let store = StateStore::default();
		let older = store.begin_fetch().generation;
		let newer = store.begin_fetch().generation;

		store.replace(newer, update(&[("new", 2, true)]));
		let commit = store.replace(older, update(&[("old", 1, true)]));

		assert_eq!(commit, Commit::Superseded { committed: newer });
		assert!(store.flags().contains_key("new"));
	}

	#[test]
	fn test_identity_change_invalidates_in_flight_fetches() {
		let store = StateStore::default();
		let in_flight = store.begin_fetch().generation;
		store.set_identity(Some("user-2".to_string()));

		assert!(matches!(
			store.replace(in_flight, update(&[("a", 1, true)])),
			Commit::Superseded { .. }
		));
		assert_eq!(store.identity().as_deref(), Some("user-2"));
	}

	#[test]
	fn test_segments_untouched_when_absent() {
		let store = StateStore::default();
		let mut with_segments = update(&[]);
		let segment: beacon_flags_core::Segment =
			serde_json::from_value(serde_json::json!({"name": "beta"})).unwrap();
		with_segments.segments = Some([("beta".to_string(), segment)].into_iter().collect());

		store.replace(store.begin_fetch().generation, with_segments);
		store.replace(store.begin_fetch().generation, update(&[]));

		assert!(store.segments().contains_key("beta"));
	}

	#[test]
	fn test_clear_identity_keeps_flags() {
		let store = StateStore::default();
		store.set_identity(Some("user-1".to_string()));
		let mut next = update(&[("a", 1, true)]);
		next.traits.insert("plan".to_string(), Some("pro".into()));
		store.replace(store.begin_fetch().generation, next);

		store.clear_identity();

		let state = store.read();
		assert!(state.identity.is_none());
		assert!(state.traits.is_empty());
		assert!(state.segments.is_empty());
		assert_eq!(state.flags.len(), 1);
	}

	#[test]
	fn test_merge_returns_previous_flags() {
		let store = StateStore::default();
		store.replace(store.begin_fetch().generation, update(&[("a", 1, true)]));

		let previous = store.merge(PersistedState {
			flags: Some(update(&[("b", 2, true)]).flags),
			..Default::default()
		});

		assert!(previous.contains_key("a"));
		assert!(store.flags().contains_key("b"));
	}

	#[test]
	fn test_acknowledge_keeps_counts_recorded_during_flush() {
		let store = StateStore::default();
		store.record_evaluation(1);
		store.record_evaluation(1);
		store.record_evaluation(2);
		let sent = store.counters();

		store.record_evaluation(1);
		store.acknowledge(&sent);

		let remaining = store.counters();
		assert_eq!(remaining.get(&1), Some(&1));
		assert!(!remaining.contains_key(&2));
	}

	proptest! {
		#[test]
		fn record_then_acknowledge_empties_counters(ids in prop::collection::vec(0i64..20, 0..100)) {
			let store = StateStore::default();
			for id in &ids {
				store.record_evaluation(*id);
			}
			let counters = store.counters();
			prop_assert_eq!(counters.values().sum::<u64>(), ids.len() as u64);

			store.acknowledge(&counters);
			prop_assert!(store.counters().is_empty());
		}
	}
}
