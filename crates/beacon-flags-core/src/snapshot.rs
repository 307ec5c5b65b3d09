// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The client's aggregate state and its persisted form.

use serde::{Deserialize, Serialize};

use crate::flag::{EvaluationCounters, FlagMap, SegmentMap, TraitMap};

/// Everything the client knows: the committed snapshot read by every query and
/// written to the persistent store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
	pub api_base_url: String,
	pub environment_id: String,
	pub identity: Option<String>,
	pub flags: FlagMap,
	pub traits: TraitMap,
	pub segments: SegmentMap,
	pub evaluation_event_counters: EvaluationCounters,
}

/// A snapshot read back from storage or supplied by the caller.
///
/// Every field is optional: fields present override the current state, absent
/// fields leave it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
	#[serde(default)]
	pub api_base_url: Option<String>,
	#[serde(default)]
	pub environment_id: Option<String>,
	#[serde(default)]
	pub identity: Option<String>,
	#[serde(default)]
	pub flags: Option<FlagMap>,
	#[serde(default)]
	pub traits: Option<TraitMap>,
	#[serde(default)]
	pub segments: Option<SegmentMap>,
	#[serde(default)]
	pub evaluation_event_counters: Option<EvaluationCounters>,
}

impl ClientState {
	/// Overlays the fields present in `snapshot`.
	pub fn merge(&mut self, snapshot: PersistedState) {
		if let Some(url) = snapshot.api_base_url {
			self.api_base_url = url;
		}
		if let Some(env) = snapshot.environment_id {
			self.environment_id = env;
		}
		if let Some(identity) = snapshot.identity {
			self.identity = Some(identity);
		}
		if let Some(flags) = snapshot.flags {
			self.flags = flags;
		}
		if let Some(traits) = snapshot.traits {
			self.traits = traits;
		}
		if let Some(segments) = snapshot.segments {
			self.segments = segments;
		}
		if let Some(counters) = snapshot.evaluation_event_counters {
			self.evaluation_event_counters = counters;
		}
	}
}

impl From<ClientState> for PersistedState {
	fn from(state: ClientState) -> Self {
		Self {
			api_base_url: Some(state.api_base_url),
			environment_id: Some(state.environment_id),
			identity: state.identity,
			flags: Some(state.flags),
			traits: Some(state.traits),
			segments: Some(state.segments),
			evaluation_event_counters: Some(state.evaluation_event_counters),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::flag::{Flag, FlagValue};
	use serde_json::json;

	fn sample_state() -> ClientState {
		let mut state = ClientState {
			api_base_url: "https://x.test/".to_string(),
			environment_id: "abc".to_string(),
			identity: Some("user-1".to_string()),
			..Default::default()
		};
		state
			.flags
			.insert("chat_box".to_string(), Flag::new(1, true, Some("on".into())));
		state
			.traits
			.insert("plan".to_string(), Some(FlagValue::from("pro")));
		state.evaluation_event_counters.insert(1, 3);
		state
	}

	#[test]
	fn serializes_with_camel_case_keys() {
		let json = serde_json::to_value(sample_state()).unwrap();
		assert_eq!(json["apiBaseUrl"], "https://x.test/");
		assert_eq!(json["environmentId"], "abc");
		assert_eq!(json["flags"]["chat_box"]["value"], "on");
		assert_eq!(json["evaluationEventCounters"]["1"], 3);
	}

	#[test]
	fn persisted_state_reads_full_snapshot() {
		let json = serde_json::to_string(&sample_state()).unwrap();
		let persisted: PersistedState = serde_json::from_str(&json).unwrap();
		assert_eq!(persisted, PersistedState::from(sample_state()));
	}

	#[test]
	fn partial_snapshot_keeps_absent_fields() {
		let mut state = sample_state();
		let partial: PersistedState = serde_json::from_value(json!({
			"flags": {"other": {"id": 2, "enabled": false, "value": null}}
		}))
		.unwrap();

		state.merge(partial);

		assert_eq!(state.flags.len(), 1);
		assert!(state.flags.contains_key("other"));
		assert_eq!(state.identity.as_deref(), Some("user-1"));
		assert_eq!(state.traits.len(), 1);
		assert_eq!(state.evaluation_event_counters.get(&1), Some(&3));
	}

	#[test]
	fn null_identity_does_not_clear_current() {
		let mut state = sample_state();
		state.merge(serde_json::from_value(json!({"identity": null})).unwrap());
		assert_eq!(state.identity.as_deref(), Some("user-1"));
	}
}
