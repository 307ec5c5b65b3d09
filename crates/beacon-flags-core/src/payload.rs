// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types exchanged with the flags service.
//!
//! Responses are normalized into the client's maps by
//! [`IdentityPayload::normalize`]. Request bodies for trait writes live here
//! too so their JSON shape is tested next to the response shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flag::{
	normalize_key, Flag, FlagId, FlagMap, FlagValue, Segment, SegmentMap, TraitMap,
};

/// The feature half of a feature state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
	pub id: FlagId,
	pub name: String,
	/// Some responses carry the value on the feature itself. The value on the
	/// feature state wins when both are set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub feature_state_value: Option<FlagValue>,
}

/// One entry of the `flags` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatePayload {
	pub feature: FeaturePayload,
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub feature_state_value: Option<FlagValue>,
}

/// One entry of the `traits` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitPayload {
	pub trait_key: String,
	#[serde(default)]
	pub trait_value: Option<FlagValue>,
}

/// Response of the identity endpoint.
///
/// The bare flags endpoint returns only the flag array; it is wrapped with
/// [`IdentityPayload::from_flags`] so both paths reconcile the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityPayload {
	#[serde(default)]
	pub flags: Option<Vec<FeatureStatePayload>>,
	#[serde(default)]
	pub traits: Option<Vec<TraitPayload>>,
	#[serde(default)]
	pub segments: Option<Vec<Segment>>,
}

/// Body of the environment flags endpoint.
///
/// The service answers with the bare flag array; a `{"flags": [...]}` object
/// is accepted as well. Anything else is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagsResponse {
	List(Vec<FeatureStatePayload>),
	Wrapped { flags: Vec<FeatureStatePayload> },
}

impl FlagsResponse {
	/// Flags only: traits stay empty and segments untouched.
	pub fn into_payload(self) -> IdentityPayload {
		match self {
			FlagsResponse::List(flags) | FlagsResponse::Wrapped { flags } => {
				IdentityPayload::from_flags(flags)
			}
		}
	}
}

/// Maps built from a server response, ready to commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedState {
	pub flags: FlagMap,
	pub traits: TraitMap,
	/// `None` when the response carried no segments; existing segments are
	/// then left untouched.
	pub segments: Option<SegmentMap>,
}

impl IdentityPayload {
	pub fn from_flags(flags: Vec<FeatureStatePayload>) -> Self {
		Self {
			flags: Some(flags),
			traits: None,
			segments: None,
		}
	}

	/// Builds the flag, trait, and segment maps.
	///
	/// Missing arrays become empty maps. When two names normalize to the same
	/// key the later entry wins.
	pub fn normalize(self) -> NormalizedState {
		let flags = self
			.flags
			.unwrap_or_default()
			.into_iter()
			.map(|state| {
				(
					normalize_key(&state.feature.name),
					Flag::new(
						state.feature.id,
						state.enabled,
						state.feature_state_value.or(state.feature.feature_state_value),
					),
				)
			})
			.collect();

		let traits = self
			.traits
			.unwrap_or_default()
			.into_iter()
			.map(|t| (normalize_key(&t.trait_key), t.trait_value))
			.collect();

		let segments = self
			.segments
			.map(|segments| segments.into_iter().map(|s| (s.name.clone(), s)).collect());

		NormalizedState {
			flags,
			traits,
			segments,
		}
	}
}

/// Identity reference embedded in trait writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRef {
	pub identifier: String,
}

/// Body of `POST traits/`, and one element of `PUT traits/bulk/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitUpdate {
	pub identity: IdentityRef,
	pub trait_key: String,
	pub trait_value: Option<FlagValue>,
}

impl TraitUpdate {
	pub fn new(identifier: impl Into<String>, key: impl Into<String>, value: Option<FlagValue>) -> Self {
		Self {
			identity: IdentityRef {
				identifier: identifier.into(),
			},
			trait_key: key.into(),
			trait_value: value,
		}
	}

	/// Builds the bulk body, one update per trait, ordered by key.
	pub fn bulk(identifier: &str, traits: &HashMap<String, Option<FlagValue>>) -> Vec<Self> {
		let mut updates: Vec<Self> = traits
			.iter()
			.map(|(key, value)| Self::new(identifier, key.clone(), value.clone()))
			.collect();
		updates.sort_by(|a, b| a.trait_key.cmp(&b.trait_key));
		updates
	}
}

/// Body of `POST traits/increment-value/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitIncrement {
	pub trait_key: String,
	pub increment_by: i64,
	pub identifier: String,
}
