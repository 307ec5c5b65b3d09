// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag, trait, and segment types held by the client.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned numeric identifier of a feature.
pub type FlagId = i64;

/// Normalized flag name → flag.
pub type FlagMap = HashMap<String, Flag>;

/// Normalized trait key → trait value (`None` is an explicit null).
pub type TraitMap = HashMap<String, Option<FlagValue>>;

/// Segment name → segment.
pub type SegmentMap = HashMap<String, Segment>;

/// Flag id → number of local evaluations since the last successful flush.
pub type EvaluationCounters = BTreeMap<FlagId, u64>;

/// Value carried by a flag or a trait.
///
/// The service sends scalars; anything else is kept verbatim in `Json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
	Bool(bool),
	Number(serde_json::Number),
	String(String),
	Json(serde_json::Value),
}

impl FlagValue {
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			FlagValue::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			FlagValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			FlagValue::Number(n) => n.as_i64(),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			FlagValue::Number(n) => n.as_f64(),
			_ => None,
		}
	}
}

impl fmt::Display for FlagValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FlagValue::Bool(b) => write!(f, "{b}"),
			FlagValue::Number(n) => write!(f, "{n}"),
			FlagValue::String(s) => f.write_str(s),
			FlagValue::Json(v) => write!(f, "{v}"),
		}
	}
}

impl From<bool> for FlagValue {
	fn from(value: bool) -> Self {
		FlagValue::Bool(value)
	}
}

impl From<&str> for FlagValue {
	fn from(value: &str) -> Self {
		FlagValue::String(value.to_string())
	}
}

impl From<String> for FlagValue {
	fn from(value: String) -> Self {
		FlagValue::String(value)
	}
}

impl From<i64> for FlagValue {
	fn from(value: i64) -> Self {
		FlagValue::Number(value.into())
	}
}

/// Locally held state of one feature, as last delivered by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
	pub id: FlagId,
	pub enabled: bool,
	#[serde(default)]
	pub value: Option<FlagValue>,
}

impl Flag {
	pub fn new(id: FlagId, enabled: bool, value: Option<FlagValue>) -> Self {
		Self { id, enabled, value }
	}
}

/// A segment the identity belongs to. Only `name` is interpreted; every other
/// field the service sends is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
	pub name: String,
	#[serde(flatten)]
	pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Normalizes a feature name or trait key: lowercase, spaces become underscores.
///
/// ```
/// assert_eq!(beacon_flags_core::normalize_key("Chat Box"), "chat_box");
/// ```
pub fn normalize_key(name: &str) -> String {
	name.to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn normalize_key_lowercases_and_replaces_spaces() {
		assert_eq!(normalize_key("Chat Box"), "chat_box");
		assert_eq!(normalize_key("  Lead Spaces"), "__lead_spaces");
		assert_eq!(normalize_key("already_ok"), "already_ok");
		assert_eq!(normalize_key("Tab\tKept"), "tab\tkept");
	}

	#[test]
	fn flag_value_deserializes_scalars() {
		let b: FlagValue = serde_json::from_str("true").unwrap();
		let n: FlagValue = serde_json::from_str("42").unwrap();
		let s: FlagValue = serde_json::from_str("\"on\"").unwrap();
		let j: FlagValue = serde_json::from_str("{\"a\":1}").unwrap();

		assert_eq!(b, FlagValue::Bool(true));
		assert_eq!(n.as_i64(), Some(42));
		assert_eq!(s.as_str(), Some("on"));
		assert!(matches!(j, FlagValue::Json(_)));
	}

	#[test]
	fn flag_null_value_is_none() {
		let flag: Flag = serde_json::from_str(r#"{"id":3,"enabled":false,"value":null}"#).unwrap();
		assert_eq!(flag, Flag::new(3, false, None));
	}

	#[test]
	fn segment_keeps_extra_fields() {
		let segment: Segment =
			serde_json::from_str(r#"{"name":"beta","id":7,"rules":[]}"#).unwrap();
		assert_eq!(segment.name, "beta");
		assert_eq!(segment.fields["id"], 7);

		let json = serde_json::to_value(&segment).unwrap();
		assert_eq!(json["name"], "beta");
		assert_eq!(json["id"], 7);
	}

	#[test]
	fn flag_value_display() {
		assert_eq!(FlagValue::from("on").to_string(), "on");
		assert_eq!(FlagValue::from(7i64).to_string(), "7");
		assert_eq!(FlagValue::from(false).to_string(), "false");
	}

	proptest! {
		#[test]
		fn normalized_keys_have_no_spaces(s in "[A-Za-z0-9 _]{0,40}") {
			let key = normalize_key(&s);
			prop_assert!(!key.contains(' '));
			prop_assert_eq!(key.chars().count(), s.chars().count());
		}

		#[test]
		fn normalize_is_idempotent(s in "[A-Za-z0-9 _.-]{0,40}") {
			let once = normalize_key(&s);
			prop_assert_eq!(normalize_key(&once), once.clone());
		}
	}
}
