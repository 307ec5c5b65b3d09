// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Beacon feature flags client.
//!
//! This crate holds the data model shared by the client SDK (`beacon-flags`):
//! flags, traits, segments, evaluation counters, the persisted client snapshot,
//! and the wire payloads of the flags service. It performs no I/O.
//!
//! # Example
//!
//! ```
//! use beacon_flags_core::{IdentityPayload, FeatureStatePayload};
//!
//! let flags: Vec<FeatureStatePayload> = serde_json::from_str(
//!     r#"[{"feature":{"id":1,"name":"Chat Box"},"enabled":true,"feature_state_value":"on"}]"#,
//! ).unwrap();
//!
//! let state = IdentityPayload::from_flags(flags).normalize();
//! assert!(state.flags["chat_box"].enabled);
//! ```

pub mod environment;
pub mod flag;
pub mod payload;
pub mod snapshot;

pub use environment::{Environment, DEFAULT_API_URL};
pub use flag::{
	normalize_key, EvaluationCounters, Flag, FlagId, FlagMap, FlagValue, Segment, SegmentMap,
	TraitMap,
};
pub use payload::{
	FeaturePayload, FeatureStatePayload, FlagsResponse, IdentityPayload, IdentityRef, NormalizedState,
	TraitIncrement, TraitPayload, TraitUpdate,
};
pub use snapshot::{ClientState, PersistedState};
