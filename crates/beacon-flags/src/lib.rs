// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side feature flags SDK for Beacon.
//!
//! This crate keeps a local copy of an environment's flags (and, for an
//! identified user, their traits and segments) in sync with the flags service.
//! Reads are synchronous and never touch the network.
//!
//! # Features
//!
//! - **Local Reads**: `has_feature`, `get_value`, `get_trait` from memory
//! - **Reconciliation**: every fetch replaces the flag map atomically and
//!   reports what changed
//! - **Caching**: state is persisted to a pluggable key-value store and
//!   restored on startup, so flags are available before the first fetch
//! - **Polling**: optional periodic refresh
//! - **Evaluation Events**: per-flag evaluation counts batched to the service
//!
//! # Example
//!
//! ```ignore
//! use beacon_flags::{FlagsClient, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FlagsClient::builder()
//!         .environment_id("env_key")
//!         .enable_caching(true)
//!         .store(MemoryStore::new())
//!         .send_evaluation_events(true)
//!         .on_change(|previous, info| {
//!             println!("flags changed: {} (was {} flags)", info.flags_changed, previous.len());
//!         })
//!         .build_and_initialize()
//!         .await?;
//!
//!     if client.has_feature("chat_box") {
//!         let value = client.get_value("chat_box");
//!     }
//!
//!     client.identify("user-123").await?;
//!     let plan = client.get_trait("plan");
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod analytics;
mod cache;
mod client;
mod config;
mod error;
mod poll;
mod reconcile;
mod storage;
mod store;
mod sync;
mod transport;

pub use analytics::DEFAULT_FLUSH_INTERVAL;
pub use cache::{EVENTS_KEY, STATE_KEY};
pub use client::{FlagsClient, FlagsClientBuilder};
pub use config::ClientConfig;
pub use error::{FlagsError, Result};
pub use poll::TimerKind;
pub use reconcile::{ChangeInfo, OnChange};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageError};
pub use sync::OnError;
pub use transport::{
	HttpTransport, Method, SharedTransport, Transport, TransportError, TransportRequest,
	ENVIRONMENT_KEY_HEADER,
};

// Re-export core types for convenience
pub use beacon_flags_core::{
	normalize_key, ClientState, Environment, EvaluationCounters, Flag, FlagId, FlagMap, FlagValue,
	PersistedState, Segment, SegmentMap, TraitMap, DEFAULT_API_URL,
};
