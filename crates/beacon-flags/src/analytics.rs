// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag evaluation counting and batched delivery.
//!
//! Every `has_feature` / `get_value` on a known flag increments a per-flag
//! counter when evaluation events are enabled. The counters are written
//! through to the cache on every increment and sent to
//! `POST {base}analytics/flags/` by [`AnalyticsBatcher::flush`], which the
//! client runs on a timer.
//!
//! # Delivery guarantee
//!
//! Delivery is at-least-once. A failed flush keeps the counters for the next
//! tick. If the service recorded a batch but the response was lost, that
//! batch is sent again and counted twice. Counts are a usage metric, so this
//! relaxed guarantee is accepted.
//!
//! | Body field | Meaning |
//! |------------|---------|
//! | `"<flag id>"` | Evaluations since the last successful flush |

use std::sync::Arc;
use std::time::Duration;

use beacon_flags_core::{Environment, Flag};
use tracing::{debug, trace};

use crate::cache::CachePersistence;
use crate::error::Result;
use crate::store::StateStore;
use crate::transport::{Method, SharedTransport, TransportRequest};

/// Interval between automatic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

const ANALYTICS_PATH: &str = "analytics/flags/";

pub struct AnalyticsBatcher {
	enabled: bool,
	environment: Environment,
	state: Arc<StateStore>,
	cache: Arc<CachePersistence>,
	transport: SharedTransport,
}

impl AnalyticsBatcher {
	pub fn new(
		enabled: bool,
		environment: Environment,
		state: Arc<StateStore>,
		cache: Arc<CachePersistence>,
		transport: SharedTransport,
	) -> Self {
		Self {
			enabled,
			environment,
			state,
			cache,
			transport,
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Counts one evaluation of `flag`. Unknown flags are not counted.
	pub fn record_evaluation(&self, flag: Option<&Flag>) {
		if !self.enabled {
			return;
		}
		let Some(flag) = flag else {
			return;
		};

		let count = self.state.record_evaluation(flag.id);
		trace!(flag_id = flag.id, count, "Recorded flag evaluation");
		self.cache.snapshot_counters();
	}

	/// Sends pending counts. Returns the number of evaluations delivered.
	///
	/// On success exactly the delivered counts are removed; evaluations
	/// recorded while the request was in flight stay for the next flush. On
	/// failure nothing is removed.
	pub async fn flush(&self) -> Result<u64> {
		let pending = self.state.counters();
		if pending.is_empty() {
			return Ok(0);
		}

		let total: u64 = pending.values().sum();
		let body = serde_json::to_string(&pending)?;
		let request = TransportRequest::new(
			self.environment.endpoint(ANALYTICS_PATH),
			Method::Post,
			&self.environment.environment_id,
			Some(body),
		);

		debug!(flags = pending.len(), evaluations = total, "Flushing evaluation counts");
		self.transport.request(request).await?;

		self.state.acknowledge(&pending);
		// The cached client state carries the counters too.
		self.cache.snapshot_counters();
		self.cache.snapshot_state();
		debug!(evaluations = total, "Evaluation counts delivered");
		Ok(total)
	}
}
