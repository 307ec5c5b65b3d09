// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persists client state to the key-value store and restores it on startup.
//!
//! Writes are requested synchronously (reads of flags must not wait on I/O)
//! and carried out by a single background writer. The writer always
//! serializes the state as it is when the write runs, so the store converges
//! on the latest committed snapshot no matter how requests interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beacon_flags_core::{Environment, EvaluationCounters, FlagMap, PersistedState};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::error::{FlagsError, Result};
use crate::storage::SharedStore;
use crate::store::StateStore;

/// Key holding the serialized client state.
pub const STATE_KEY: &str = "BEACON_FLAGS_STATE";
/// Key holding the serialized evaluation counters.
pub const EVENTS_KEY: &str = "BEACON_FLAGS_EVENTS";

#[derive(Debug)]
enum PersistCommand {
	State,
	Counters,
	Drain(oneshot::Sender<()>),
}

pub struct CachePersistence {
	store: Option<SharedStore>,
	caching_enabled: bool,
	events_enabled: bool,
	state: Arc<StateStore>,
	tx: mpsc::UnboundedSender<PersistCommand>,
	rx: Mutex<Option<mpsc::UnboundedReceiver<PersistCommand>>>,
	started: AtomicBool,
}

impl CachePersistence {
	pub fn new(
		store: Option<SharedStore>,
		caching_enabled: bool,
		events_enabled: bool,
		state: Arc<StateStore>,
	) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			caching_enabled: caching_enabled && store.is_some(),
			events_enabled: events_enabled && store.is_some(),
			store,
			state,
			tx,
			rx: Mutex::new(Some(rx)),
			started: AtomicBool::new(false),
		}
	}

	/// Caching needs both a store and the caller opting in.
	pub fn caching_enabled(&self) -> bool {
		self.caching_enabled
	}

	/// Spawns the background writer. Requests made before this call are
	/// queued and written once it runs.
	pub fn start(&self) {
		let Some(rx) = self.rx.lock().take() else {
			return;
		};
		let Some(store) = self.store.clone() else {
			return;
		};

		self.started.store(true, Ordering::SeqCst);
		let state = Arc::clone(&self.state);
		tokio::spawn(run_writer(store, state, rx));
		debug!("Cache writer started");
	}

	/// Requests a write of the client state.
	pub fn snapshot_state(&self) {
		if self.caching_enabled {
			self.send(PersistCommand::State);
		}
	}

	/// Requests a write of the evaluation counters.
	pub fn snapshot_counters(&self) {
		if self.events_enabled {
			self.send(PersistCommand::Counters);
		}
	}

	/// Waits until every write requested so far has reached the store.
	pub async fn drain(&self) {
		if !self.started.load(Ordering::SeqCst) {
			return;
		}
		let (tx, rx) = oneshot::channel();
		if self.tx.send(PersistCommand::Drain(tx)).is_ok() {
			let _ = rx.await;
		}
	}

	/// Reads the cached client state.
	///
	/// Returns `Ok(None)` when caching is off, nothing is stored, or the
	/// snapshot belongs to another base URL or environment.
	pub async fn load_state(&self, environment: &Environment) -> Result<Option<PersistedState>> {
		if !self.caching_enabled {
			return Ok(None);
		}
		let Some(store) = &self.store else {
			return Ok(None);
		};
		let Some(raw) = store.get_item(STATE_KEY).await? else {
			debug!("No cached state");
			return Ok(None);
		};

		let snapshot: PersistedState =
			serde_json::from_str(&raw).map_err(|e| FlagsError::CacheCorruption(e.to_string()))?;

		if !environment.matches(&snapshot) {
			info!(
				cached_environment = ?snapshot.environment_id,
				environment = %environment.environment_id,
				"Discarding cached state for a different environment"
			);
			return Ok(None);
		}

		Ok(Some(snapshot))
	}

	/// Restores the cached client state into the state store.
	///
	/// Returns the flags held before the restore, or `None` if nothing was
	/// restored.
	pub async fn restore_state(&self, environment: &Environment) -> Result<Option<FlagMap>> {
		let Some(snapshot) = self.load_state(environment).await? else {
			return Ok(None);
		};
		let flag_count = snapshot.flags.as_ref().map(|f| f.len()).unwrap_or(0);
		let previous = self.state.merge(snapshot);
		info!(flags = flag_count, "Restored flags from cache");
		Ok(Some(previous))
	}

	/// Restores evaluation counters that were not flushed before the last exit.
	pub async fn restore_counters(&self) -> Result<bool> {
		if !self.events_enabled {
			return Ok(false);
		}
		let Some(store) = &self.store else {
			return Ok(false);
		};
		let Some(raw) = store.get_item(EVENTS_KEY).await? else {
			return Ok(false);
		};

		let counters: EvaluationCounters =
			serde_json::from_str(&raw).map_err(|e| FlagsError::CacheCorruption(e.to_string()))?;
		debug!(flags = counters.len(), "Restored evaluation counters from cache");

		self.state.merge(PersistedState {
			evaluation_event_counters: Some(counters),
			..Default::default()
		});
		Ok(true)
	}

	fn send(&self, command: PersistCommand) {
		if self.tx.send(command).is_err() {
			trace!("Cache writer gone, dropping write");
		}
	}
}

async fn run_writer(
	store: SharedStore,
	state: Arc<StateStore>,
	mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
	while let Some(first) = rx.recv().await {
		let mut write_state = false;
		let mut write_counters = false;
		let mut waiters = Vec::new();

		// Coalesce everything already queued into a single write per key.
		let mut next = Some(first);
		while let Some(command) = next {
			match command {
				PersistCommand::State => write_state = true,
				PersistCommand::Counters => write_counters = true,
				PersistCommand::Drain(tx) => waiters.push(tx),
			}
			next = rx.try_recv().ok();
		}

		if write_state {
			let snapshot = state.read();
			match serde_json::to_string(&snapshot) {
				Ok(json) => {
					trace!(bytes = json.len(), "Writing state to cache");
					if let Err(e) = store.set_item(STATE_KEY, &json).await {
						warn!(error = %e, "Failed to write state to cache");
					}
				}
				Err(e) => warn!(error = %e, "Failed to serialize state"),
			}
		}

		if write_counters {
			match serde_json::to_string(&state.counters()) {
				Ok(json) => {
					if let Err(e) = store.set_item(EVENTS_KEY, &json).await {
						warn!(error = %e, "Failed to write evaluation counters to cache");
					}
				}
				Err(e) => warn!(error = %e, "Failed to serialize evaluation counters"),
			}
		}

		for waiter in waiters {
			let _ = waiter.send(());
		}
	}

	debug!("Cache writer stopped");
}
