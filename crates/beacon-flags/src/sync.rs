// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fetches flags from the service and drives the client lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_flags_core::{
	ClientState, Environment, FlagValue, FlagsResponse, IdentityPayload, TraitIncrement,
	TraitUpdate,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::analytics::AnalyticsBatcher;
use crate::cache::CachePersistence;
use crate::config::ClientConfig;
use crate::error::{FlagsError, Result};
use crate::poll::{PollScheduler, TimerKind};
use crate::reconcile::{ChangeInfo, OnChange, Reconciled, Reconciler};
use crate::storage::SharedStore;
use crate::store::{FetchTicket, StateStore};
use crate::transport::{Method, SharedTransport, TransportError, TransportRequest};

/// Error callback: receives every fetch or trait-write failure.
pub type OnError = Arc<dyn Fn(&FlagsError) + Send + Sync>;

const FLAGS_PATH: &str = "flags/";
const TRAITS_PATH: &str = "traits/";
const TRAITS_BULK_PATH: &str = "traits/bulk/";
const TRAITS_INCREMENT_PATH: &str = "traits/increment-value/";

pub(crate) struct SyncEngine {
	pub(crate) environment: Environment,
	pub(crate) state: Arc<StateStore>,
	pub(crate) cache: Arc<CachePersistence>,
	pub(crate) analytics: AnalyticsBatcher,
	config: ClientConfig,
	transport: SharedTransport,
	reconciler: Reconciler,
	scheduler: PollScheduler,
	on_error: Option<OnError>,
	initialized: AtomicBool,
	/// Claimed by the first `initialize` call so overlapping calls run once.
	initializing: AtomicBool,
}

impl SyncEngine {
	pub(crate) fn new(
		environment: Environment,
		config: ClientConfig,
		transport: SharedTransport,
		store: Option<SharedStore>,
		on_change: Option<OnChange>,
		on_error: Option<OnError>,
	) -> Self {
		let mut initial = ClientState {
			api_base_url: environment.api_base_url.clone(),
			environment_id: environment.environment_id.clone(),
			flags: config.default_flags.clone(),
			..Default::default()
		};
		if let Some(mut restore) = config.restore_state.clone() {
			// The configured target always wins over a caller-supplied snapshot.
			restore.api_base_url = None;
			restore.environment_id = None;
			initial.merge(restore);
		}

		let state = Arc::new(StateStore::new(initial));
		let cache = Arc::new(CachePersistence::new(
			store,
			config.enable_caching,
			config.send_evaluation_events,
			Arc::clone(&state),
		));
		let analytics = AnalyticsBatcher::new(
			config.send_evaluation_events,
			environment.clone(),
			Arc::clone(&state),
			Arc::clone(&cache),
			Arc::clone(&transport),
		);
		let reconciler = Reconciler::new(Arc::clone(&state), Arc::clone(&cache), on_change);

		Self {
			environment,
			state,
			cache,
			analytics,
			config,
			transport,
			reconciler,
			scheduler: PollScheduler::new(),
			on_error,
			initialized: AtomicBool::new(false),
			initializing: AtomicBool::new(false),
		}
	}

	pub(crate) fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	/// Fetches the current flags (and traits, for an identified user) and
	/// reconciles them into the state store.
	pub(crate) async fn synchronize(&self) -> Result<()> {
		let ticket = self.state.begin_fetch();
		match self.fetch(&ticket).await {
			Ok(payload) => {
				match self.reconciler.apply(ticket.generation, payload) {
					Reconciled::Committed(info) if info.flags_changed => {
						info!(identity = ?ticket.identity, "Flags updated");
					}
					Reconciled::Committed(_) => {}
					Reconciled::Superseded => {
						debug!(generation = ticket.generation, "Fetch result superseded");
					}
				}
				Ok(())
			}
			Err(e) => {
				self.report(&e);
				Err(e)
			}
		}
	}

	async fn fetch(&self, ticket: &FetchTicket) -> Result<IdentityPayload> {
		match &ticket.identity {
			Some(identity) => {
				let url = self.environment.identity_url(identity);
				debug!(identity = %identity, generation = ticket.generation, "Fetching identity flags");
				self.get_json(url).await
			}
			None => {
				let url = self.environment.endpoint(FLAGS_PATH);
				debug!(generation = ticket.generation, "Fetching environment flags");
				let flags: FlagsResponse = self.get_json(url).await?;
				Ok(flags.into_payload())
			}
		}
	}

	async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
		let request = TransportRequest::new(
			url,
			Method::Get,
			&self.environment.environment_id,
			None,
		);
		let body = self.transport.request(request).await?;
		serde_json::from_value(body)
			.map_err(|e| FlagsError::Transport(TransportError::InvalidBody(e.to_string())))
	}

	/// Restores cached state, starts the timers, and runs the first fetch.
	///
	/// With a usable cache this returns as soon as the cache is applied and
	/// the fetch continues in the background; otherwise it waits for the
	/// fetch. Later calls do nothing, including ones overlapping the first.
	pub(crate) async fn initialize(self: &Arc<Self>) -> Result<()> {
		if self
			.initializing
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			debug!("Client already initialized");
			return Ok(());
		}

		self.run_initialize().await
	}

	async fn run_initialize(self: &Arc<Self>) -> Result<()> {
		let before = self.state.read();
		let restored = match self.cache.restore_state(&self.environment).await {
			Ok(restored) => restored,
			Err(e) => {
				warn!(error = %e, "Ignoring cached state");
				None
			}
		};

		// The counters key is written on every evaluation and flush, so it wins
		// over the counters inside the cached state.
		if let Err(e) = self.cache.restore_counters().await {
			warn!(error = %e, "Ignoring cached evaluation counters");
		}
		if let Some(previous_flags) = &restored {
			let after = self.state.read();
			let info = ChangeInfo {
				is_from_server: false,
				flags_changed: *previous_flags != after.flags,
				traits_changed: before.traits != after.traits,
			};
			self.reconciler.notify(previous_flags, &info);
		}

		self.cache.start();
		self.initialized.store(true, Ordering::SeqCst);
		info!(
			environment = %self.environment.environment_id,
			caching = self.cache.caching_enabled(),
			from_cache = restored.is_some(),
			"Flags client initialized"
		);

		if self.analytics.is_enabled() {
			self.start_analytics(self.config.analytics_interval);
		}
		if let Some(period) = self.config.poll_interval {
			self.start_listening(period);
		}

		if self.config.prevent_initial_fetch {
			debug!("Initial fetch disabled");
			return Ok(());
		}

		if restored.is_some() {
			let engine = Arc::clone(self);
			tokio::spawn(async move {
				// Failures were already reported through the error callback.
				let _ = engine.synchronize().await;
			});
			Ok(())
		} else {
			self.synchronize().await
		}
	}

	/// Starts polling every `period`, and the analytics timer if it was
	/// stopped. Returns `false` if polling was already running or `period` is
	/// zero.
	pub(crate) fn start_listening(self: &Arc<Self>, period: Duration) -> bool {
		if self.is_initialized() && self.analytics.is_enabled() {
			self.start_analytics(self.config.analytics_interval);
		}

		let engine = Arc::downgrade(self);
		self.scheduler.start(TimerKind::FlagPolling, period, move || {
			let engine = engine.clone();
			async move {
				let Some(engine) = engine.upgrade() else {
					return false;
				};
				// Stopping the timer must not cancel a request already sent.
				let fetch = tokio::spawn(async move {
					let _ = engine.synchronize().await;
				});
				let _ = fetch.await;
				true
			}
		})
	}

	fn start_analytics(self: &Arc<Self>, period: Duration) {
		let engine = Arc::downgrade(self);
		self.scheduler.start(TimerKind::Analytics, period, move || {
			let engine = engine.clone();
			async move {
				let Some(engine) = engine.upgrade() else {
					return false;
				};
				let flush = tokio::spawn(async move {
					if let Err(e) = engine.analytics.flush().await {
						warn!(error = %e, "Failed to send evaluation counts, retrying next interval");
					}
				});
				let _ = flush.await;
				true
			}
		});
	}

	/// Stops every timer, analytics included.
	pub(crate) fn stop_listening(&self) {
		self.scheduler.stop_all();
	}

	pub(crate) fn is_listening(&self) -> bool {
		self.scheduler.is_running(TimerKind::FlagPolling)
	}

	pub(crate) fn active_timers(&self) -> usize {
		self.scheduler.active()
	}

	/// Switches to `identity`, fetching its flags right away unless polling
	/// will pick the change up.
	pub(crate) async fn identify(&self, identity: String) -> Result<()> {
		info!(identity = %identity, "Identifying user");
		self.state.set_identity(Some(identity));
		self.cache.snapshot_state();
		self.resync_after_identity_change().await
	}

	pub(crate) async fn logout(&self) -> Result<()> {
		info!("Logging out");
		self.state.clear_identity();
		self.cache.snapshot_state();
		self.resync_after_identity_change().await
	}

	async fn resync_after_identity_change(&self) -> Result<()> {
		if self.is_initialized() && !self.is_listening() {
			self.synchronize().await
		} else {
			Ok(())
		}
	}

	pub(crate) async fn set_trait(&self, key: &str, value: Option<FlagValue>) -> Result<()> {
		let identity = self.require_identity("set a trait")?;
		let body = serde_json::to_string(&TraitUpdate::new(identity, key, value))?;
		self.write_traits(Method::Post, TRAITS_PATH, body).await
	}

	pub(crate) async fn set_traits(&self, traits: &HashMap<String, Option<FlagValue>>) -> Result<()> {
		let identity = self.require_identity("set traits")?;
		let body = serde_json::to_string(&TraitUpdate::bulk(&identity, traits))?;
		self.write_traits(Method::Put, TRAITS_BULK_PATH, body).await
	}

	pub(crate) async fn increment_trait(&self, key: &str, increment_by: i64) -> Result<()> {
		let identity = self.require_identity("increment a trait")?;
		let body = serde_json::to_string(&TraitIncrement {
			trait_key: key.to_string(),
			increment_by,
			identifier: identity,
		})?;
		self.write_traits(Method::Post, TRAITS_INCREMENT_PATH, body).await
	}

	fn require_identity(&self, operation: &'static str) -> Result<String> {
		if !self.is_initialized() {
			return Err(FlagsError::NotInitialized(operation));
		}
		self.state
			.identity()
			.ok_or(FlagsError::MissingIdentity(operation))
	}

	/// Sends a trait write, then refreshes so the new traits and any flags
	/// they affect are reflected locally.
	async fn write_traits(&self, method: Method, path: &str, body: String) -> Result<()> {
		let request = TransportRequest::new(
			self.environment.endpoint(path),
			method,
			&self.environment.environment_id,
			Some(body),
		);
		if let Err(e) = self.transport.request(request).await {
			let e = FlagsError::from(e);
			self.report(&e);
			return Err(e);
		}
		debug!(path, "Trait write accepted");
		self.synchronize().await
	}

	/// Stops timers, sends pending evaluation counts, and waits for cache
	/// writes to land.
	pub(crate) async fn shutdown(&self) -> Result<()> {
		self.scheduler.stop_all();
		let flushed = if self.analytics.is_enabled() {
			self.analytics.flush().await.map(|_| ())
		} else {
			Ok(())
		};
		self.cache.drain().await;
		info!("Flags client shut down");
		flushed
	}

	fn report(&self, error: &FlagsError) {
		warn!(error = %error, "Flags request failed");
		if let Some(on_error) = &self.on_error {
			on_error(error);
		}
	}
}
