// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Public flags client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_flags_core::{
	normalize_key, ClientState, Environment, FlagMap, FlagValue, PersistedState, SegmentMap,
};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{FlagsError, Result};
use crate::reconcile::{ChangeInfo, OnChange};
use crate::storage::{KeyValueStore, SharedStore};
use crate::sync::{OnError, SyncEngine};
use crate::transport::{HttpTransport, SharedTransport, Transport};

/// SDK name for identification.
const SDK_NAME: &str = "beacon-flags-rust";
/// SDK version for identification.
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builder for constructing a [`FlagsClient`].
pub struct FlagsClientBuilder {
	config: ClientConfig,
	transport: Option<SharedTransport>,
	store: Option<SharedStore>,
	on_change: Option<OnChange>,
	on_error: Option<OnError>,
}

impl FlagsClientBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			config: ClientConfig::default(),
			transport: None,
			store: None,
			on_change: None,
			on_error: None,
		}
	}

	/// Replaces every option with `config`.
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;
		self
	}

	/// Sets the environment key. Required.
	pub fn environment_id(mut self, id: impl Into<String>) -> Self {
		self.config.environment_id = Some(id.into());
		self
	}

	/// Sets the base URL of the flags API.
	///
	/// Example: `https://flags.example.com/api/v1/`
	pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
		self.config.api_base_url = url.into();
		self
	}

	/// Flags served until the first fetch or cache restore.
	pub fn default_flags(mut self, flags: FlagMap) -> Self {
		self.config.default_flags = flags;
		self
	}

	pub fn prevent_initial_fetch(mut self, prevent: bool) -> Self {
		self.config.prevent_initial_fetch = prevent;
		self
	}

	/// Restores from and persists to the configured store.
	pub fn enable_caching(mut self, enable: bool) -> Self {
		self.config.enable_caching = enable;
		self
	}

	/// Counts flag evaluations and sends them to the service.
	pub fn send_evaluation_events(mut self, enable: bool) -> Self {
		self.config.send_evaluation_events = enable;
		self
	}

	/// Polls for changes at `interval` once initialized.
	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.config.poll_interval = Some(interval);
		self
	}

	pub fn analytics_interval(mut self, interval: Duration) -> Self {
		self.config.analytics_interval = interval;
		self
	}

	/// Timeout of the default HTTP transport. Ignored with a custom transport.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Partial state applied when the client is built.
	pub fn restore_state(mut self, state: PersistedState) -> Self {
		self.config.restore_state = Some(state);
		self
	}

	pub fn transport(mut self, transport: impl Transport) -> Self {
		self.transport = Some(Arc::new(transport));
		self
	}

	pub fn store(mut self, store: impl KeyValueStore) -> Self {
		self.store = Some(Arc::new(store));
		self
	}

	/// Called after every committed fetch and after a cache restore, with the
	/// flags held before the change.
	pub fn on_change<F>(mut self, callback: F) -> Self
	where
		F: Fn(&FlagMap, &ChangeInfo) + Send + Sync + 'static,
	{
		self.on_change = Some(Arc::new(callback));
		self
	}

	/// Called for every failed fetch or trait write.
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&FlagsError) + Send + Sync + 'static,
	{
		self.on_error = Some(Arc::new(callback));
		self
	}

	/// Builds the client without touching the network.
	pub fn build(self) -> Result<FlagsClient> {
		let environment_id = self
			.config
			.environment_id
			.clone()
			.or_else(|| {
				self.config
					.restore_state
					.as_ref()
					.and_then(|state| state.environment_id.clone())
			})
			.ok_or(FlagsError::MissingEnvironmentId)?;
		if !Environment::validate_id(&environment_id) {
			return Err(FlagsError::InvalidConfig(format!(
				"environment id {environment_id:?} contains whitespace or control characters"
			)));
		}

		if self.config.poll_interval.is_some_and(|period| period.is_zero()) {
			return Err(FlagsError::InvalidConfig(
				"poll interval must be greater than zero".to_string(),
			));
		}
		if self.config.analytics_interval.is_zero() {
			return Err(FlagsError::InvalidConfig(
				"analytics interval must be greater than zero".to_string(),
			));
		}

		let environment = Environment::new(&self.config.api_base_url, environment_id);
		let transport = match self.transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(self.config.request_timeout)?),
		};

		info!(
			api_base_url = %environment.api_base_url,
			sdk_name = SDK_NAME,
			sdk_version = SDK_VERSION,
			"Flags client created"
		);

		let engine = SyncEngine::new(
			environment,
			self.config,
			transport,
			self.store,
			self.on_change,
			self.on_error,
		);
		Ok(FlagsClient {
			engine: Arc::new(engine),
		})
	}

	/// Builds the client and runs [`FlagsClient::initialize`].
	pub async fn build_and_initialize(self) -> Result<FlagsClient> {
		let client = self.build()?;
		client.initialize().await?;
		Ok(client)
	}
}

impl Default for FlagsClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Client for reading feature flags.
///
/// Reads are synchronous and served from local state; they never wait on the
/// network and never fail. Clones share the same state.
///
/// # Example
///
/// ```ignore
/// use beacon_flags::FlagsClient;
///
/// let client = FlagsClient::builder()
///     .environment_id("env_key")
///     .enable_caching(true)
///     .store(beacon_flags::FileStore::from_xdg()?)
///     .build_and_initialize()
///     .await?;
///
/// if client.has_feature("chat_box") {
///     println!("chat: {:?}", client.get_value("chat_box"));
/// }
///
/// client.identify("user-1").await?;
/// client.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct FlagsClient {
	engine: Arc<SyncEngine>,
}

impl FlagsClient {
	pub fn builder() -> FlagsClientBuilder {
		FlagsClientBuilder::new()
	}

	/// Restores cached state, starts configured timers, and fetches flags.
	///
	/// Must be called from within a Tokio runtime.
	pub async fn initialize(&self) -> Result<()> {
		self.engine.initialize().await
	}

	pub fn is_initialized(&self) -> bool {
		self.engine.is_initialized()
	}

	/// Fetches flags now.
	pub async fn get_flags(&self) -> Result<()> {
		self.engine.synchronize().await
	}

	/// Whether the flag is known and enabled. Counts an evaluation.
	pub fn has_feature(&self, key: &str) -> bool {
		let flag = self.engine.state.flag(&normalize_key(key));
		self.engine.analytics.record_evaluation(flag.as_ref());
		flag.map(|flag| flag.enabled).unwrap_or(false)
	}

	/// Value of the flag, if it is known and has one. Counts an evaluation.
	pub fn get_value(&self, key: &str) -> Option<FlagValue> {
		let flag = self.engine.state.flag(&normalize_key(key));
		self.engine.analytics.record_evaluation(flag.as_ref());
		flag.and_then(|flag| flag.value)
	}

	pub fn get_trait(&self, key: &str) -> Option<FlagValue> {
		self.engine.state.trait_value(&normalize_key(key))
	}

	pub fn get_all_flags(&self) -> FlagMap {
		self.engine.state.flags()
	}

	pub fn segments(&self) -> SegmentMap {
		self.engine.state.segments()
	}

	pub fn identity(&self) -> Option<String> {
		self.engine.state.identity()
	}

	/// Snapshot of the committed state.
	pub fn get_state(&self) -> ClientState {
		self.engine.state.read()
	}

	/// Overlays the fields present in `state` and persists the result. The
	/// configured base URL and environment are never replaced.
	pub fn set_state(&self, mut state: PersistedState) {
		state.api_base_url = None;
		state.environment_id = None;
		self.engine.state.merge(state);
		self.engine.cache.snapshot_state();
		debug!("State replaced by caller");
	}

	/// Switches to `identity` and fetches its flags, unless polling is
	/// running and will pick the change up.
	pub async fn identify(&self, identity: impl Into<String>) -> Result<()> {
		self.engine.identify(identity.into()).await
	}

	/// Clears the identity, its traits, and its segments. Flags are kept until
	/// the next fetch.
	pub async fn logout(&self) -> Result<()> {
		self.engine.logout().await
	}

	/// Sets one trait on the identified user, then refreshes.
	pub async fn set_trait(&self, key: &str, value: impl Into<Option<FlagValue>>) -> Result<()> {
		self.engine.set_trait(key, value.into()).await
	}

	/// Sets several traits on the identified user, then refreshes.
	pub async fn set_traits(&self, traits: &HashMap<String, Option<FlagValue>>) -> Result<()> {
		self.engine.set_traits(traits).await
	}

	/// Increments a numeric trait on the identified user, then refreshes.
	pub async fn increment_trait(&self, key: &str, increment_by: i64) -> Result<()> {
		self.engine.increment_trait(key, increment_by).await
	}

	/// Starts polling every `interval`. Does nothing if polling is running or
	/// `interval` is zero. After [`stop_listening`](Self::stop_listening) this
	/// also restarts the analytics timer when evaluation events are on.
	///
	/// Must be called from within a Tokio runtime.
	pub fn start_listening(&self, interval: Duration) -> bool {
		self.engine.start_listening(interval)
	}

	/// Stops polling and the analytics timer. Requests already sent complete.
	pub fn stop_listening(&self) {
		self.engine.stop_listening();
	}

	pub fn is_listening(&self) -> bool {
		self.engine.is_listening()
	}

	/// Number of running timers.
	pub fn active_timers(&self) -> usize {
		self.engine.active_timers()
	}

	/// Sends pending evaluation counts now. Returns the number delivered.
	pub async fn flush_analytics(&self) -> Result<u64> {
		self.engine.analytics.flush().await
	}

	/// Pending evaluation counts by flag id.
	pub fn evaluation_counts(&self) -> beacon_flags_core::EvaluationCounters {
		self.engine.state.counters()
	}

	/// Waits until every cache write requested so far has reached the store.
	pub async fn flush_cache(&self) {
		self.engine.cache.drain().await;
	}

	/// Stops timers, sends pending evaluation counts, and waits for cache
	/// writes to land.
	pub async fn shutdown(&self) -> Result<()> {
		self.engine.shutdown().await
	}
}

impl std::fmt::Debug for FlagsClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagsClient")
			.field("environment", &self.engine.environment)
			.field("initialized", &self.engine.is_initialized())
			.finish()
	}
}
