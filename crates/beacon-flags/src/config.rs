// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.

use std::time::Duration;

use beacon_flags_core::{FlagMap, PersistedState, DEFAULT_API_URL};

use crate::analytics::DEFAULT_FLUSH_INTERVAL;
use crate::error::{FlagsError, Result};

pub const ENV_ENVIRONMENT_ID: &str = "BEACON_ENVIRONMENT_ID";
pub const ENV_API_URL: &str = "BEACON_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "BEACON_POLL_INTERVAL_MS";
pub const ENV_ANALYTICS_INTERVAL_MS: &str = "BEACON_ANALYTICS_INTERVAL_MS";
pub const ENV_ENABLE_CACHING: &str = "BEACON_ENABLE_CACHING";
pub const ENV_SEND_EVALUATION_EVENTS: &str = "BEACON_SEND_EVALUATION_EVENTS";
pub const ENV_PREVENT_INITIAL_FETCH: &str = "BEACON_PREVENT_INITIAL_FETCH";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "BEACON_REQUEST_TIMEOUT_MS";

/// Configuration for the flags client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Environment key sent with every request. Required.
	pub environment_id: Option<String>,
	/// Base URL of the flags API.
	pub api_base_url: String,
	/// Flags served before the first fetch or cache restore.
	pub default_flags: FlagMap,
	/// Skip the network fetch during `initialize`.
	pub prevent_initial_fetch: bool,
	/// Restore from and persist to the key-value store.
	pub enable_caching: bool,
	/// Count flag evaluations and send them to the service.
	pub send_evaluation_events: bool,
	/// Start flag polling at this interval during `initialize`.
	pub poll_interval: Option<Duration>,
	/// Interval between evaluation-count flushes.
	pub analytics_interval: Duration,
	/// Timeout applied by the default HTTP transport.
	pub request_timeout: Duration,
	/// Partial state applied during `build`.
	pub restore_state: Option<PersistedState>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			environment_id: None,
			api_base_url: DEFAULT_API_URL.to_string(),
			default_flags: FlagMap::new(),
			prevent_initial_fetch: false,
			enable_caching: false,
			send_evaluation_events: false,
			poll_interval: None,
			analytics_interval: DEFAULT_FLUSH_INTERVAL,
			request_timeout: Duration::from_secs(30),
			restore_state: None,
		}
	}
}

impl ClientConfig {
	/// Defaults overlaid with `BEACON_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Defaults overlaid with the values `lookup` returns.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = Self::default();

		if let Some(id) = lookup(ENV_ENVIRONMENT_ID) {
			config.environment_id = Some(id);
		}
		if let Some(url) = lookup(ENV_API_URL) {
			config.api_base_url = url;
		}
		if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
			config.poll_interval = Some(parse_millis(ENV_POLL_INTERVAL_MS, &raw)?);
		}
		if let Some(raw) = lookup(ENV_ANALYTICS_INTERVAL_MS) {
			config.analytics_interval = parse_millis(ENV_ANALYTICS_INTERVAL_MS, &raw)?;
		}
		if let Some(raw) = lookup(ENV_ENABLE_CACHING) {
			config.enable_caching = parse_bool(ENV_ENABLE_CACHING, &raw)?;
		}
		if let Some(raw) = lookup(ENV_SEND_EVALUATION_EVENTS) {
			config.send_evaluation_events = parse_bool(ENV_SEND_EVALUATION_EVENTS, &raw)?;
		}
		if let Some(raw) = lookup(ENV_PREVENT_INITIAL_FETCH) {
			config.prevent_initial_fetch = parse_bool(ENV_PREVENT_INITIAL_FETCH, &raw)?;
		}
		if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
			config.request_timeout = parse_millis(ENV_REQUEST_TIMEOUT_MS, &raw)?;
		}

		Ok(config)
	}
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		other => Err(FlagsError::InvalidConfig(format!(
			"{name}: expected a boolean, got {other:?}"
		))),
	}
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration> {
	let millis: u64 = raw
		.trim()
		.parse()
		.map_err(|_| FlagsError::InvalidConfig(format!("{name}: expected milliseconds, got {raw:?}")))?;
	if millis == 0 {
		return Err(FlagsError::InvalidConfig(format!(
			"{name}: interval must be greater than zero"
		)));
	}
	Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_defaults() {
		let config = ClientConfig::default();
		assert_eq!(config.api_base_url, DEFAULT_API_URL);
		assert_eq!(config.analytics_interval, Duration::from_secs(10));
		assert!(config.poll_interval.is_none());
		assert!(!config.enable_caching);
		assert!(!config.send_evaluation_events);
	}

	#[test]
	fn test_env_overrides() {
		let config = ClientConfig::from_lookup(lookup(&[
			(ENV_ENVIRONMENT_ID, "abc"),
			(ENV_API_URL, "https://flags.example.com/api/v1"),
			(ENV_POLL_INTERVAL_MS, "5000"),
			(ENV_ENABLE_CACHING, "true"),
			(ENV_SEND_EVALUATION_EVENTS, "1"),
			(ENV_PREVENT_INITIAL_FETCH, "off"),
		]))
		.unwrap();

		assert_eq!(config.environment_id.as_deref(), Some("abc"));
		assert_eq!(config.api_base_url, "https://flags.example.com/api/v1");
		assert_eq!(config.poll_interval, Some(Duration::from_millis(5000)));
		assert!(config.enable_caching);
		assert!(config.send_evaluation_events);
		assert!(!config.prevent_initial_fetch);
	}

	#[test]
	fn test_invalid_values_rejected() {
		let result = ClientConfig::from_lookup(lookup(&[(ENV_ENABLE_CACHING, "maybe")]));
		assert!(matches!(result, Err(FlagsError::InvalidConfig(_))));

		let result = ClientConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, "soon")]));
		assert!(matches!(result, Err(FlagsError::InvalidConfig(_))));

		let result = ClientConfig::from_lookup(lookup(&[(ENV_ANALYTICS_INTERVAL_MS, "0")]));
		assert!(matches!(result, Err(FlagsError::InvalidConfig(_))));
	}
}
