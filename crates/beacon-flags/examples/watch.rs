// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prints an environment's flags and every change to them.
//!
//! ```text
//! BEACON_ENVIRONMENT_ID=... BEACON_POLL_INTERVAL_MS=5000 \
//!     cargo run -p beacon-flags --example watch -- 60
//! ```
//!
//! The optional argument is how many seconds to watch for (default 30).

use std::time::Duration;

use beacon_flags::{ClientConfig, FileStore, FlagsClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let seconds: u64 = std::env::args()
		.nth(1)
		.map(|arg| arg.parse::<u64>())
		.transpose()?
		.unwrap_or(30);

	let mut config = ClientConfig::from_env()?;
	config.enable_caching = true;

	let client = FlagsClient::builder()
		.config(config)
		.store(FileStore::from_xdg()?)
		.on_change(|previous, change| {
			info!(
				from_server = change.is_from_server,
				flags_changed = change.flags_changed,
				traits_changed = change.traits_changed,
				previous = previous.len(),
				"Flags changed"
			);
		})
		.on_error(|e| warn!(error = %e, "Flags request failed"))
		.build_and_initialize()
		.await?;

	let mut flags: Vec<_> = client.get_all_flags().into_iter().collect();
	flags.sort_by(|a, b| a.0.cmp(&b.0));
	for (name, flag) in flags {
		match flag.value {
			Some(value) => println!("{name:<32} enabled={:<5} value={value}", flag.enabled),
			None => println!("{name:<32} enabled={}", flag.enabled),
		}
	}

	tokio::time::sleep(Duration::from_secs(seconds)).await;
	client.shutdown().await?;
	Ok(())
}
