// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::snapshot::PersistedState;

/// Default base URL of the flags API.
pub const DEFAULT_API_URL: &str = "https://api.bullet-train.io/api/v1/";

/// The API base URL and environment key a client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
	/// Always ends with `/`.
	pub api_base_url: String,
	pub environment_id: String,
}

impl Environment {
	pub fn new(api_base_url: impl AsRef<str>, environment_id: impl Into<String>) -> Self {
		Self {
			api_base_url: Self::normalize_base_url(api_base_url.as_ref()),
			environment_id: environment_id.into(),
		}
	}

	/// Appends a trailing `/` so endpoint paths can be concatenated.
	pub fn normalize_base_url(url: &str) -> String {
		let trimmed = url.trim();
		if trimmed.ends_with('/') {
			trimmed.to_string()
		} else {
			format!("{trimmed}/")
		}
	}

	/// Validates the environment key format.
	///
	/// Valid keys are non-empty and contain no whitespace or control characters.
	pub fn validate_id(id: &str) -> bool {
		!id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control())
	}

	/// Joins an endpoint path (e.g. `flags/`) onto the base URL.
	pub fn endpoint(&self, path: &str) -> String {
		format!("{}{}", self.api_base_url, path)
	}

	/// URL of the identity endpoint for `identifier`.
	pub fn identity_url(&self, identifier: &str) -> String {
		format!(
			"{}identities/?identifier={}",
			self.api_base_url,
			urlencoding::encode(identifier)
		)
	}

	/// Stale-environment guard: a persisted snapshot may only be restored into a
	/// client configured for the same base URL and environment key.
	pub fn matches(&self, snapshot: &PersistedState) -> bool {
		let same_api = snapshot
			.api_base_url
			.as_deref()
			.map(|url| Self::normalize_base_url(url) == self.api_base_url)
			.unwrap_or(false);
		let same_env = snapshot.environment_id.as_deref() == Some(self.environment_id.as_str());
		same_api && same_env
	}
}
