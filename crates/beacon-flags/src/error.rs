// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the flags SDK.

use thiserror::Error;

use crate::storage::StorageError;
use crate::transport::TransportError;

/// Result type alias for flags operations.
pub type Result<T> = std::result::Result<T, FlagsError>;

/// Errors that can occur in the flags SDK.
#[derive(Debug, Error)]
pub enum FlagsError {
	/// No environment key was configured.
	#[error("please specify an environment id")]
	MissingEnvironmentId,

	/// A configuration value could not be used.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// The request to the flags service failed.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// A persisted snapshot could not be parsed.
	#[error("cached state is corrupted: {0}")]
	CacheCorruption(String),

	/// The persistent store failed.
	#[error(transparent)]
	Storage(#[from] StorageError),

	/// Operation requires `initialize` to have been called.
	#[error("attempted to {0} before the client was initialized")]
	NotInitialized(&'static str),

	/// Trait writes need an identified user.
	#[error("attempted to {0} without an identity; call identify first")]
	MissingIdentity(&'static str),

	/// Failed to serialize a request body or snapshot.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// The default HTTP transport could not be built.
	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[from] reqwest::Error),
}

impl FlagsError {
	/// The service's error body when the failure was a non-2xx response.
	pub fn response_body(&self) -> Option<&serde_json::Value> {
		match self {
			FlagsError::Transport(TransportError::Status { body, .. }) => Some(body),
			_ => None,
		}
	}
}
