// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistent key-value store adapter.
//!
//! The client keeps its cache in an async string store. Two implementations
//! ship with the SDK: [`MemoryStore`] and [`FileStore`]; anything else (a
//! keychain, a database row, browser-like local storage) implements
//! [`KeyValueStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid storage key: {0}")]
	InvalidKey(String),

	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Async string key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
	async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
	async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Type alias for a shared store.
pub type SharedStore = Arc<dyn KeyValueStore>;

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
	async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		(**self).get_item(key).await
	}

	async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		(**self).set_item(key, value).await
	}
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
	items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store pre-populated with `items`.
	pub fn with_items<I, K, V>(items: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			items: Mutex::new(
				items
					.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.items.lock().await.get(key).cloned())
	}

	async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self
			.items
			.lock()
			.await
			.insert(key.to_string(), value.to_string());
		Ok(())
	}
}

/// Store keeping one file per key in a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a crash
/// mid-write never leaves a truncated value behind.
#[derive(Debug, Clone)]
pub struct FileStore {
	dir: PathBuf,
}

impl FileStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	/// Uses `$XDG_DATA_HOME/beacon/flags` (or the platform equivalent).
	pub fn from_xdg() -> Result<Self, StorageError> {
		let data_dir = dirs::data_dir().ok_or_else(|| {
			StorageError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				"could not determine XDG data directory",
			))
		})?;

		let dir = data_dir.join("beacon").join("flags");
		std::fs::create_dir_all(&dir)?;

		info!(dir = %dir.display(), "initialized file flag store");

		Ok(Self::new(dir))
	}

	fn item_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		let valid = !key.is_empty()
			&& key
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
			&& !key.starts_with('.');
		if !valid {
			return Err(StorageError::InvalidKey(key.to_string()));
		}
		Ok(self.dir.join(key))
	}
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		let path = self.item_path(key)?;

		match tokio::fs::read_to_string(&path).await {
			Ok(contents) => {
				debug!(key = %key, path = %path.display(), "loaded item from disk");
				Ok(Some(contents))
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let path = self.item_path(key)?;
		tokio::fs::create_dir_all(&self.dir).await?;

		let tmp_path = self.dir.join(format!(".{key}.tmp"));
		tokio::fs::write(&tmp_path, value).await?;
		tokio::fs::rename(&tmp_path, &path).await?;

		debug!(key = %key, bytes = value.len(), "saved item to disk");
		Ok(())
	}
}
