//! Persistent key-value store contract.
//!
//! The store is the sole durable source of truth for queues, histories and
//! the last known location. Values are JSON documents and every write
//! replaces the whole value under a key; there is no partial or
//! transactional update, so readers must treat what they load as an
//! eventually-consistent snapshot.
//!
//! The durable backend belongs to the embedding platform. [`MemoryStore`]
//! is provided for tests, the CLI and hosts without persistence.

pub mod keys;
mod memory;

pub use memory::MemoryStore;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors from the key-value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A value exists but does not have the expected structure.
    #[error("corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// A value could not be encoded for storage.
    #[error("failed to encode value for '{key}': {reason}")]
    Encode { key: String, reason: String },
}

impl StoreError {
    /// Key of the corrupted value, if this is a corruption error.
    pub fn corrupted_key(&self) -> Option<&str> {
        match self {
            StoreError::Corrupt { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Async key-value store holding JSON values.
///
/// Object safe so components can share an `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Value>, StoreError>>;

    fn set(&self, key: &str, value: Value) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Load and decode a typed value.
///
/// A value that exists but does not decode is reported as
/// [`StoreError::Corrupt`] so callers can route it to recovery.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

/// Encode and store a typed value, replacing whatever was there.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let encoded = serde_json::to_value(value).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, encoded).await
}
