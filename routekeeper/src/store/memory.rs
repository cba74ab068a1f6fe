//! In-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::{KeyValueStore, StoreError};

/// Process-local [`KeyValueStore`].
///
/// Writes can be made to fail with [`MemoryStore::set_fail_writes`], which
/// is how tests exercise the "persist failed" paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Synchronous peek, for tests and diagnostics.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Backend("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Value>, StoreError>> {
        let value = self.values.lock().unwrap().get(key).cloned();
        async move { Ok(value) }.boxed()
    }

    fn set(&self, key: &str, value: Value) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        async move {
            self.check_writable()?;
            self.values.lock().unwrap().insert(key, value);
            Ok(())
        }
        .boxed()
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        async move {
            self.check_writable()?;
            self.values.lock().unwrap().remove(&key);
            Ok(())
        }
        .boxed()
    }
}
