// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key-value boundary: the plain, non-secure persistence layer that the
// encrypted preference store wraps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use vigil_core::error::{Result, VigilError};
use vigil_core::types::PreferenceValue;

/// Generic preference persistence.
///
/// Backends implement the untyped `get`/`set`; the typed accessors are
/// provided on top. A typed getter returns `None` when the key is absent or
/// holds a value of another type.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PreferenceValue>>;

    async fn set(&self, key: &str, value: PreferenceValue) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn contains_key(&self, key: &str) -> Result<bool>;

    /// All keys, sorted.
    async fn keys(&self) -> Result<Vec<String>>;

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get(key).await? {
            Some(PreferenceValue::String(v)) => Some(v),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, PreferenceValue::String(value.to_owned())).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(match self.get(key).await? {
            Some(PreferenceValue::Bool(v)) => Some(v),
            _ => None,
        })
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, PreferenceValue::Bool(value)).await
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(match self.get(key).await? {
            Some(PreferenceValue::Int(v)) => Some(v),
            _ => None,
        })
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, PreferenceValue::Int(value)).await
    }

    async fn get_double(&self, key: &str) -> Result<Option<f64>> {
        Ok(match self.get(key).await? {
            Some(PreferenceValue::Double(v)) => Some(v),
            _ => None,
        })
    }

    async fn set_double(&self, key: &str, value: f64) -> Result<()> {
        self.set(key, PreferenceValue::Double(value)).await
    }

    async fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        Ok(match self.get(key).await? {
            Some(PreferenceValue::StringList(v)) => Some(v),
            _ => None,
        })
    }

    async fn set_string_list(&self, key: &str, value: Vec<String>) -> Result<()> {
        self.set(key, PreferenceValue::StringList(value)).await
    }
}

/// Process-local store. Writes can be made to fail for testing error paths.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, PreferenceValue>>,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutation fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VigilError::Preferences("store is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<PreferenceValue>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: PreferenceValue) -> Result<()> {
        self.check_writable()?;
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.entries.write().await.clear();
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
