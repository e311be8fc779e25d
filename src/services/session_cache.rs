// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device-local session cache.
//!
//! Holds a serialized copy of the resolved user so a surface can show the
//! signed-in state at startup without a network round-trip. Two keys are
//! used: `user` (the payload) and `authUser` (a bare existence flag that can
//! be checked without decoding the payload).

use crate::error::AppError;
use crate::models::User;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const USER_KEY: &str = "user";
pub const AUTH_FLAG_KEY: &str = "authUser";

/// Minimal persisted string key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// In-memory store, for tests and surfaces without persistent storage.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, String>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON file store. The whole map is rewritten on every change, via a
/// temporary file and rename so a crash never leaves a torn file.
pub struct FileKvStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, AppError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AppError::SessionCache(format!("Corrupt store {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(AppError::SessionCache(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(map)
            .map_err(|e| AppError::SessionCache(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::SessionCache(e.to_string()))?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw).map_err(|e| AppError::SessionCache(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| AppError::SessionCache(e.to_string()))
    }

    fn update<F>(&self, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::SessionCache("Store lock poisoned".to_string()))?;
        // A corrupt file is replaced rather than blocking every future write.
        let mut map = self.read_map().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable session store");
            BTreeMap::new()
        });
        f(&mut map);
        self.write_map(&map)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

/// Typed view of the session keys over any [`KvStore`].
pub struct SessionCache<K> {
    store: K,
}

impl<K: KvStore> SessionCache<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Load the cached user. Unreadable or corrupt payloads count as absent.
    pub fn load(&self) -> Option<User> {
        let raw = match self.store.get(USER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Session cache unreadable");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding corrupt cached session");
                None
            }
        }
    }

    /// Persist `user` (without its password hash) and set the flag.
    pub fn save(&self, user: &User) -> Result<(), AppError> {
        let raw = serde_json::to_string(&user.redacted())
            .map_err(|e| AppError::SessionCache(e.to_string()))?;
        self.store.set(USER_KEY, &raw)?;
        self.store.set(AUTH_FLAG_KEY, "true")
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(USER_KEY)?;
        self.store.remove(AUTH_FLAG_KEY)
    }

    /// Fast existence check on the `authUser` flag alone.
    pub fn has_session(&self) -> bool {
        matches!(self.store.get(AUTH_FLAG_KEY), Ok(Some(v)) if v == "true")
    }
}
