//! Key/value state store the simulator publishes to and takes commands from.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use crate::publish::PointValue;

/// Errors raised by a [`StateStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot decode state file: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("store rejected write to {0}")]
    Rejected(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// A change delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub key: String,
    pub value: PointValue,
    /// `true` for echoes of the simulator's own writes, `false` for commands.
    pub ack: bool,
}

/// Collaborator contract for state persistence and command delivery.
pub trait StateStore {
    /// Last persisted value of `key`.
    fn read(&self, key: &str) -> Result<Option<PointValue>, StoreError>;

    /// Upserts `key`. `ack = false` marks an externally originated command.
    fn write(&mut self, key: &str, value: PointValue, ack: bool) -> Result<(), StoreError>;

    /// Registers interest in keys. A pattern is an exact key or `prefix.*`.
    fn subscribe(&mut self, patterns: &[&str]) -> Result<(), StoreError>;

    /// Drains pending notifications in arrival order.
    fn poll_notifications(&mut self) -> Vec<Notification>;

    /// Persists buffered state, if the store has a backing file.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

/// In-memory store with optional JSON file persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, PointValue>,
    subscriptions: Vec<String>,
    inbox: VecDeque<Notification>,
    path: Option<PathBuf>,
    dirty: bool,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store persisted at `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` or `StoreError::Decode` if an existing file
    /// cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let values = if path.exists() {
            let text = fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(StoreError::Decode)?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "state store opened");
        Ok(Self {
            values,
            path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// External command entry point (`ack = false`).
    pub fn inject(&mut self, key: &str, value: impl Into<PointValue>) -> Result<(), StoreError> {
        self.write(key, value.into(), false)
    }

    pub fn get(&self, key: &str) -> Option<&PointValue> {
        self.values.get(key)
    }

    /// Copy of every stored value.
    pub fn snapshot(&self) -> BTreeMap<String, PointValue> {
        self.values.clone()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Makes every subsequent write fail, for exercising degraded operation.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<PointValue>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: PointValue, ack: bool) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Rejected(key.to_string()));
        }
        self.values.insert(key.to_string(), value.clone());
        self.dirty = true;
        if self.subscriptions.iter().any(|p| pattern_matches(p, key)) {
            self.inbox.push_back(Notification {
                key: key.to_string(),
                value,
                ack,
            });
        }
        Ok(())
    }

    fn subscribe(&mut self, patterns: &[&str]) -> Result<(), StoreError> {
        for p in patterns {
            if !self.subscriptions.iter().any(|s| s == p) {
                self.subscriptions.push((*p).to_string());
            }
        }
        Ok(())
    }

    fn poll_notifications(&mut self) -> Vec<Notification> {
        self.inbox.drain(..).collect()
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(&self.values).map_err(StoreError::Encode)?;
        fs::write(path, text)?;
        self.dirty = false;
        Ok(())
    }
}

/// Thread-safe handle to a [`MemoryStore`], shared with the HTTP surface.
///
/// Commands injected through the handle wake the tick loop via
/// [`SharedStore::command_signal`].
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryStore>>,
    commands: Arc<Notify>,
}

impl SharedStore {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            commands: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStore>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Writes an external command and wakes the tick loop.
    pub fn inject(&self, key: &str, value: impl Into<PointValue>) -> Result<(), StoreError> {
        self.lock()?.inject(key, value)?;
        self.commands.notify_one();
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<PointValue>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, PointValue>, StoreError> {
        Ok(self.lock()?.snapshot())
    }

    /// Signal raised whenever a command is injected.
    pub fn command_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.commands)
    }
}

impl StateStore for SharedStore {
    fn read(&self, key: &str) -> Result<Option<PointValue>, StoreError> {
        self.lock()?.read(key)
    }

    fn write(&mut self, key: &str, value: PointValue, ack: bool) -> Result<(), StoreError> {
        self.lock()?.write(key, value, ack)
    }

    fn subscribe(&mut self, patterns: &[&str]) -> Result<(), StoreError> {
        self.lock()?.subscribe(patterns)
    }

    fn poll_notifications(&mut self) -> Vec<Notification> {
        self.lock().map(|mut s| s.poll_notifications()).unwrap_or_default()
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.lock()?.flush()
    }
}
