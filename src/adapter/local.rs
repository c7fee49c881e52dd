use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::error;

use crate::{Adapter, Error, Result, WriteOp};

/// Default capacity of a [`LocalStorage`] area, matching common browser limits.
pub const DEFAULT_QUOTA: usize = 5 * 1024 * 1024;

#[derive(Debug)]
struct Area {
    items: HashMap<String, String>,
    used: usize,
    quota: usize,
}

fn cost(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// A synchronous, quota-limited key/value area shared by every adapter opened on it.
///
/// The area outlives the stores built on top of it, so a fresh store opened on
/// the same `LocalStorage` sees everything earlier stores wrote. Usage is
/// counted as the byte length of each key plus its value.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    area: Arc<RwLock<Area>>,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage {
    /// Creates an empty area with [`DEFAULT_QUOTA`].
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA)
    }

    /// Creates an empty area holding at most `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            area: Arc::new(RwLock::new(Area {
                items: HashMap::new(),
                used: 0,
                quota,
            })),
        }
    }

    /// Returns an adapter writing into this area.
    pub fn adapter(&self) -> LocalStorageAdapter {
        LocalStorageAdapter {
            storage: self.clone(),
        }
    }

    pub fn quota(&self) -> usize {
        self.read_area().quota
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.read_area().used
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.read_area().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_area(&self) -> RwLockReadGuard<'_, Area> {
        self.area.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_area(&self) -> RwLockWriteGuard<'_, Area> {
        self.area.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Adapter`] over a [`LocalStorage`] area.
#[derive(Debug, Clone)]
pub struct LocalStorageAdapter {
    storage: LocalStorage,
}

impl LocalStorageAdapter {
    pub fn new(storage: &LocalStorage) -> Self {
        storage.adapter()
    }
}

impl Adapter for LocalStorageAdapter {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.storage.read_area().items.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(&[WriteOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        }])
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut area = self.storage.write_area();
        if let Some(old) = area.items.remove(key) {
            area.used -= cost(key, &old);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut area = self.storage.write_area();
        area.items.clear();
        area.used = 0;
        Ok(())
    }

    /// Checks the whole batch against the quota before touching the area.
    fn apply(&mut self, batch: &[WriteOp]) -> Result<()> {
        let mut area = self.storage.write_area();

        // Last operation per key wins; only the final state counts toward the quota.
        let mut last: HashMap<&str, Option<&str>> = HashMap::new();
        for op in batch {
            match op {
                WriteOp::Put { key, value } => last.insert(key.as_str(), Some(value.as_str())),
                WriteOp::Remove { key } => last.insert(key.as_str(), None),
            };
        }

        let mut projected = area.used;
        for (key, value) in &last {
            if let Some(old) = area.items.get(*key) {
                projected -= cost(key, old);
            }
            if let Some(value) = value {
                projected += cost(key, value);
            }
        }

        if projected > area.quota {
            let key = batch
                .iter()
                .find(|op| matches!(op, WriteOp::Put { .. }))
                .map(|op| op.key().to_string())
                .unwrap_or_default();
            let needed = projected.saturating_sub(area.used);
            let available = area.quota.saturating_sub(area.used);
            error!(
                "Local storage quota exceeded writing {}: needs {} bytes, {} available",
                key, needed, available
            );
            return Err(Error::CapacityExceeded {
                key,
                needed,
                available,
            });
        }

        for op in batch {
            match op {
                WriteOp::Put { key, value } => {
                    area.items.insert(key.clone(), value.clone());
                }
                WriteOp::Remove { key } => {
                    area.items.remove(key);
                }
            }
        }
        area.used = projected;
        Ok(())
    }
}
