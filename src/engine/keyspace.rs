use std::collections::BTreeSet;

use log::{debug, warn};

use crate::engine::cache::Cache;
use crate::engine::value::{Entry, Value};
use crate::{Adapter, Error, Result, WriteOp};

/// Leading segment of every physical key.
pub const KEY_PREFIX: &str = "bb";

/// Suffix of the per-database key index.
const INDEX_SUFFIX: &str = "k:___keys___";

/// Physical key prefix of values in database `db`.
pub fn value_prefix(db: u32) -> String {
    format!("{}:{}:", KEY_PREFIX, db)
}

/// Physical key of the key index of database `db`.
pub fn index_key(db: u32) -> String {
    format!("{}:{}{}", KEY_PREFIX, db, INDEX_SUFFIX)
}

/// Maps logical keys of the active database onto physical adapter keys and
/// keeps that database's key index in step with the values.
///
/// A value write and the key index update it implies go to the adapter as a
/// single batch, and in-memory state changes only after the adapter accepts it.
pub struct Keyspace {
    adapter: Box<dyn Adapter>,
    cache: Cache,
    db: u32,
    prefix: String,
    index_key: String,
    index: BTreeSet<String>,
}

impl Keyspace {
    /// Opens database `db` on `adapter`, loading its key index.
    pub fn open(adapter: Box<dyn Adapter>, db: u32) -> Result<Self> {
        let index_key = index_key(db);
        let mut cache = Cache::new();
        let index = load_index(adapter.as_ref(), &mut cache, &index_key)?;
        debug!("Opened database {} with {} keys", db, index.len());
        Ok(Self {
            adapter,
            cache,
            db,
            prefix: value_prefix(db),
            index_key,
            index,
        })
    }

    pub fn db(&self) -> u32 {
        self.db
    }

    /// Switches to database `db`. On failure the active database is unchanged.
    pub fn select(&mut self, db: u32) -> Result<()> {
        let index_key = index_key(db);
        let index = load_index(self.adapter.as_ref(), &mut self.cache, &index_key)?;
        debug!("Selected database {} ({} keys)", db, index.len());
        self.db = db;
        self.prefix = value_prefix(db);
        self.index_key = index_key;
        self.index = index;
        Ok(())
    }

    pub fn physical_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Reads the entry for `key`, going to the adapter on a cache miss.
    pub fn get(&mut self, key: &str) -> Result<Option<&Entry>> {
        let pkey = self.physical_key(key);
        if self.cache.get(&pkey).is_none() {
            let raw = match self.adapter.read(&pkey)? {
                Some(raw) => raw,
                None => return Ok(None),
            };
            let entry = Entry::decode(&pkey, &raw).map_err(|e| {
                warn!("Refusing to load {}: {}", pkey, e);
                e
            })?;
            self.cache.insert(pkey.clone(), entry);
        }
        Ok(self.cache.get(&pkey))
    }

    /// Writes `entry` under `key`, registering the key in the index if new.
    ///
    /// An empty list or set is never stored: writing one deletes the key.
    pub fn put(&mut self, key: &str, entry: Entry) -> Result<()> {
        if entry.value.is_empty_collection() {
            self.remove(key)?;
            return Ok(());
        }

        let pkey = self.physical_key(key);
        let mut batch = vec![WriteOp::Put {
            key: pkey.clone(),
            value: entry.encode()?,
        }];

        if self.index.contains(key) {
            self.adapter.apply(&batch)?;
        } else {
            let mut index = self.index.clone();
            index.insert(key.to_string());
            batch.push(self.index_write(&index)?);
            self.adapter.apply(&batch)?;
            self.set_index(index);
        }

        self.cache.insert(pkey, entry);
        Ok(())
    }

    /// Deletes `key`. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let pkey = self.physical_key(key);
        let stored = self.cache.get(&pkey).is_some() || self.adapter.read(&pkey)?.is_some();
        let indexed = self.index.contains(key);
        if !stored && !indexed {
            return Ok(false);
        }

        let mut batch = vec![WriteOp::Remove { key: pkey.clone() }];
        if indexed {
            let mut index = self.index.clone();
            index.remove(key);
            batch.push(self.index_write(&index)?);
            self.adapter.apply(&batch)?;
            self.set_index(index);
        } else {
            self.adapter.apply(&batch)?;
        }

        self.cache.remove(&pkey);
        Ok(stored)
    }

    /// Every live key in the active database.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.index.iter()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Deletes every indexed key of the active database and the index itself.
    pub fn flush(&mut self) -> Result<()> {
        let mut batch: Vec<WriteOp> = self
            .index
            .iter()
            .map(|key| WriteOp::Remove {
                key: self.physical_key(key),
            })
            .collect();
        batch.push(WriteOp::Remove {
            key: self.index_key.clone(),
        });
        self.adapter.apply(&batch)?;

        debug!("Flushed database {} ({} keys)", self.db, self.index.len());
        self.cache.evict_prefix(&self.prefix);
        self.set_index(BTreeSet::new());
        Ok(())
    }

    /// Releases the adapter.
    pub fn into_adapter(self) -> Box<dyn Adapter> {
        self.adapter
    }

    /// Replaces the index and its cached entry. With a non-persisting adapter
    /// the cached entry is the only copy that survives a `select`.
    fn set_index(&mut self, index: BTreeSet<String>) {
        if index.is_empty() {
            self.cache.remove(&self.index_key);
        } else {
            let entry = Entry::new(Value::Set(index.clone()));
            self.cache.insert(self.index_key.clone(), entry);
        }
        self.index = index;
    }

    fn index_write(&self, index: &BTreeSet<String>) -> Result<WriteOp> {
        if index.is_empty() {
            return Ok(WriteOp::Remove {
                key: self.index_key.clone(),
            });
        }
        Ok(WriteOp::Put {
            key: self.index_key.clone(),
            value: Entry::new(Value::Set(index.clone())).encode()?,
        })
    }
}

/// Reads the key index through the cache, then the adapter.
fn load_index(
    adapter: &dyn Adapter,
    cache: &mut Cache,
    index_key: &str,
) -> Result<BTreeSet<String>> {
    if let Some(Entry {
        value: Value::Set(keys),
        ..
    }) = cache.get(index_key)
    {
        return Ok(keys.clone());
    }

    let raw = match adapter.read(index_key)? {
        Some(raw) => raw,
        None => return Ok(BTreeSet::new()),
    };
    let entry = Entry::decode(index_key, &raw)?;
    let keys = match &entry.value {
        Value::Set(keys) => keys.clone(),
        other => {
            warn!("Key index {} holds a {}", index_key, other.key_type());
            return Err(Error::Corrupt {
                key: index_key.to_string(),
                reason: format!("key index holds a {}", other.key_type()),
            });
        }
    };
    cache.insert(index_key.to_string(), entry);
    Ok(keys)
}
