//! BankersBox is an embedded key/value store with a small Redis-style command surface.
//!
//! Keys live in numbered logical databases and hold exactly one of three value
//! kinds: strings, lists or sets. Every command runs synchronously and writes
//! through to a pluggable persistence [`Adapter`].
//!
//! ## Core Components
//! - [`adapter`]: The persistence backends (null, quota-limited local storage, file snapshot).
//! - [`engine`]: The command engine, key namespacing and the read-through cache.
//! - [`shell`]: A line-oriented command router used by the `bankersbox` binary.
//! - [`config`]: Environment-driven configuration and store construction.
//!
//! ```
//! use bankersbox::{Store, adapter::NullAdapter};
//!
//! let mut store = Store::open(NullAdapter, 0).unwrap();
//! store.lpush("queue", "a").unwrap();
//! store.lpush("queue", "b").unwrap();
//! assert_eq!(store.lrange("queue", 0, -1).unwrap(), vec!["b", "a"]);
//! ```

pub mod adapter;
pub mod config;
pub mod engine;
pub mod shell;

pub use engine::{KeyType, Store};

use thiserror::Error;

/// Errors returned by the store and its adapters.
#[derive(Error, Debug)]
pub enum Error {
    /// The command requires a different value type than the key holds.
    #[error("wrong type: operation requires {expected}, key holds {found}")]
    TypeMismatch { expected: KeyType, found: KeyType },
    /// A list position fell outside the list.
    #[error("index out of range")]
    IndexOutOfRange,
    /// The command needs an existing key.
    #[error("no such key")]
    NoSuchKey,
    /// Invalid configuration, such as an unknown database index.
    #[error("configuration error: {0}")]
    Config(String),
    /// The stored string cannot be parsed as a 64-bit integer.
    #[error("value is not an integer")]
    NotAnInteger,
    /// An increment or decrement would overflow.
    #[error("increment or decrement would overflow")]
    Overflow,
    /// The adapter refused a write because its backing storage is full.
    #[error("capacity exceeded writing {key}: needs {needed} bytes, {available} available")]
    CapacityExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    /// A persisted envelope or key index could not be decoded.
    #[error("corrupt entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    /// An I/O error occurred while reading or writing a snapshot.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization of a snapshot.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for BankersBox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single mutation handed to an [`Adapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store `value` under `key`, replacing any previous value.
    Put { key: String, value: String },
    /// Remove `key`. Removing an absent key is not an error.
    Remove { key: String },
}

impl WriteOp {
    /// The physical key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Remove { key } => key,
        }
    }
}

/// Raw string storage underneath the store.
///
/// Adapters know nothing about value types or databases; they map physical keys
/// to serialized envelopes.
pub trait Adapter: Send {
    /// Returns the stored string for `key`, or `None` if absent.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the backend is full.
    fn write(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key` if present.
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Drops everything the adapter holds.
    fn clear(&mut self) -> Result<()>;

    /// Applies several operations as one unit.
    ///
    /// The default runs them in order. Backends that can do better (a single
    /// snapshot rewrite, an up-front quota check) override it so that either
    /// every operation lands or none does.
    fn apply(&mut self, batch: &[WriteOp]) -> Result<()> {
        for op in batch {
            match op {
                WriteOp::Put { key, value } => self.write(key, value)?,
                WriteOp::Remove { key } => self.remove(key)?,
            }
        }
        Ok(())
    }
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn apply(&mut self, batch: &[WriteOp]) -> Result<()> {
        (**self).apply(batch)
    }
}
