use std::env;
use std::path::PathBuf;

use log::info;

use crate::adapter::{FileAdapter, LocalStorage, NullAdapter};
use crate::engine::{Store, DEFAULT_DATABASES};
use crate::{Error, Result};

/// Environment variable naming a snapshot file; selects [`Backend::File`].
pub const ENV_FILE: &str = "BANKERSBOX_FILE";
/// Environment variable holding the initial database index.
pub const ENV_DB: &str = "BANKERSBOX_DB";
/// Environment variable holding the number of databases.
pub const ENV_DATABASES: &str = "BANKERSBOX_DATABASES";
/// Environment variable holding a local storage quota in bytes; selects [`Backend::LocalStorage`].
pub const ENV_QUOTA: &str = "BANKERSBOX_QUOTA";

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Nothing is persisted.
    Memory,
    /// A fresh quota-limited [`LocalStorage`] area.
    LocalStorage { quota: usize },
    /// A JSON snapshot file.
    File(PathBuf),
}

/// Settings used by [`open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db: u32,
    pub databases: u32,
    pub backend: Backend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: 0,
            databases: DEFAULT_DATABASES,
            backend: Backend::Memory,
        }
    }
}

impl Config {
    /// Builds a config from the defaults overridden by `BANKERSBOX_*` variables.
    ///
    /// `BANKERSBOX_FILE` takes precedence over `BANKERSBOX_QUOTA` when both are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let mut config = Config::default();

        if let Some(db) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            config.db = parse_db_index(&db)?;
        }
        if let Some(databases) = lookup(ENV_DATABASES).filter(|v| !v.is_empty()) {
            config.databases = databases.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got {:?}", ENV_DATABASES, databases))
            })?;
        }
        if let Some(quota) = lookup(ENV_QUOTA).filter(|v| !v.is_empty()) {
            let quota = quota.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a byte count, got {:?}", ENV_QUOTA, quota))
            })?;
            config.backend = Backend::LocalStorage { quota };
        }
        if let Some(file) = lookup(ENV_FILE).filter(|v| !v.is_empty()) {
            config.backend = Backend::File(PathBuf::from(file));
        }

        Ok(config)
    }
}

/// Parses a database index, rejecting anything that is not a non-negative integer.
pub fn parse_db_index(text: &str) -> Result<u32> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("db index must be an integer, got {:?}", text)))
}

/// Builds the adapter described by `config` and opens a [`Store`] on it.
///
/// ```
/// use bankersbox::config::{self, Config};
///
/// let mut store = config::open(&Config::default()).unwrap();
/// store.set("greeting", "hello").unwrap();
/// ```
pub fn open(config: &Config) -> Result<Store> {
    let store = match &config.backend {
        Backend::Memory => Store::with_databases(NullAdapter, config.db, config.databases)?,
        Backend::LocalStorage { quota } => {
            let storage = LocalStorage::with_quota(*quota);
            Store::with_databases(storage.adapter(), config.db, config.databases)?
        }
        Backend::File(path) => {
            Store::with_databases(FileAdapter::open(path)?, config.db, config.databases)?
        }
    };
    info!("Opened {} on {:?} backend", store, config.backend);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_DB, "3"),
            (ENV_DATABASES, "8"),
            (ENV_FILE, "/tmp/bb.json"),
        ]))
        .unwrap();
        assert_eq!(config.db, 3);
        assert_eq!(config.databases, 8);
        assert_eq!(config.backend, Backend::File(PathBuf::from("/tmp/bb.json")));
    }

    #[test]
    fn test_quota_selects_local_storage() {
        let config = Config::from_lookup(lookup(&[(ENV_QUOTA, "1024")])).unwrap();
        assert_eq!(config.backend, Backend::LocalStorage { quota: 1024 });
    }

    #[test]
    fn test_non_integer_db_is_config_error() {
        assert!(matches!(
            Config::from_lookup(lookup(&[(ENV_DB, "one")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(parse_db_index("-1"), Err(Error::Config(_))));
        assert_eq!(parse_db_index(" 7 ").unwrap(), 7);
    }

    #[test]
    fn test_open_rejects_unknown_db() {
        let config = Config {
            db: 20,
            ..Config::default()
        };
        assert!(matches!(open(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_open_file_backend() {
        let dir = tempdir().unwrap();
        let config = Config {
            backend: Backend::File(dir.path().join("bb.json")),
            ..Config::default()
        };

        let mut store = open(&config).unwrap();
        store.set("k", "v").unwrap();
        drop(store);

        let mut reopened = open(&config).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }
}
