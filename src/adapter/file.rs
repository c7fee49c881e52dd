use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::{Adapter, Result, WriteOp};

/// Keeps every entry in memory and mirrors the whole map into one JSON file.
///
/// The snapshot is loaded once on construction; a missing file is an empty
/// store. Every write rewrites the entire file using an atomic
/// "write-then-rename" so a crash mid-write leaves the previous snapshot intact.
/// Write cost grows with the total snapshot size, which suits small datasets.
#[derive(Debug)]
pub struct FileAdapter {
    path: PathBuf,
    items: BTreeMap<String, String>,
}

impl FileAdapter {
    /// Opens the snapshot at `path`, loading it if it exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match fs::read(&path) {
            Ok(content) if content.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(content) => serde_json::from_slice(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} entries from snapshot {:?}", items.len(), path);
        Ok(Self { path, items })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the full map to disk.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&self.items)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &self.path)?;

        debug!("Rewrote snapshot {:?} ({} entries)", self.path, self.items.len());
        Ok(())
    }
}

impl Adapter for FileAdapter {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.items.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Empties the store and deletes the backing file.
    fn clear(&mut self) -> Result<()> {
        self.items.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies the batch in memory and rewrites the snapshot once.
    ///
    /// If the rewrite fails the in-memory map is rolled back.
    fn apply(&mut self, batch: &[WriteOp]) -> Result<()> {
        let previous: Vec<(String, Option<String>)> = batch
            .iter()
            .map(|op| (op.key().to_string(), self.items.get(op.key()).cloned()))
            .collect();

        for op in batch {
            match op {
                WriteOp::Put { key, value } => {
                    self.items.insert(key.clone(), value.clone());
                }
                WriteOp::Remove { key } => {
                    self.items.remove(key);
                }
            }
        }

        if let Err(e) = self.persist() {
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(value) => self.items.insert(key, value),
                    None => self.items.remove(&key),
                };
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter::open(dir.path().join("store.json")).unwrap();
        assert_eq!(adapter.read("anything").unwrap(), None);
        assert!(!dir.path().join("store.json").exists());
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut adapter = FileAdapter::open(&path).unwrap();
        adapter.write("bb:0:k1", "{\"v\":\"v1\",\"m\":{\"t\":\"string\"}}").unwrap();

        let reloaded = FileAdapter::open(&path).unwrap();
        assert_eq!(
            reloaded.read("bb:0:k1").unwrap().as_deref(),
            Some("{\"v\":\"v1\",\"m\":{\"t\":\"string\"}}")
        );
    }

    #[test]
    fn test_atomic_rename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut adapter = FileAdapter::open(&path).unwrap();
        adapter.write("k", "v").unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[test]
    fn test_batch_rewrites_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut adapter = FileAdapter::open(&path).unwrap();
        adapter.write("gone", "x").unwrap();
        adapter
            .apply(&[
                WriteOp::Put { key: "a".into(), value: "1".into() },
                WriteOp::Remove { key: "gone".into() },
            ])
            .unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_clear_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut adapter = FileAdapter::open(&path).unwrap();
        adapter.write("k", "v").unwrap();
        adapter.clear().unwrap();

        assert!(!path.exists());
        assert_eq!(adapter.read("k").unwrap(), None);
        // Clearing twice is harmless.
        adapter.clear().unwrap();
    }

    #[test]
    fn test_corrupt_snapshot_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileAdapter::open(&path),
            Err(crate::Error::Serialization(_))
        ));
    }
}
