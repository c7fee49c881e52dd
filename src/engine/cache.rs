use std::collections::HashMap;

use crate::engine::value::Entry;

/// Decoded entries keyed by physical key, so repeated reads skip parsing.
///
/// Entries are replaced whenever their key is written and dropped when it is
/// removed. Physical keys carry the database prefix, so entries from other
/// databases can stay resident across a `select`.
#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<String, Entry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: Entry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops every cached entry whose physical key starts with `prefix`.
    pub fn evict_prefix(&mut self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Value;

    #[test]
    fn test_evict_prefix_keeps_other_databases() {
        let mut cache = Cache::new();
        cache.insert("bb:0:a".into(), Entry::new(Value::String("1".into())));
        cache.insert("bb:1:a".into(), Entry::new(Value::String("2".into())));

        cache.evict_prefix("bb:0:");
        assert!(cache.get("bb:0:a").is_none());
        assert!(cache.get("bb:1:a").is_some());
        assert_eq!(cache.len(), 1);
    }
}
