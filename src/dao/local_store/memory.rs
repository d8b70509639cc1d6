use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::LocalStore;
use crate::dao::storage::StorageResult;

/// Process-local store used by tests and ephemeral runs. Clones share the same map, so a
/// "restarted" component can be rebuilt on top of the data its predecessor left behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_filtered_by_prefix() {
        let store = MemoryStore::new();
        store.write("match-state::b", b"{}").unwrap();
        store.write("match-state::a", b"{}").unwrap();
        store.write("match-config::a", b"{}").unwrap();
        assert_eq!(
            store.keys("match-state::").unwrap(),
            vec!["match-state::a".to_string(), "match-state::b".to_string()]
        );
    }

    #[test]
    fn clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.write("offline-queue", b"[]").unwrap();
        assert_eq!(other.read("offline-queue").unwrap(), Some(b"[]".to_vec()));
        other.remove("offline-queue").unwrap();
        assert!(store.read("offline-queue").unwrap().is_none());
    }
}
