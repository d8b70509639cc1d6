//! Durable key-value storage living on the courtside device.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Serialize, de::DeserializeOwned};

use crate::dao::storage::{StorageError, StorageResult};

/// Synchronous key-value store holding JSON documents under namespaced keys such as
/// `match-state::{id}`.
///
/// Writes must be durable once they return: callers treat a successful `write` as surviving a
/// process restart.
pub trait LocalStore: Send + Sync {
    /// Read the raw bytes stored under `key`.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    /// Replace the value stored under `key`.
    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    /// Delete `key`, succeeding when it is already absent.
    fn remove(&self, key: &str) -> StorageResult<()>;
    /// List every stored key starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Decode the JSON document stored under `key`.
pub fn read_json<T>(store: &dyn LocalStore, key: &str) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(bytes) = store.read(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Corrupted {
            key: key.to_string(),
            source,
        })
}

/// Encode `value` as JSON and store it under `key`.
pub fn write_json<T>(store: &dyn LocalStore, key: &str, value: &T) -> StorageResult<()>
where
    T: ?Sized + Serialize,
{
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.write(key, &bytes)
}
