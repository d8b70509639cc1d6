use std::{
    fs::{self, File},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use super::LocalStore;
use crate::dao::storage::{StorageError, StorageResult};

const EXTENSION: &str = ".json";
const NAMESPACE_SEPARATOR: &str = "::";

/// One JSON file per key inside a data directory.
///
/// `match-state::{id}` is stored as `match-state.{id}.json`. Writes go to a sibling temp file
/// that is flushed to disk and renamed over the target, so a crash leaves either the old or the
/// new document, never a torn one.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create when missing) the data directory.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| {
            StorageError::unavailable(
                format!("failed to create data directory `{}`", root.display()),
                source,
            )
        })?;
        debug!(path = %root.display(), "opened local file store");
        Ok(Self { root })
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "key is empty",
            });
        }
        if key.contains(['.', '/', '\\']) {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "key contains a path or extension separator",
            });
        }
        let name = key.replace(NAMESPACE_SEPARATOR, ".");
        Ok(self.root.join(format!("{name}{EXTENSION}")))
    }
}

fn key_for(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(EXTENSION)?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem.replace('.', NAMESPACE_SEPARATOR))
}

impl LocalStore for FileStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::unavailable(
                format!("failed to read `{}`", path.display()),
                err,
            )),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let temp = path.with_extension("tmp");
        let unavailable = |action: &str, err: io::Error| {
            StorageError::unavailable(format!("failed to {action} `{}`", temp.display()), err)
        };

        let mut file = File::create(&temp).map_err(|err| unavailable("create", err))?;
        file.write_all(value)
            .map_err(|err| unavailable("write", err))?;
        file.sync_all().map_err(|err| unavailable("sync", err))?;
        drop(file);

        fs::rename(&temp, &path).map_err(|err| {
            StorageError::unavailable(
                format!("failed to move `{}` into place", path.display()),
                err,
            )
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::unavailable(
                format!("failed to remove `{}`", path.display()),
                err,
            )),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|err| {
            StorageError::unavailable(
                format!("failed to list `{}`", self.root.display()),
                err,
            )
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                StorageError::unavailable(
                    format!("failed to list `{}`", self.root.display()),
                    err,
                )
            })?;
            let Some(key) = entry.file_name().to_str().and_then(key_for) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
