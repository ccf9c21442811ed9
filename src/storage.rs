//! String-keyed session storage, the localStorage analogue of the original
//! front-end. The session layer is the only writer; everything else reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

/// Key/value storage for session fields.
///
/// Reads are total: a backend failure or malformed content is reported as
/// "absent", never as an error. Writes go through `put_all` so a login's
/// five fields land as one atomic unit or not at all.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Write every entry or none. An `Err` must leave prior content intact.
    fn put_all(&self, entries: &[(&str, String)]) -> anyhow::Result<()>;

    /// Remove the given keys. Idempotent; missing keys are ignored.
    fn remove_all(&self, keys: &[&str]);
}

/// Process-lifetime storage, the default for hosts that scope a session to
/// one run (the browser-tab analogue).
#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    fn put_all(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let mut map = self.map.write();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) {
        let mut map = self.map.write();
        for key in keys {
            map.remove(*key);
        }
    }
}

/// Storage persisted as one JSON object file, surviving restarts.
///
/// Writes go to a temp file first and are renamed into place, so a crash or
/// full disk cannot leave a partial key set behind.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("session file {} is malformed ({}), starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, cache: RwLock::new(cache) }
    }

    fn persist(&self, map: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().get(key).cloned()
    }

    fn put_all(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let mut cache = self.cache.write();
        let mut next = cache.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), value.clone());
        }
        // Persist before committing to the cache: a failed write keeps both
        // the file and the in-memory view on the previous state.
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) {
        let mut cache = self.cache.write();
        let mut next = cache.clone();
        for key in keys {
            next.remove(*key);
        }
        if let Err(e) = self.persist(&next) {
            warn!("failed to persist session removal to {}: {}", self.path.display(), e);
        }
        *cache = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_roundtrip() {
        let storage = MemoryStorage::new();
        storage
            .put_all(&[("token", "abc".into()), ("userId", "7".into())])
            .unwrap();
        assert_eq!(storage.get("token").as_deref(), Some("abc"));
        assert_eq!(storage.get("userId").as_deref(), Some("7"));
        assert_eq!(storage.get("userName"), None);

        storage.remove_all(&["token", "userId", "never-set"]);
        assert_eq!(storage.get("token"), None);
        assert_eq!(storage.get("userId"), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path);
        storage
            .put_all(&[("token", "abc".into()), ("userName", "Ana Pérez".into())])
            .unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));
        assert_eq!(reopened.get("userName").as_deref(), Some("Ana Pérez"));

        reopened.remove_all(&["token", "userName"]);
        drop(reopened);

        let again = FileStorage::open(&path);
        assert_eq!(again.get("token"), None);
        assert_eq!(again.get("userName"), None);
    }

    #[test]
    fn failed_persist_leaves_prior_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path);
        storage
            .put_all(&[("token", "abc".into()), ("userId", "7".into())])
            .unwrap();

        // A directory now occupies the staging path, so the next persist
        // fails before anything reaches the real file.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        let err = storage.put_all(&[("token", "new".into())]);
        assert!(err.is_err());

        // The in-memory view still serves the last atomic write ...
        assert_eq!(storage.get("token").as_deref(), Some("abc"));
        assert_eq!(storage.get("userId").as_deref(), Some("7"));

        // ... and so does the file on disk.
        let reread = FileStorage::open(&path);
        assert_eq!(reread.get("token").as_deref(), Some("abc"));
        assert_eq!(reread.get("userId").as_deref(), Some("7"));
    }

    #[test]
    fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path);
        assert_eq!(storage.get("token"), None);
    }
}
