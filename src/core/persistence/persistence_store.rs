// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{EngineError, EngineResult};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for persistence stores that save full engine snapshots.
///
/// Revisions of one engine must sort lexicographically in creation order.
pub trait PersistenceStore: Send + Sync {
    fn save(&self, engine_id: &str, revision: &str, snapshot: &[u8]) -> EngineResult<()>;
    fn load(&self, engine_id: &str, revision: &str) -> EngineResult<Option<Vec<u8>>>;
    fn get_last_revision(&self, engine_id: &str) -> EngineResult<Option<String>>;
    /// All revisions of `engine_id`, oldest first
    fn list_revisions(&self, engine_id: &str) -> EngineResult<Vec<String>>;
    fn clear_all_revisions(&self, engine_id: &str) -> EngineResult<()>;
    fn delete_revision(&self, engine_id: &str, revision: &str) -> EngineResult<()>;
}

fn poisoned(what: &str) -> EngineError {
    EngineError::persistence(format!("{} lock is poisoned", what))
}

/// Very small in-memory implementation useful for tests.
#[derive(Debug, Default)]
pub struct InMemoryPersistenceStore {
    inner: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryPersistenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for InMemoryPersistenceStore {
    fn save(&self, engine_id: &str, revision: &str, snapshot: &[u8]) -> EngineResult<()> {
        let mut m = self.inner.lock().map_err(|_| poisoned("snapshot map"))?;
        m.entry(engine_id.to_string())
            .or_default()
            .insert(revision.to_string(), snapshot.to_vec());
        log::debug!(
            "[InMemoryPersistenceStore] saved {}/{} ({} bytes)",
            engine_id,
            revision,
            snapshot.len()
        );
        Ok(())
    }

    fn load(&self, engine_id: &str, revision: &str) -> EngineResult<Option<Vec<u8>>> {
        let m = self.inner.lock().map_err(|_| poisoned("snapshot map"))?;
        Ok(m.get(engine_id).and_then(|revs| revs.get(revision).cloned()))
    }

    fn get_last_revision(&self, engine_id: &str) -> EngineResult<Option<String>> {
        let m = self.inner.lock().map_err(|_| poisoned("snapshot map"))?;
        Ok(m
            .get(engine_id)
            .and_then(|revs| revs.keys().next_back().cloned()))
    }

    fn list_revisions(&self, engine_id: &str) -> EngineResult<Vec<String>> {
        let m = self.inner.lock().map_err(|_| poisoned("snapshot map"))?;
        Ok(m
            .get(engine_id)
            .map(|revs| revs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn clear_all_revisions(&self, engine_id: &str) -> EngineResult<()> {
        self.inner
            .lock()
            .map_err(|_| poisoned("snapshot map"))?
            .remove(engine_id);
        Ok(())
    }

    fn delete_revision(&self, engine_id: &str, revision: &str) -> EngineResult<()> {
        let mut m = self.inner.lock().map_err(|_| poisoned("snapshot map"))?;
        if let Some(revs) = m.get_mut(engine_id) {
            revs.remove(revision);
        }
        Ok(())
    }
}

/// File-based persistence store keeping one file per revision:
/// `<base>/<engine_id>/<revision>`.
///
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a half-written revision behind.
#[derive(Debug)]
pub struct FilePersistenceStore {
    base: PathBuf,
}

const TMP_SUFFIX: &str = ".tmp";

impl FilePersistenceStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> EngineResult<Self> {
        let base = path.into();
        fs::create_dir_all(&base).map_err(|e| {
            EngineError::persistence(format!("cannot create '{}': {}", base.display(), e))
        })?;
        Ok(Self { base })
    }

    fn engine_dir(&self, engine_id: &str) -> PathBuf {
        self.base.join(engine_id)
    }

    fn file_path(&self, engine_id: &str, revision: &str) -> PathBuf {
        self.engine_dir(engine_id).join(revision)
    }
}

impl PersistenceStore for FilePersistenceStore {
    fn save(&self, engine_id: &str, revision: &str, snapshot: &[u8]) -> EngineResult<()> {
        let dir = self.engine_dir(engine_id);
        fs::create_dir_all(&dir)?;
        let path = self.file_path(engine_id, revision);
        let tmp = dir.join(format!("{}{}", revision, TMP_SUFFIX));
        fs::write(&tmp, snapshot)?;
        fs::rename(&tmp, &path)?;
        log::debug!(
            "[FilePersistenceStore] saved {} ({} bytes)",
            path.display(),
            snapshot.len()
        );
        Ok(())
    }

    fn load(&self, engine_id: &str, revision: &str) -> EngineResult<Option<Vec<u8>>> {
        match fs::read(self.file_path(engine_id, revision)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_last_revision(&self, engine_id: &str) -> EngineResult<Option<String>> {
        Ok(self.list_revisions(engine_id)?.pop())
    }

    fn list_revisions(&self, engine_id: &str) -> EngineResult<Vec<String>> {
        let entries = match fs::read_dir(self.engine_dir(engine_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.ends_with(TMP_SUFFIX) {
                revisions.push(name);
            }
        }
        revisions.sort();
        Ok(revisions)
    }

    fn clear_all_revisions(&self, engine_id: &str) -> EngineResult<()> {
        match fs::remove_dir_all(self.engine_dir(engine_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_revision(&self, engine_id: &str, revision: &str) -> EngineResult<()> {
        match fs::remove_file(self.file_path(engine_id, revision)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn PersistenceStore) {
        assert_eq!(store.get_last_revision("rides").unwrap(), None);
        assert_eq!(store.load("rides", "missing").unwrap(), None);

        store.save("rides", "0001", b"first").unwrap();
        store.save("rides", "0002", b"second").unwrap();
        store.save("other", "0009", b"unrelated").unwrap();

        assert_eq!(store.get_last_revision("rides").unwrap().as_deref(), Some("0002"));
        assert_eq!(store.list_revisions("rides").unwrap(), vec!["0001", "0002"]);
        assert!(store.list_revisions("nobody").unwrap().is_empty());
        assert_eq!(store.load("rides", "0001").unwrap().as_deref(), Some(&b"first"[..]));

        store.delete_revision("rides", "0002").unwrap();
        assert_eq!(store.get_last_revision("rides").unwrap().as_deref(), Some("0001"));

        store.clear_all_revisions("rides").unwrap();
        assert_eq!(store.get_last_revision("rides").unwrap(), None);
        assert_eq!(store.get_last_revision("other").unwrap().as_deref(), Some("0009"));
    }

    #[test]
    fn test_in_memory_store() {
        exercise(&InMemoryPersistenceStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FilePersistenceStore::new(dir.path()).unwrap());
    }

    #[test]
    fn test_file_store_ignores_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path()).unwrap();
        store.save("rides", "0001", b"done").unwrap();
        fs::write(dir.path().join("rides").join("0002.tmp"), b"partial").unwrap();
        assert_eq!(store.get_last_revision("rides").unwrap().as_deref(), Some("0001"));
        assert_eq!(store.list_revisions("rides").unwrap(), vec!["0001"]);
    }
}
