// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::Utc;
use std::sync::Arc;

use super::engine_snapshot::EngineSnapshot;
use super::persistence_store::PersistenceStore;
use crate::core::error::{EngineError, EngineResult};

/// Report of a persistence operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Revision ID that was created
    pub revision: String,
    pub bytes: usize,
    pub cells: usize,
    /// Older revisions deleted by retention
    pub pruned: usize,
}

/// Revisions kept per engine unless configured otherwise
pub const DEFAULT_RETAINED_REVISIONS: usize = 3;

/// Persists and restores engine snapshots by revision.
///
/// Revisions are `<epoch millis>-<cycle>`, zero padded so that they sort in
/// creation order. After each save only the newest `retain` revisions are
/// kept.
pub struct SnapshotService {
    persistence_store: Arc<dyn PersistenceStore>,
    engine_id: String,
    retain: usize,
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService")
            .field("engine_id", &self.engine_id)
            .field("retain", &self.retain)
            .finish()
    }
}

impl SnapshotService {
    pub fn new(engine_id: impl Into<String>, persistence_store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            persistence_store,
            engine_id: engine_id.into(),
            retain: DEFAULT_RETAINED_REVISIONS,
        }
    }

    /// Keep the newest `revisions` snapshots (at least one)
    pub fn with_retention(mut self, revisions: usize) -> Self {
        self.retain = revisions.max(1);
        self
    }

    pub fn retention(&self) -> usize {
        self.retain
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn persist(&self, snapshot: &EngineSnapshot) -> EngineResult<PersistReport> {
        let data = snapshot.to_bytes()?;
        let revision = format!(
            "{:015}-{:010}",
            Utc::now().timestamp_millis().max(0),
            snapshot.cycle
        );
        self.persistence_store
            .save(&self.engine_id, &revision, &data)?;
        // a failed prune leaves extra revisions behind, the save still stands
        let pruned = self.prune().unwrap_or_else(|e| {
            log::warn!(
                "[SnapshotService] pruning old revisions of '{}' failed: {}",
                self.engine_id,
                e
            );
            0
        });
        log::info!(
            "[SnapshotService] persisted revision {} for '{}' ({} cells, watermark {}, {} pruned)",
            revision,
            self.engine_id,
            snapshot.cells.len(),
            snapshot.watermark,
            pruned
        );
        Ok(PersistReport {
            revision,
            bytes: data.len(),
            cells: snapshot.cells.len(),
            pruned,
        })
    }

    /// Delete all but the newest `retain` revisions
    fn prune(&self) -> EngineResult<usize> {
        let revisions = self.persistence_store.list_revisions(&self.engine_id)?;
        let excess = revisions.len().saturating_sub(self.retain);
        for revision in &revisions[..excess] {
            self.persistence_store
                .delete_revision(&self.engine_id, revision)?;
        }
        Ok(excess)
    }

    /// Drop every persisted revision, so the next start begins empty
    pub fn clear(&self) -> EngineResult<()> {
        self.persistence_store.clear_all_revisions(&self.engine_id)?;
        log::info!("[SnapshotService] cleared all revisions of '{}'", self.engine_id);
        Ok(())
    }

    /// Load and verify the given revision
    pub fn restore_revision(&self, revision: &str) -> EngineResult<EngineSnapshot> {
        let data = self
            .persistence_store
            .load(&self.engine_id, revision)?
            .ok_or_else(|| {
                EngineError::persistence(format!(
                    "revision '{}' not found for '{}'",
                    revision, self.engine_id
                ))
            })?;
        let snapshot = EngineSnapshot::from_bytes(&data)?;
        log::info!(
            "[SnapshotService] restored revision {} for '{}' ({} cells)",
            revision,
            self.engine_id,
            snapshot.cells.len()
        );
        Ok(snapshot)
    }

    /// Load the newest revision, if any was persisted
    pub fn restore_last(&self) -> EngineResult<Option<EngineSnapshot>> {
        match self.persistence_store.get_last_revision(&self.engine_id)? {
            Some(revision) => self.restore_revision(&revision).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::engine_snapshot::SNAPSHOT_FORMAT_VERSION;
    use crate::core::persistence::persistence_store::InMemoryPersistenceStore;

    fn empty_snapshot(cycle: u64) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_FORMAT_VERSION,
            engine_name: "rides".to_string(),
            window_length_ms: 60_000,
            window_slide_ms: 60_000,
            aggregates: vec!["count:rides".to_string()],
            watermark: 0,
            max_event_time: None,
            last_offset: None,
            cycle,
            cells: Vec::new(),
        }
    }

    #[test]
    fn test_persist_then_restore_last() {
        let store = Arc::new(InMemoryPersistenceStore::new());
        let service = SnapshotService::new("rides", store);
        assert_eq!(service.restore_last().unwrap(), None);

        service.persist(&empty_snapshot(1)).unwrap();
        let report = service.persist(&empty_snapshot(2)).unwrap();
        assert!(report.revision.ends_with("0000000002"));

        let restored = service.restore_last().unwrap().unwrap();
        assert_eq!(restored.cycle, 2);
    }

    #[test]
    fn test_corrupted_revision_is_rejected() {
        let store = Arc::new(InMemoryPersistenceStore::new());
        store.save("rides", "000000000000001-0000000001", b"junk").unwrap();
        let service = SnapshotService::new("rides", store);
        assert!(matches!(
            service.restore_last(),
            Err(EngineError::StateCorruption { .. })
        ));
        assert!(matches!(
            service.restore_revision("nope"),
            Err(EngineError::Persistence { .. })
        ));
    }

    #[test]
    fn test_only_newest_revisions_are_retained() {
        let store = Arc::new(InMemoryPersistenceStore::new());
        let service = SnapshotService::new("rides", store.clone()).with_retention(2);

        let mut last = None;
        for cycle in 1..=50 {
            last = Some(service.persist(&empty_snapshot(cycle)).unwrap());
        }
        assert_eq!(last.unwrap().pruned, 1);

        let revisions = store.list_revisions("rides").unwrap();
        assert_eq!(revisions.len(), 2);
        assert!(revisions[0].ends_with("0000000049"));
        assert!(revisions[1].ends_with("0000000050"));
        assert_eq!(service.restore_last().unwrap().unwrap().cycle, 50);

        service.clear().unwrap();
        assert_eq!(service.restore_last().unwrap(), None);
    }

    #[test]
    fn test_default_retention() {
        let store = Arc::new(InMemoryPersistenceStore::new());
        let service = SnapshotService::new("rides", store.clone());
        for cycle in 1..=10 {
            service.persist(&empty_snapshot(cycle)).unwrap();
        }
        assert_eq!(
            store.list_revisions("rides").unwrap().len(),
            DEFAULT_RETAINED_REVISIONS
        );
        assert_eq!(SnapshotService::new("rides", store).with_retention(0).retention(), 1);
    }
}
