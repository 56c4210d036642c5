// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot persistence for idempotent resume.

pub mod engine_snapshot;
pub mod persistence_store;
pub mod snapshot_service;

pub use engine_snapshot::{EngineSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use persistence_store::{FilePersistenceStore, InMemoryPersistenceStore, PersistenceStore};
pub use snapshot_service::{PersistReport, SnapshotService, DEFAULT_RETAINED_REVISIONS};
