// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Aggregation State Store
//!
//! Per-(window, key) accumulators, sharded by window.
//!
//! Each window's cells live behind one `DashMap` entry. An `apply` holds the
//! entry's write guard for the whole fold, so two updates to the same cell
//! never interleave and a `snapshot` of that window never observes a half
//! applied record. Operations on different windows only contend when their
//! entries share a shard.

use super::cell::{AggregateCell, AggregateValues};
use crate::core::event::GroupingKey;
use crate::core::query::aggregator::AggregateSpec;
use crate::core::query::window::Window;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable form of one live cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCell {
    pub window: Window,
    pub key: GroupingKey,
    pub cell: AggregateCell,
}

#[derive(Debug, Default)]
struct WindowState {
    cells: BTreeMap<GroupingKey, AggregateCell>,
}

#[derive(Debug)]
pub struct AggregationStateStore {
    aggregates: Vec<AggregateSpec>,
    windows: DashMap<Window, WindowState>,
}

impl AggregationStateStore {
    pub fn new(aggregates: Vec<AggregateSpec>) -> Self {
        Self {
            aggregates,
            windows: DashMap::new(),
        }
    }

    pub fn aggregates(&self) -> &[AggregateSpec] {
        &self.aggregates
    }

    /// Create or update the cell for `(window, key)`.
    ///
    /// Returns `true` when the cell was created by this call.
    pub fn apply(&self, window: Window, key: &GroupingKey, measures: &[f64], cycle: u64) -> bool {
        let mut state = self.windows.entry(window).or_default();
        let mut created = false;
        let cell = state.cells.entry(key.clone()).or_insert_with(|| {
            created = true;
            AggregateCell::new(self.aggregates.len())
        });
        cell.apply(&self.aggregates, measures, cycle);
        created
    }

    /// All `(key, values)` pairs of a window, ordered by key
    pub fn snapshot(&self, window: &Window) -> Vec<(GroupingKey, AggregateValues)> {
        self.windows
            .get(window)
            .map(|state| {
                state
                    .cells
                    .iter()
                    .map(|(key, cell)| (key.clone(), cell.values(&self.aggregates)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every cell of `window`, returning how many were dropped.
    ///
    /// Callers only purge windows whose final emission has been confirmed.
    pub fn purge(&self, window: &Window) -> usize {
        self.windows
            .remove(window)
            .map(|(_, state)| state.cells.len())
            .unwrap_or(0)
    }

    /// Live windows, ordered by start
    pub fn windows(&self) -> Vec<Window> {
        let mut windows: Vec<Window> = self.windows.iter().map(|entry| *entry.key()).collect();
        windows.sort();
        windows
    }

    /// Live windows whose end is at or before `watermark`
    pub fn finalized_windows(&self, watermark: i64) -> Vec<Window> {
        let mut windows: Vec<Window> = self
            .windows
            .iter()
            .map(|entry| *entry.key())
            .filter(|window| window.end <= watermark)
            .collect();
        windows.sort();
        windows
    }

    /// Cells mutated during `cycle`, ordered by window then key
    pub fn updated_cells(&self, cycle: u64) -> Vec<(Window, GroupingKey, AggregateValues)> {
        self.collect_cells(|cell| cell.last_updated_cycle() == cycle)
    }

    /// Every live cell, ordered by window then key
    pub fn all_cells(&self) -> Vec<(Window, GroupingKey, AggregateValues)> {
        self.collect_cells(|_| true)
    }

    fn collect_cells(
        &self,
        filter: impl Fn(&AggregateCell) -> bool,
    ) -> Vec<(Window, GroupingKey, AggregateValues)> {
        let mut cells = Vec::new();
        for entry in self.windows.iter() {
            for (key, cell) in entry.value().cells.iter().filter(|(_, cell)| filter(cell)) {
                cells.push((*entry.key(), key.clone(), cell.values(&self.aggregates)));
            }
        }
        cells.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        cells
    }

    pub fn contains(&self, window: &Window, key: &GroupingKey) -> bool {
        self.windows
            .get(window)
            .map(|state| state.cells.contains_key(key))
            .unwrap_or(false)
    }

    pub fn cell(&self, window: &Window, key: &GroupingKey) -> Option<AggregateCell> {
        self.windows
            .get(window)
            .and_then(|state| state.cells.get(key).cloned())
    }

    pub fn cell_count(&self) -> usize {
        self.windows.iter().map(|entry| entry.value().cells.len()).sum()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Serializable copy of every live cell
    pub fn export(&self) -> Vec<StoredCell> {
        let mut cells = Vec::with_capacity(self.cell_count());
        for entry in self.windows.iter() {
            for (key, cell) in entry.value().cells.iter() {
                cells.push(StoredCell {
                    window: *entry.key(),
                    key: key.clone(),
                    cell: cell.clone(),
                });
            }
        }
        cells.sort_by(|a, b| (a.window, &a.key).cmp(&(b.window, &b.key)));
        cells
    }

    /// Load exported cells, replacing any cell with the same identity
    pub fn import(&self, cells: Vec<StoredCell>) {
        for stored in cells {
            self.windows
                .entry(stored.window)
                .or_default()
                .cells
                .insert(stored.key, stored.cell);
        }
    }

    /// Check every cell against its invariants
    pub fn validate(&self) -> Result<(), String> {
        for entry in self.windows.iter() {
            let window = entry.key();
            if window.end <= window.start {
                return Err(format!("window {:?} is empty or inverted", window));
            }
            for (key, cell) in entry.value().cells.iter() {
                cell.check(&self.aggregates)
                    .map_err(|e| format!("cell {} {}: {}", window, key, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store() -> AggregationStateStore {
        let measures = vec!["fare".to_string(), "distance".to_string()];
        AggregationStateStore::new(vec![
            AggregateSpec::parse("sum(fare) as total_fare", &measures).unwrap(),
            AggregateSpec::parse("avg(distance) as avg_distance", &measures).unwrap(),
        ])
    }

    #[test]
    fn test_apply_creates_then_updates() {
        let store = store();
        let window = Window::new(0, 300_000);
        let key = GroupingKey::int(42);

        assert!(store.apply(window, &key, &[10.0, 2.0], 1));
        assert!(!store.apply(window, &key, &[5.0, 4.0], 1));

        let snapshot = store.snapshot(&window);
        assert_eq!(snapshot, vec![(key, vec![Some(15.0), Some(3.0)])]);
        assert_eq!(store.cell_count(), 1);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let store = store();
        let window = Window::new(0, 300_000);
        store.apply(window, &GroupingKey::int(1), &[1.0, 1.0], 1);
        let first = store.snapshot(&window);
        let second = store.snapshot(&window);
        assert_eq!(first, second);
        assert!(store.snapshot(&Window::new(300_000, 600_000)).is_empty());
    }

    #[test]
    fn test_purge_removes_only_that_window() {
        let store = store();
        let w1 = Window::new(0, 300_000);
        let w2 = Window::new(300_000, 600_000);
        store.apply(w1, &GroupingKey::int(1), &[1.0, 1.0], 1);
        store.apply(w1, &GroupingKey::int(2), &[1.0, 1.0], 1);
        store.apply(w2, &GroupingKey::int(1), &[1.0, 1.0], 1);

        assert_eq!(store.purge(&w1), 2);
        assert_eq!(store.purge(&w1), 0);
        assert_eq!(store.windows(), vec![w2]);
    }

    #[test]
    fn test_finalized_and_updated_cells() {
        let store = store();
        let w1 = Window::new(0, 300_000);
        let w2 = Window::new(300_000, 600_000);
        store.apply(w1, &GroupingKey::int(1), &[1.0, 1.0], 1);
        store.apply(w2, &GroupingKey::int(2), &[2.0, 2.0], 2);

        assert_eq!(store.finalized_windows(300_000), vec![w1]);
        assert!(store.finalized_windows(299_999).is_empty());

        let updated = store.updated_cells(2);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0, w2);
        assert_eq!(store.all_cells().len(), 2);
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = store();
        let window = Window::new(0, 300_000);
        source.apply(window, &GroupingKey::int(42), &[62.37, 12.45], 1);
        source.apply(window, &GroupingKey::int(87), &[35.18, 8.92], 1);

        let target = store();
        target.import(source.export());
        assert_eq!(target.all_cells(), source.all_cells());
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_concurrent_applies_to_one_cell_are_serialized() {
        let store = Arc::new(store());
        let window = Window::new(0, 300_000);
        let key = GroupingKey::int(7);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let key = key.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        store.apply(window, &key, &[1.0, 2.0], 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let cell = store.cell(&window, &key).unwrap();
        assert_eq!(cell.record_count(), 4_000);
        assert_eq!(store.snapshot(&window)[0].1, vec![Some(4_000.0), Some(2.0)]);
    }
}
