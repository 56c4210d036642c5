// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine counters.
//!
//! All counters are monotonically increasing atomics shared between the
//! scheduler thread and observers (health checks, the binary's final report).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    records_ingested: AtomicU64,
    records_admitted: AtomicU64,
    late_records_dropped: AtomicU64,
    late_contributions_dropped: AtomicU64,
    duplicate_records_skipped: AtomicU64,
    unassigned_records: AtomicU64,
    malformed_records: AtomicU64,
    rows_emitted: AtomicU64,
    sink_failures: AtomicU64,
    windows_purged: AtomicU64,
    cycles: AtomicU64,
    /// Non-zero while an emission is being retried
    pending_retries: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $get:ident) => {
        #[inline]
        pub fn $inc(&self, n: u64) {
            self.$get.fetch_add(n, Ordering::Relaxed);
        }

        #[inline]
        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }
    };
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(add_records_ingested, records_ingested);
    counter!(add_records_admitted, records_admitted);
    counter!(add_late_records_dropped, late_records_dropped);
    counter!(add_late_contributions_dropped, late_contributions_dropped);
    counter!(add_duplicate_records_skipped, duplicate_records_skipped);
    counter!(add_unassigned_records, unassigned_records);
    counter!(add_malformed_records, malformed_records);
    counter!(add_rows_emitted, rows_emitted);
    counter!(add_sink_failures, sink_failures);
    counter!(add_windows_purged, windows_purged);
    counter!(add_cycles, cycles);

    pub fn set_pending_retries(&self, n: u64) {
        self.pending_retries.store(n, Ordering::Relaxed);
    }

    pub fn pending_retries(&self) -> u64 {
        self.pending_retries.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_ingested: self.records_ingested(),
            records_admitted: self.records_admitted(),
            late_records_dropped: self.late_records_dropped(),
            late_contributions_dropped: self.late_contributions_dropped(),
            duplicate_records_skipped: self.duplicate_records_skipped(),
            unassigned_records: self.unassigned_records(),
            malformed_records: self.malformed_records(),
            rows_emitted: self.rows_emitted(),
            sink_failures: self.sink_failures(),
            windows_purged: self.windows_purged(),
            cycles: self.cycles(),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub records_ingested: u64,
    pub records_admitted: u64,
    pub late_records_dropped: u64,
    pub late_contributions_dropped: u64,
    pub duplicate_records_skipped: u64,
    pub unassigned_records: u64,
    pub malformed_records: u64,
    pub rows_emitted: u64,
    pub sink_failures: u64,
    pub windows_purged: u64,
    pub cycles: u64,
}

impl MetricsSnapshot {
    /// Share of ingested records that were dropped as too late (0.0 to 1.0)
    pub fn late_ratio(&self) -> f64 {
        if self.records_ingested == 0 {
            0.0
        } else {
            self.late_records_dropped as f64 / self.records_ingested as f64
        }
    }
}
