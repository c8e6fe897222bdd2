//! Applying scraped values to buffered grid state.

use kpisync_common::CellValue;
use tracing::{debug, warn};

use crate::buffer::ColumnBuffer;
use crate::cache::CoordinateCache;

/// Result of reconciling one keyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Every target cell already held the value.
    NoOp,
    /// At least one existing row changed.
    Updated,
    /// The key was new and appended at this row.
    Appended(u32),
    /// The key was new and appending is disabled.
    Skipped,
}

/// Per-item status reported to the `synced_datapoints_total` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Synced,
    Collision,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Collision => "collision",
            SyncStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncTally {
    pub synced: usize,
    pub collision: usize,
    pub failed: usize,
}

impl SyncTally {
    pub fn record(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::Synced => self.synced += 1,
            SyncStatus::Collision => self.collision += 1,
            SyncStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordTally {
    pub no_op: usize,
    pub updated: usize,
    pub appended: usize,
    pub skipped: usize,
}

impl RecordTally {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::NoOp => self.no_op += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Appended(_) => self.appended += 1,
            RecordOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn changed(&self) -> usize {
        self.updated + self.appended
    }

    pub fn merge(&mut self, other: RecordTally) {
        self.no_op += other.no_op;
        self.updated += other.updated;
        self.appended += other.appended;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordPolicy {
    pub add_rows: bool,
    pub match_all: bool,
}

/// Reconcile `value` for `key` into `buffer`.
///
/// The cache must already hold the warmed key column. Appends go one row past
/// the highest row known to the cache or the buffer, and are recorded in the
/// cache so later records and datapoints in the same run see them.
pub fn reconcile_record(
    cache: &mut CoordinateCache,
    buffer: &mut ColumnBuffer,
    policy: RecordPolicy,
    key: &str,
    value: &CellValue,
) -> RecordOutcome {
    let key = key.trim();
    let rows = if policy.match_all {
        cache.rows_for(key)
    } else {
        cache.row(key).into_iter().collect()
    };

    if !rows.is_empty() {
        let mut changed = false;
        for row in rows {
            let existing = buffer.get(row);
            if existing.same_as(value) {
                continue;
            }
            debug!(key, row, old = %existing, new = %value, "value changed");
            if buffer.set(row, value.clone()) {
                changed = true;
            }
        }
        return if changed {
            RecordOutcome::Updated
        } else {
            RecordOutcome::NoOp
        };
    }

    if !policy.add_rows {
        warn!(key, "key not in sheet and add-rows is off; skipping record");
        return RecordOutcome::Skipped;
    }

    buffer.pad_to_row(cache.max_row());
    let row = buffer.push(value.clone());
    cache.record_key(key, row);
    debug!(key, row, value = %value, "appending row");
    RecordOutcome::Appended(row)
}

/// State of a legacy KPI's title cell relative to the configured title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleCheck {
    /// Blank cell; the title gets written.
    Empty,
    /// Already carries this title.
    Matches,
    /// Carries a different title; the row belongs to someone else.
    Collision,
}

pub fn check_title(existing: &CellValue, title: &str) -> TitleCheck {
    if existing.is_empty() {
        TitleCheck::Empty
    } else if existing.canonical() == title.trim() {
        TitleCheck::Matches
    } else {
        TitleCheck::Collision
    }
}
