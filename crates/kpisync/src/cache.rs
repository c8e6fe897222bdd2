//! Per-run memo of header and key-column coordinates.
//!
//! A cache lives for exactly one run. Each header row or key column it warms
//! is read from the store at most once; later lookups against a warmed range
//! are answered from memory, and a miss is final.

use std::collections::{HashMap, HashSet};

use kpisync_common::{A1Range, ColumnLabel};
use tracing::{debug, trace};

use crate::binding::SyncTarget;
use crate::error::SyncError;
use crate::store::{GridStore, ValueRender};

#[derive(Debug, Default)]
pub struct CoordinateCache {
    /// topic label -> column (first occurrence wins)
    topics: HashMap<String, ColumnLabel>,
    /// key -> first row carrying it
    keys: HashMap<String, u32>,
    /// key -> every row carrying it, ascending
    key_rows: HashMap<String, Vec<u32>>,
    /// highest row seen in any key column scan or append
    max_row: u32,
    warmed: HashSet<String>,
    reads: usize,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column whose header cell in `header_row` (scanning right from
    /// `start_col`) equals `topic`.
    ///
    /// With `cache_all` the whole header row is memoised and an absent topic
    /// yields `Ok(None)`. Without it only the hit is memoised and an absent
    /// topic is [`SyncError::MissingTopic`].
    pub fn resolve_column<S: GridStore + ?Sized>(
        &mut self,
        store: &mut S,
        target: &SyncTarget,
        start_col: &ColumnLabel,
        header_row: u32,
        topic: &str,
        cache_all: bool,
    ) -> Result<Option<ColumnLabel>, SyncError> {
        let topic = topic.trim();
        let range = A1Range::open_row(&target.sheet, start_col, header_row);
        let range_key = range.to_string();

        if self.warmed.contains(&range_key) {
            return self.topic_or_miss(topic, &range_key, cache_all);
        }
        if let Some(col) = self.topics.get(topic) {
            return Ok(Some(col.clone()));
        }

        let rows = self.read(store, target, &range, ValueRender::Formatted)?;
        let header = rows.into_iter().next().unwrap_or_default();
        let mut found = None;
        for (idx, cell) in header.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let label = cell.canonical();
            let col = start_col.shifted(idx)?;
            if found.is_none() && label == topic {
                found = Some(col.clone());
                if !cache_all {
                    break;
                }
            }
            if cache_all {
                self.topics.entry(label).or_insert(col);
            }
        }

        if cache_all {
            debug!(range = %range_key, topics = self.topics.len(), "header row cached");
            self.warmed.insert(range_key.clone());
        } else if let Some(col) = &found {
            self.topics.insert(topic.to_string(), col.clone());
        }

        match found {
            Some(col) => Ok(Some(col)),
            None if cache_all => Ok(None),
            None => Err(SyncError::MissingTopic {
                topic: topic.to_string(),
                range: range_key,
            }),
        }
    }

    /// First row at or below `start_row` whose `key_col` cell equals `key`.
    ///
    /// `cache_all` memoises every key in the column (first occurrence wins for
    /// the single-row map, all occurrences for [`rows_for`](Self::rows_for))
    /// and makes an absent key `Ok(None)`. Without it an absent key is
    /// [`SyncError::MissingKey`]. `match_all` callers should read the full row
    /// set from [`rows_for`](Self::rows_for) afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_row<S: GridStore + ?Sized>(
        &mut self,
        store: &mut S,
        target: &SyncTarget,
        key_col: &ColumnLabel,
        start_row: u32,
        key: &str,
        match_all: bool,
        cache_all: bool,
    ) -> Result<Option<u32>, SyncError> {
        let key = key.trim();
        let range = A1Range::open_column(&target.sheet, key_col, start_row);
        let range_key = range.to_string();

        if self.warmed.contains(&range_key) {
            return self.row_or_miss(key, &range_key, cache_all);
        }
        if !match_all {
            if let Some(row) = self.keys.get(key) {
                return Ok(Some(*row));
            }
        }

        let rows = self.read(store, target, &range, ValueRender::Formatted)?;
        let mut found = None;
        let mut hits = Vec::new();
        for (offset, cells) in rows.iter().enumerate() {
            let row = start_row + offset as u32;
            self.max_row = self.max_row.max(row);
            let Some(cell) = cells.first().filter(|c| !c.is_empty()) else {
                continue;
            };
            let label = cell.canonical();
            if label == key {
                found.get_or_insert(row);
                hits.push(row);
            }
            if cache_all {
                self.keys.entry(label.clone()).or_insert(row);
                self.key_rows.entry(label).or_default().push(row);
            }
        }

        if cache_all {
            debug!(range = %range_key, keys = self.keys.len(), max_row = self.max_row, "key column cached");
            self.warmed.insert(range_key.clone());
        } else if let Some(row) = found {
            self.keys.entry(key.to_string()).or_insert(row);
            if match_all {
                self.key_rows.insert(key.to_string(), hits);
            }
        }

        match found {
            Some(row) => Ok(Some(row)),
            None if cache_all => Ok(None),
            None => Err(SyncError::MissingKey {
                key: key.to_string(),
                range: range_key,
            }),
        }
    }

    /// Read and memoise the whole key column once.
    pub fn warm_keys<S: GridStore + ?Sized>(
        &mut self,
        store: &mut S,
        target: &SyncTarget,
        key_col: &ColumnLabel,
        start_row: u32,
    ) -> Result<(), SyncError> {
        self.resolve_row(store, target, key_col, start_row, "", true, true)
            .map(|_| ())
    }

    pub fn topic(&self, topic: &str) -> Option<&ColumnLabel> {
        self.topics.get(topic.trim())
    }

    pub fn row(&self, key: &str) -> Option<u32> {
        self.keys.get(key.trim()).copied()
    }

    /// Every row known to carry `key`, ascending. Falls back to the single-row
    /// map when the key was only memoised as a first hit.
    pub fn rows_for(&self, key: &str) -> Vec<u32> {
        let key = key.trim();
        match self.key_rows.get(key) {
            Some(rows) => rows.clone(),
            None => self.keys.get(key).map(|row| vec![*row]).unwrap_or_default(),
        }
    }

    /// Highest row observed so far (0 when nothing has been seen).
    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    /// Record a key appended at `row` during this run.
    pub fn record_key(&mut self, key: &str, row: u32) {
        let key = key.trim().to_string();
        self.keys.entry(key.clone()).or_insert(row);
        let rows = self.key_rows.entry(key).or_default();
        if !rows.contains(&row) {
            rows.push(row);
            rows.sort_unstable();
        }
        self.max_row = self.max_row.max(row);
    }

    /// Undo [`record_key`](Self::record_key) after the append failed to persist.
    /// `max_row` stays put so later appends never reuse the row.
    pub fn forget_key(&mut self, key: &str, row: u32) {
        let key = key.trim();
        if self.keys.get(key) == Some(&row) {
            self.keys.remove(key);
        }
        if let Some(rows) = self.key_rows.get_mut(key) {
            rows.retain(|r| *r != row);
            if rows.is_empty() {
                self.key_rows.remove(key);
            } else if !self.keys.contains_key(key) {
                self.keys.insert(key.to_string(), rows[0]);
            }
        }
    }

    /// Number of store reads issued through this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    fn read<S: GridStore + ?Sized>(
        &mut self,
        store: &mut S,
        target: &SyncTarget,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<crate::store::Rows, SyncError> {
        trace!(range = %range, "reading coordinates");
        self.reads += 1;
        store
            .get_range(&target.spreadsheet_id, range, render)
            .map_err(|source| SyncError::Read {
                range: range.to_string(),
                source,
            })
    }

    fn topic_or_miss(
        &self,
        topic: &str,
        range: &str,
        cache_all: bool,
    ) -> Result<Option<ColumnLabel>, SyncError> {
        match self.topics.get(topic) {
            Some(col) => Ok(Some(col.clone())),
            None if cache_all => Ok(None),
            None => Err(SyncError::MissingTopic {
                topic: topic.to_string(),
                range: range.to_string(),
            }),
        }
    }

    fn row_or_miss(&self, key: &str, range: &str, cache_all: bool) -> Result<Option<u32>, SyncError> {
        match self.keys.get(key) {
            Some(row) => Ok(Some(*row)),
            None if cache_all => Ok(None),
            None => Err(SyncError::MissingKey {
                key: key.to_string(),
                range: range.to_string(),
            }),
        }
    }
}
