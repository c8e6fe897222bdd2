use chrono::{DateTime, Utc};
use kpisync_common::{A1Range, CellValue};

use crate::binding::SyncTarget;
use crate::error::SyncError;
use crate::retry::{Sleeper, WriteRetrier};
use crate::source::Scraper;
use crate::store::{GridStore, InputMode};

/// Borrowed collaborators of one run.
pub struct RunContext<'a, S: ?Sized, P: ?Sized, Z> {
    pub store: &'a mut S,
    pub scraper: &'a P,
    pub retrier: &'a mut WriteRetrier<Z>,
    pub target: &'a SyncTarget,
    pub now: DateTime<Utc>,
}

impl<S, P, Z> RunContext<'_, S, P, Z>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    /// Write `rows` to `range` through the retrier.
    pub fn persist(
        &mut self,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), SyncError> {
        self.retrier
            .persist(&mut *self.store, &self.target.spreadsheet_id, range, rows, mode)
            .map(|_| ())
    }

    /// Write a single cell through the retrier.
    pub fn persist_cell(
        &mut self,
        range: &A1Range,
        value: CellValue,
        mode: InputMode,
    ) -> Result<(), SyncError> {
        self.persist(range, &[vec![value]], mode)
    }
}
