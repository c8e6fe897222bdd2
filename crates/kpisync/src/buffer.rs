use kpisync_common::{A1Range, CellValue, ColumnLabel};

use crate::binding::SyncTarget;
use crate::error::SyncError;
use crate::store::{GridStore, Rows, ValueRender};

/// In-memory copy of one column from `start_row` downwards.
///
/// Mutations only touch the buffer; the caller persists [`range`](Self::range)
/// with [`to_rows`](Self::to_rows) once all records for the column are applied.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    column: ColumnLabel,
    start_row: u32,
    cells: Vec<CellValue>,
    dirty: bool,
}

impl ColumnBuffer {
    pub fn new(column: ColumnLabel, start_row: u32) -> Self {
        Self {
            column,
            start_row,
            cells: Vec::new(),
            dirty: false,
        }
    }

    /// Build from rows as returned by [`GridStore::get_range`]; only the first
    /// cell of each row is kept.
    pub fn from_rows(column: ColumnLabel, start_row: u32, rows: Rows) -> Self {
        let cells = rows
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect();
        Self {
            column,
            start_row,
            cells,
            dirty: false,
        }
    }

    /// Read the open column `column` from `start_row` down.
    pub fn load<S: GridStore + ?Sized>(
        store: &mut S,
        target: &SyncTarget,
        column: &ColumnLabel,
        start_row: u32,
        render: ValueRender,
    ) -> Result<Self, SyncError> {
        let range = A1Range::open_column(&target.sheet, column, start_row);
        let rows = store
            .get_range(&target.spreadsheet_id, &range, render)
            .map_err(|source| SyncError::Read {
                range: range.to_string(),
                source,
            })?;
        Ok(Self::from_rows(column.clone(), start_row, rows))
    }

    pub fn column(&self) -> &ColumnLabel {
        &self.column
    }

    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Last row covered by the buffer, `start_row - 1` when empty.
    pub fn end_row(&self) -> u32 {
        (self.start_row + self.cells.len() as u32).saturating_sub(1)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn index(&self, row: u32) -> Option<usize> {
        row.checked_sub(self.start_row).map(|idx| idx as usize)
    }

    /// Value at `row`; rows outside the buffer read as empty.
    pub fn get(&self, row: u32) -> CellValue {
        self.index(row)
            .and_then(|idx| self.cells.get(idx))
            .cloned()
            .unwrap_or_default()
    }

    /// Grow with empty cells so that `row` is covered. Rows above `start_row`
    /// are ignored.
    pub fn pad_to_row(&mut self, row: u32) {
        if let Some(idx) = self.index(row) {
            if idx >= self.cells.len() {
                self.cells.resize(idx + 1, CellValue::Empty);
            }
        }
    }

    /// Overwrite `row`, padding as needed. Returns `false` for rows above the
    /// buffer, which are left alone.
    pub fn set(&mut self, row: u32, value: CellValue) -> bool {
        let Some(idx) = self.index(row) else {
            return false;
        };
        self.pad_to_row(row);
        self.cells[idx] = value;
        self.dirty = true;
        true
    }

    /// Append below the last covered row and return the row written.
    pub fn push(&mut self, value: CellValue) -> u32 {
        self.cells.push(value);
        self.dirty = true;
        self.end_row()
    }

    /// Bounded range covering the whole buffer.
    pub fn range(&self, sheet: &str) -> A1Range {
        A1Range::column_span(sheet, &self.column, self.start_row, self.end_row().max(self.start_row))
    }

    pub fn to_rows(&self) -> Rows {
        self.cells.iter().map(|cell| vec![cell.clone()]).collect()
    }
}
