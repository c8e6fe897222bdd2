use std::collections::{BTreeMap, VecDeque};

use kpisync_common::{A1Range, A1Ref, CellValue};

use crate::store::{GridStore, InputMode, Rows, StoreError, ValueRender};

/// One successful `update_range` call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub range: String,
    pub rows: Rows,
    pub mode: InputMode,
}

/// In-process grid. Ignores the spreadsheet id and keeps one grid per sheet.
///
/// Every read and write is logged, and failures can be queued up front, which
/// makes it the store of choice for exercising the syncer without a network.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// sheet -> (1-based row, 0-based column) -> value
    sheets: BTreeMap<String, BTreeMap<(u32, u32), CellValue>>,
    reads: Vec<String>,
    writes: Vec<WriteRecord>,
    read_failures: VecDeque<StoreError>,
    write_failures: VecDeque<StoreError>,
    failing_ranges: BTreeMap<String, StoreError>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one cell by A1 reference (`"B5"`). Invalid references are ignored.
    pub fn set(&mut self, sheet: &str, cell: &str, value: impl Into<CellValue>) {
        if let Ok(A1Ref {
            col: Some(col),
            row: Some(row),
        }) = A1Ref::parse(cell)
        {
            self.put(sheet, row, col.offset(), value.into());
        }
    }

    /// Fill a column downwards from `cell`.
    pub fn set_column<V: Into<CellValue>>(
        &mut self,
        sheet: &str,
        cell: &str,
        values: impl IntoIterator<Item = V>,
    ) {
        if let Ok(A1Ref {
            col: Some(col),
            row: Some(row),
        }) = A1Ref::parse(cell)
        {
            for (idx, value) in values.into_iter().enumerate() {
                self.put(sheet, row + idx as u32, col.offset(), value.into());
            }
        }
    }

    /// Fill a row rightwards from `cell`.
    pub fn set_row<V: Into<CellValue>>(
        &mut self,
        sheet: &str,
        cell: &str,
        values: impl IntoIterator<Item = V>,
    ) {
        if let Ok(A1Ref {
            col: Some(col),
            row: Some(row),
        }) = A1Ref::parse(cell)
        {
            for (idx, value) in values.into_iter().enumerate() {
                self.put(sheet, row, col.offset() + idx as u32, value.into());
            }
        }
    }

    /// Value at `cell`, `Empty` when unset or when the reference is invalid.
    pub fn get(&self, sheet: &str, cell: &str) -> CellValue {
        match A1Ref::parse(cell) {
            Ok(A1Ref {
                col: Some(col),
                row: Some(row),
            }) => self
                .sheets
                .get(sheet)
                .and_then(|grid| grid.get(&(row, col.offset())))
                .cloned()
                .unwrap_or_default(),
            _ => CellValue::Empty,
        }
    }

    /// Ranges read so far, in call order.
    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    /// Successful writes so far, in call order.
    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn clear_logs(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }

    /// Make the next read fail with `err`. Queued failures are consumed in order.
    pub fn fail_next_read(&mut self, err: StoreError) {
        self.read_failures.push_back(err);
    }

    /// Make the next write fail with `err`. Queued failures are consumed in order.
    pub fn fail_next_write(&mut self, err: StoreError) {
        self.write_failures.push_back(err);
    }

    /// Make every write to exactly `range` (e.g. `"Data!C2:C5"`) fail with `err`.
    pub fn fail_writes_to(&mut self, range: &str, err: StoreError) {
        self.failing_ranges.insert(range.to_string(), err);
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = (&str, u32, u32, &CellValue)> {
        self.sheets.iter().flat_map(|(sheet, grid)| {
            grid.iter()
                .map(move |((row, col), value)| (sheet.as_str(), *row, *col, value))
        })
    }

    pub(crate) fn put(&mut self, sheet: &str, row: u32, col: u32, value: CellValue) {
        let grid = self.sheets.entry(sheet.to_string()).or_default();
        if value.is_empty() {
            grid.remove(&(row, col));
        } else {
            grid.insert((row, col), value);
        }
    }

    fn read(&self, range: &A1Range, render: ValueRender) -> Rows {
        let Some(grid) = self.sheets.get(&range.sheet) else {
            return Vec::new();
        };
        let first_row = range.first_row();
        let first_col = range.first_col();
        let in_bounds = |row: u32, col: u32| {
            row >= first_row
                && col >= first_col
                && range.last_row().is_none_or(|last| row <= last)
                && range.last_col().is_none_or(|last| col <= last)
        };
        let Some(last_row) = grid
            .keys()
            .filter(|(row, col)| in_bounds(*row, *col))
            .map(|(row, _)| *row)
            .max()
        else {
            return Vec::new();
        };

        let mut rows = Vec::with_capacity((last_row - first_row + 1) as usize);
        for row in first_row..=last_row {
            let mut cells: Vec<CellValue> = Vec::new();
            for ((_, col), value) in grid.range((row, first_col)..=(row, u32::MAX)) {
                if !in_bounds(row, *col) {
                    break;
                }
                let idx = (*col - first_col) as usize;
                cells.resize(idx, CellValue::Empty);
                cells.push(render_value(value, render));
            }
            rows.push(cells);
        }
        rows
    }
}

fn render_value(value: &CellValue, render: ValueRender) -> CellValue {
    match (render, value) {
        (ValueRender::Formatted, CellValue::Text(_)) => value.clone(),
        (ValueRender::Formatted, other) => CellValue::Text(other.canonical()),
        (ValueRender::Unformatted, _) => value.clone(),
    }
}

impl GridStore for MemoryStore {
    fn get_range(
        &mut self,
        _spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        if let Some(err) = self.read_failures.pop_front() {
            return Err(err);
        }
        self.reads.push(range.to_string());
        Ok(self.read(range, render))
    }

    fn update_range(
        &mut self,
        _spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        if let Some(err) = self.write_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = self.failing_ranges.get(&range.to_string()) {
            return Err(err.clone());
        }
        let first_row = range.first_row();
        let first_col = range.first_col();
        for (r, cells) in rows.iter().enumerate() {
            for (c, value) in cells.iter().enumerate() {
                self.put(
                    &range.sheet,
                    first_row + r as u32,
                    first_col + c as u32,
                    value.clone(),
                );
            }
        }
        self.writes.push(WriteRecord {
            range: range.to_string(),
            rows: rows.to_vec(),
            mode,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpisync_common::ColumnLabel;

    fn col(s: &str) -> ColumnLabel {
        ColumnLabel::parse(s).unwrap()
    }

    #[test]
    fn header_row_keeps_interior_gaps() {
        let mut store = MemoryStore::new();
        store.set("S", "C1", "Jan");
        store.set("S", "E1", "Feb");
        let rows = store
            .get_range("id", &A1Range::open_row("S", &col("B"), 1), ValueRender::Formatted)
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![
                CellValue::Empty,
                CellValue::from("Jan"),
                CellValue::Empty,
                CellValue::from("Feb"),
            ]]
        );
        assert_eq!(store.reads(), ["S!B1:1"]);
    }

    #[test]
    fn column_read_trims_trailing_rows() {
        let mut store = MemoryStore::new();
        store.set_column("S", "A3", ["k1", "", "k3"]);
        store.set("S", "B9", 1i64);
        let rows = store
            .get_range("id", &A1Range::open_column("S", &col("A"), 3), ValueRender::Unformatted)
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec![CellValue::from("k3")]);
    }

    #[test]
    fn formatted_render_stringifies_numbers() {
        let mut store = MemoryStore::new();
        store.set("S", "A1", 3.0);
        let rows = store
            .get_range("id", &A1Range::cell("S", &col("A"), 1), ValueRender::Formatted)
            .unwrap();
        assert_eq!(rows, vec![vec![CellValue::from("3")]]);
    }

    #[test]
    fn writes_apply_and_log() {
        let mut store = MemoryStore::new();
        store.set("S", "B2", "old");
        let range = A1Range::column_span("S", &col("B"), 2, 3);
        store
            .update_range(
                "id",
                &range,
                &[vec![CellValue::Empty], vec![CellValue::Int(4)]],
                InputMode::Raw,
            )
            .unwrap();
        assert_eq!(store.get("S", "B2"), CellValue::Empty);
        assert_eq!(store.get("S", "B3"), CellValue::Int(4));
        assert_eq!(store.writes()[0].range, "S!B2:B3");
    }

    #[test]
    fn queued_failures_are_consumed_once() {
        let mut store = MemoryStore::new();
        store.fail_next_write(StoreError::new("googleapi: Error 429: slow down"));
        let range = A1Range::cell("S", &col("A"), 1);
        let rows = [vec![CellValue::Int(1)]];
        assert!(store.update_range("id", &range, &rows, InputMode::Raw).is_err());
        assert!(store.update_range("id", &range, &rows, InputMode::Raw).is_ok());
        assert_eq!(store.writes().len(), 1);
    }
}
