use kpisync_common::{A1Range, CellValue};
use tracing::info;

use crate::store::{GridStore, InputMode, Rows, StoreError, ValueRender};

/// Wrapper that reads through to the inner store and logs writes instead of
/// sending them.
#[derive(Debug)]
pub struct DryRun<S> {
    inner: S,
    skipped: usize,
}

impl<S> DryRun<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, skipped: 0 }
    }

    /// Number of writes swallowed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: GridStore> GridStore for DryRun<S> {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        self.inner.get_range(spreadsheet_id, range, render)
    }

    fn update_range(
        &mut self,
        _spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        self.skipped += 1;
        let values: Vec<String> = rows
            .iter()
            .map(|row| row.iter().map(CellValue::canonical).collect::<Vec<_>>().join(","))
            .collect();
        info!(
            range = %range,
            mode = mode.as_api_str(),
            values = ?values,
            "dry run: write skipped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use kpisync_common::ColumnLabel;

    #[test]
    fn writes_never_reach_inner_store() {
        let mut inner = MemoryStore::new();
        inner.set("S", "A1", "kept");
        let mut store = DryRun::new(inner);
        let range = A1Range::cell("S", &ColumnLabel::parse("A").unwrap(), 1);
        store
            .update_range("id", &range, &[vec![CellValue::from("new")]], InputMode::Raw)
            .unwrap();
        let rows = store.get_range("id", &range, ValueRender::Formatted).unwrap();
        assert_eq!(rows, vec![vec![CellValue::from("kept")]]);
        assert_eq!(store.skipped(), 1);
        assert!(store.into_inner().writes().is_empty());
    }
}
