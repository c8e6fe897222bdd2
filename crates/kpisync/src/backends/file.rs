use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use kpisync_common::{A1Range, CellValue, ColumnLabel};
use serde::{Deserialize, Serialize};

use super::memory::MemoryStore;
use crate::store::{GridStore, InputMode, Rows, StoreError, ValueRender};

#[derive(Serialize, Deserialize, Debug, Default)]
struct GridFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    sheets: BTreeMap<String, Vec<FileCell>>,
}

fn default_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug)]
struct FileCell {
    row: u32,
    col: ColumnLabel,
    value: CellValue,
}

/// Grid persisted as a JSON document on local disk.
///
/// The whole file is loaded on open and rewritten after each successful
/// update, so it is only meant for small sheets and offline runs.
#[derive(Debug)]
pub struct FileStore {
    grid: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Open `path`, starting from an empty grid when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut grid = MemoryStore::new();
        if path.exists() {
            let file = File::open(&path)
                .map_err(|e| StoreError::new(format!("open {}: {e}", path.display())))?;
            let doc: GridFile = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StoreError::new(format!("parse {}: {e}", path.display())))?;
            for (sheet, cells) in doc.sheets {
                for cell in cells {
                    grid.put(&sheet, cell.row, cell.col.offset(), cell.value);
                }
            }
        }
        Ok(Self { grid, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn grid(&self) -> &MemoryStore {
        &self.grid
    }

    fn save(&self) -> Result<(), StoreError> {
        let mut doc = GridFile {
            version: default_version(),
            sheets: BTreeMap::new(),
        };
        for (sheet, row, col, value) in self.grid.cells() {
            doc.sheets.entry(sheet.to_string()).or_default().push(FileCell {
                row,
                col: ColumnLabel::from_offset(col),
                value: value.clone(),
            });
        }
        let io_err = |e: std::io::Error| StoreError::new(format!("write {}: {e}", self.path.display()));
        let file = File::create(&self.path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &doc)
            .map_err(|e| StoreError::new(format!("encode {}: {e}", self.path.display())))?;
        out.flush().map_err(io_err)
    }
}

impl GridStore for FileStore {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        self.grid.get_range(spreadsheet_id, range, render)
    }

    fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        self.grid.update_range(spreadsheet_id, range, rows, mode)?;
        self.save()
    }
}
