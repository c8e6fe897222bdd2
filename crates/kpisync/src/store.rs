//! Remote grid seam.
//!
//! The syncer only ever needs two calls from the spreadsheet service: read a
//! range and overwrite a range. Backends live in [`crate::backends`].

use kpisync_common::{A1Range, CellValue};

/// Row-major values as returned by [`GridStore::get_range`]. Trailing empty
/// rows and trailing empty cells of a row may be omitted by the backend.
pub type Rows = Vec<Vec<CellValue>>;

/// How values are rendered on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRender {
    /// Display strings, as a user sees them.
    Formatted,
    /// Raw numbers/booleans/strings, unaffected by cell formats.
    Unformatted,
}

impl ValueRender {
    pub fn as_api_str(self) -> &'static str {
        match self {
            ValueRender::Formatted => "FORMATTED_VALUE",
            ValueRender::Unformatted => "UNFORMATTED_VALUE",
        }
    }
}

/// How written values are interpreted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Stored exactly as sent.
    Raw,
    /// Parsed as if typed into the UI (numbers, dates, formulas).
    UserEntered,
}

impl InputMode {
    pub fn as_api_str(self) -> &'static str {
        match self {
            InputMode::Raw => "RAW",
            InputMode::UserEntered => "USER_ENTERED",
        }
    }
}

/// Failure reported by a backend. The message is what the retrier matches
/// transient patterns against.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    status: Option<u16>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Read/write access to a remote grid of cells.
pub trait GridStore {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError>;

    fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError>;
}

impl<S: GridStore + ?Sized> GridStore for &mut S {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        (**self).get_range(spreadsheet_id, range, render)
    }

    fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        (**self).update_range(spreadsheet_id, range, rows, mode)
    }
}

impl<S: GridStore + ?Sized> GridStore for Box<S> {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        (**self).get_range(spreadsheet_id, range, render)
    }

    fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        (**self).update_range(spreadsheet_id, range, rows, mode)
    }
}
