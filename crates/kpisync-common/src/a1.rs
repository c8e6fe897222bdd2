//! Sheet-qualified A1 ranges as used by the remote grid API.
//!
//! Only the shapes the syncer issues are modelled: single cells (`Sheet!B5:B5`),
//! bounded column slices (`Sheet!B5:B9`), open columns (`Sheet!B5:B`) and open
//! rows (`Sheet!D1:1`).

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::column::{ColumnError, ColumnLabel};

/// Errors produced while parsing an A1 range.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum A1ParseError {
    MissingSheet,
    UnterminatedSheetName,
    EmptyReference,
    InvalidReference(String),
    ZeroRow,
    Column(ColumnError),
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            A1ParseError::MissingSheet => write!(f, "range must be qualified with `Sheet!`"),
            A1ParseError::UnterminatedSheetName => write!(f, "quoted sheet name is not closed"),
            A1ParseError::EmptyReference => write!(f, "range reference is empty"),
            A1ParseError::InvalidReference(r) => write!(f, "invalid cell reference `{r}`"),
            A1ParseError::ZeroRow => write!(f, "row numbers are 1-based"),
            A1ParseError::Column(err) => err.fmt(f),
        }
    }
}

impl Error for A1ParseError {}

impl From<ColumnError> for A1ParseError {
    fn from(value: ColumnError) -> Self {
        A1ParseError::Column(value)
    }
}

/// One corner of a range. Either axis may be open.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct A1Ref {
    pub col: Option<ColumnLabel>,
    pub row: Option<u32>,
}

impl A1Ref {
    pub fn new(col: Option<ColumnLabel>, row: Option<u32>) -> Self {
        Self { col, row }
    }

    /// Parse a bare reference such as `B5`, `B` or `5`.
    pub fn parse(text: &str) -> Result<Self, A1ParseError> {
        if text.is_empty() {
            return Err(A1ParseError::EmptyReference);
        }
        let split = text
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(text.len());
        let (letters, digits) = text.split_at(split);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(A1ParseError::InvalidReference(text.to_string()));
        }
        let col = if letters.is_empty() {
            None
        } else {
            Some(ColumnLabel::parse(letters)?)
        };
        let row = if digits.is_empty() {
            None
        } else {
            let row: u32 = digits
                .parse()
                .map_err(|_| A1ParseError::InvalidReference(text.to_string()))?;
            if row == 0 {
                return Err(A1ParseError::ZeroRow);
            }
            Some(row)
        };
        Ok(Self { col, row })
    }
}

impl fmt::Display for A1Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.col {
            write!(f, "{col}")?;
        }
        if let Some(row) = self.row {
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

/// Sheet-qualified A1 range.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct A1Range {
    pub sheet: String,
    pub start: A1Ref,
    pub end: A1Ref,
}

impl A1Range {
    /// Single cell, rendered as `Sheet!B5:B5`.
    pub fn cell(sheet: impl Into<String>, col: &ColumnLabel, row: u32) -> Self {
        let corner = A1Ref::new(Some(col.clone()), Some(row));
        Self {
            sheet: sheet.into(),
            start: corner.clone(),
            end: corner,
        }
    }

    /// Bounded vertical slice of one column.
    pub fn column_span(
        sheet: impl Into<String>,
        col: &ColumnLabel,
        start_row: u32,
        end_row: u32,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            start: A1Ref::new(Some(col.clone()), Some(start_row)),
            end: A1Ref::new(Some(col.clone()), Some(end_row)),
        }
    }

    /// Column from `start_row` down to the end of the sheet (`Sheet!B5:B`).
    pub fn open_column(sheet: impl Into<String>, col: &ColumnLabel, start_row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start: A1Ref::new(Some(col.clone()), Some(start_row)),
            end: A1Ref::new(Some(col.clone()), None),
        }
    }

    /// Row from `start_col` to the right edge of the sheet (`Sheet!D1:1`).
    pub fn open_row(sheet: impl Into<String>, start_col: &ColumnLabel, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start: A1Ref::new(Some(start_col.clone()), Some(row)),
            end: A1Ref::new(None, Some(row)),
        }
    }

    pub fn parse(text: &str) -> Result<Self, A1ParseError> {
        let (sheet, refs) = split_sheet(text)?;
        let (start, end) = match refs.split_once(':') {
            Some((a, b)) => (A1Ref::parse(a)?, A1Ref::parse(b)?),
            None => {
                let corner = A1Ref::parse(refs)?;
                (corner.clone(), corner)
            }
        };
        Ok(Self { sheet, start, end })
    }

    /// 1-based first row; open starts begin at row 1.
    pub fn first_row(&self) -> u32 {
        self.start.row.unwrap_or(1)
    }

    /// 0-based first column; open starts begin at `A`.
    pub fn first_col(&self) -> u32 {
        self.start.col.as_ref().map(ColumnLabel::offset).unwrap_or(0)
    }

    /// 1-based last row, `None` when the range is open downwards.
    pub fn last_row(&self) -> Option<u32> {
        self.end.row
    }

    /// 0-based last column, `None` when the range is open to the right.
    pub fn last_col(&self) -> Option<u32> {
        self.end.col.as_ref().map(ColumnLabel::offset)
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_name(f, &self.sheet)?;
        write!(f, "!{}:{}", self.start, self.end)
    }
}

impl FromStr for A1Range {
    type Err = A1ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn needs_quotes(sheet: &str) -> bool {
    sheet.is_empty() || !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_sheet_name(f: &mut fmt::Formatter<'_>, sheet: &str) -> fmt::Result {
    if needs_quotes(sheet) {
        write!(f, "'{}'", sheet.replace('\'', "''"))
    } else {
        f.write_str(sheet)
    }
}

fn split_sheet(text: &str) -> Result<(String, &str), A1ParseError> {
    if let Some(rest) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if ch == '\'' {
                if let Some((_, '\'')) = chars.peek() {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let tail = &rest[idx + 1..];
                return tail
                    .strip_prefix('!')
                    .map(|refs| (name, refs))
                    .ok_or(A1ParseError::MissingSheet);
            }
            name.push(ch);
        }
        return Err(A1ParseError::UnterminatedSheetName);
    }
    text.rsplit_once('!')
        .map(|(sheet, refs)| (sheet.to_string(), refs))
        .ok_or(A1ParseError::MissingSheet)
}
