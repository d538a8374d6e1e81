//! Sheets of cells and the column checks every pipeline starts with.
//!
//! Headers are matched loosely: trimmed, upper-cased, and bound to the
//! first header *containing* the required name, so `Oil (STB/d)` serves as
//! `OIL`. Empty cells count as zero. Values that cannot be read as the
//! column's type fail the whole request with the sheet, row and column
//! named; nothing is skipped silently.

use crate::error::ConvertError;
use chrono::{NaiveDate, NaiveDateTime};

/// A single cell after reading, before column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn from_text(s: &str) -> Cell {
        let s = s.trim();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn raw(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => crate::pipeline::format_number(*n),
            Cell::Date(d) => d.to_string(),
        }
    }
}

static EMPTY: Cell = Cell::Empty;

/// A data row and its 1-based line in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub line: usize,
    pub cells: Vec<Cell>,
}

/// One sheet: a header row plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Sheet {
    /// Bind each required column name to a header.
    ///
    /// An exact (normalised) header match wins; otherwise the first unbound
    /// header containing the name is used. `label` is appended to the
    /// missing-columns message (`... columns on <label>!`).
    pub fn bind_columns(
        &self,
        required: &[&str],
        label: Option<&str>,
    ) -> Result<BoundSheet<'_>, ConvertError> {
        let normalised: Vec<String> = self
            .headers
            .iter()
            .map(|h| h.trim().to_uppercase())
            .collect();

        let mut taken = vec![false; normalised.len()];
        let mut columns = Vec::with_capacity(required.len());
        let mut missing = Vec::new();

        for name in required {
            let exact = normalised
                .iter()
                .enumerate()
                .position(|(i, h)| !taken[i] && h == name);
            let found = exact.or_else(|| {
                normalised
                    .iter()
                    .enumerate()
                    .position(|(i, h)| !taken[i] && h.contains(name))
            });

            match found {
                Some(idx) => {
                    taken[idx] = true;
                    columns.push((name.to_string(), idx));
                }
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ConvertError::MissingColumns {
                columns: missing,
                sheet: label.map(str::to_string),
            });
        }
        if self.rows.is_empty() {
            return Err(ConvertError::EmptyTable {
                sheet: self.name.clone(),
            });
        }

        Ok(BoundSheet {
            sheet: self,
            columns,
        })
    }
}

/// A sheet whose required columns have been located.
#[derive(Debug)]
pub struct BoundSheet<'a> {
    sheet: &'a Sheet,
    columns: Vec<(String, usize)>,
}

impl<'a> BoundSheet<'a> {
    pub fn rows(&self) -> &'a [Row] {
        &self.sheet.rows
    }

    fn cell<'r, 'c>(&'c self, row: &'r Row, column: &'c str) -> (&'r Cell, &'c str) {
        let (name, idx) = self
            .columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(name, idx)| (name.as_str(), *idx))
            .unwrap_or((column, usize::MAX));
        (row.cells.get(idx).unwrap_or(&EMPTY), name)
    }

    fn invalid(&self, row: &Row, column: &str, cell: &Cell, reason: &'static str) -> ConvertError {
        ConvertError::InvalidCell {
            sheet: self.sheet.name.clone(),
            row: row.line,
            column: column.to_string(),
            value: cell.raw(),
            reason,
        }
    }

    /// Text value; empty reads as `"0"`, integral numbers lose their fraction.
    pub fn text(&self, row: &Row, column: &str) -> String {
        let (cell, _) = self.cell(row, column);
        match cell {
            Cell::Empty => "0".to_string(),
            other => other.raw(),
        }
    }

    /// Numeric value; empty reads as `0`.
    pub fn number(&self, row: &Row, column: &str) -> Result<f64, ConvertError> {
        let (cell, name) = self.cell(row, column);
        let value = match cell {
            Cell::Empty => Some(0.0),
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.replace(',', "").parse::<f64>().ok(),
            Cell::Date(_) => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.invalid(row, name, cell, "expected a number")),
        }
    }

    /// Calendar date; time of day is dropped.
    pub fn date(&self, row: &Row, column: &str) -> Result<NaiveDate, ConvertError> {
        let (cell, name) = self.cell(row, column);
        let date = match cell {
            Cell::Date(dt) => Some(dt.date()),
            Cell::Text(s) => parse_date(s),
            Cell::Empty | Cell::Number(_) => None,
        };
        date.ok_or_else(|| self.invalid(row, name, cell, "expected a date such as 2020-01-31"))
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%d %b %Y", "%Y%m%d",
];

/// Parse the date spellings found in field exports.
///
/// Slash-separated day-first dates are ambiguous; month-first is assumed,
/// falling back to day-first only when the month would be out of range.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
        .or_else(|| NaiveDate::parse_from_str(s, "%d/%m/%Y").ok())
}
