//! Input reading: turn uploaded bytes into sheets of cells.
//!
//! ## Why sniff as well as trust the extension?
//!
//! Browsers and scripts upload files under whatever name the user picked;
//! `data` or `export.txt` is common. The extension is consulted first, and
//! when it says nothing useful we fall back to the content: ZIP or OLE magic
//! means a workbook, valid UTF-8 means CSV. Only when both fail is the file
//! rejected as unsupported.

use crate::error::ConvertError;
use crate::pipeline::table::{Cell, Row, Sheet};
use crate::request::UploadedFile;
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use std::io::Cursor;
use tracing::debug;

/// Name given to the single sheet of a CSV file.
pub const CSV_SHEET_NAME: &str = "Sheet1";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Container format of an uploaded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Workbook,
}

/// Reads one container format into sheets.
pub trait TableReader {
    fn read(&self, file: &UploadedFile) -> Result<Vec<Sheet>, ConvertError>;
}

/// Decide how to read `file`.
pub fn detect_format(file: &UploadedFile) -> Result<TableFormat, ConvertError> {
    let ext = file
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("csv") => return Ok(TableFormat::Csv),
        Some("xlsx" | "xls" | "xlsm" | "xlsb" | "ods") => return Ok(TableFormat::Workbook),
        _ => {}
    }

    let bytes = file.bytes.as_ref();
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        debug!(filename = %file.filename, "Sniffed workbook content");
        return Ok(TableFormat::Workbook);
    }
    if std::str::from_utf8(bytes).is_ok() {
        debug!(filename = %file.filename, "Sniffed CSV content");
        return Ok(TableFormat::Csv);
    }

    Err(ConvertError::UnsupportedFormat {
        filename: file.filename.clone(),
    })
}

/// Read every sheet of an uploaded table.
///
/// Returns at least one sheet; fully blank workbook sheets are dropped.
pub fn read_sheets(file: &UploadedFile) -> Result<Vec<Sheet>, ConvertError> {
    let sheets = match detect_format(file)? {
        TableFormat::Csv => CsvReader.read(file)?,
        TableFormat::Workbook => WorkbookReader.read(file)?,
    };

    if sheets.is_empty() {
        return Err(ConvertError::EmptyTable {
            sheet: file.filename.clone(),
        });
    }
    debug!(
        filename = %file.filename,
        sheets = sheets.len(),
        "Read uploaded table"
    );
    Ok(sheets)
}

// ── CSV ──────────────────────────────────────────────────────────────────

/// UTF-8 CSV with a header record; yields a single sheet.
pub struct CsvReader;

impl TableReader for CsvReader {
    fn read(&self, file: &UploadedFile) -> Result<Vec<Sheet>, ConvertError> {
        let bytes = file.bytes.as_ref();
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let unreadable = |reason: String| ConvertError::UnreadableFile {
            filename: file.filename.clone(),
            reason,
        };

        if std::str::from_utf8(bytes).is_err() {
            return Err(unreadable("CSV files must be UTF-8 encoded".into()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| unreadable(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| unreadable(e.to_string()))?;
            let cells: Vec<Cell> = record.iter().map(Cell::from_text).collect();
            if cells.iter().all(Cell::is_empty) {
                continue;
            }
            // Header is line 1.
            rows.push(Row {
                line: idx + 2,
                cells,
            });
        }

        Ok(vec![Sheet {
            name: CSV_SHEET_NAME.to_string(),
            headers,
            rows,
        }])
    }
}

// ── Workbooks ────────────────────────────────────────────────────────────

/// xlsx / xls / ods workbooks; every non-blank sheet, in workbook order.
pub struct WorkbookReader;

impl TableReader for WorkbookReader {
    fn read(&self, file: &UploadedFile) -> Result<Vec<Sheet>, ConvertError> {
        let unreadable = |reason: String| ConvertError::UnreadableFile {
            filename: file.filename.clone(),
            reason,
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(file.bytes.to_vec()))
            .map_err(|e| unreadable(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| unreadable(format!("sheet '{name}': {e}")))?;

            let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
            let mut iter = range.rows().enumerate();

            let Some((_, header_row)) = iter.next() else {
                debug!(sheet = %name, "Skipping blank sheet");
                continue;
            };
            let headers: Vec<String> = header_row.iter().map(header_text).collect();

            let rows = iter
                .filter_map(|(idx, cells)| {
                    let cells: Vec<Cell> = cells.iter().map(cell_from_data).collect();
                    if cells.iter().all(Cell::is_empty) {
                        None
                    } else {
                        Some(Row {
                            line: first_line + idx,
                            cells,
                        })
                    }
                })
                .collect();

            sheets.push(Sheet {
                name,
                headers,
                rows,
            });
        }

        Ok(sheets)
    }
}

fn header_text(data: &Data) -> String {
    match cell_from_data(data) {
        Cell::Empty => String::new(),
        Cell::Text(s) => s,
        Cell::Number(n) => crate::pipeline::format_number(n),
        Cell::Date(d) => d.to_string(),
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::String(s) => Cell::from_text(s),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_text(s),
        Data::DateTime(_) => match data.as_datetime() {
            Some(dt) => Cell::Date(dt),
            None => Cell::Empty,
        },
    }
}
