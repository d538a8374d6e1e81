//! Pressure samples → one `.vol` per sheet.
//!
//! Samples are grouped by well and calendar day and reduced with the
//! requested [`PressureMethod`]. A workbook with several sheets (one per
//! field or survey, typically) produces one table per sheet, which the
//! dispatcher packs into a zip archive with [`archive`].

use crate::error::ConvertError;
use crate::pipeline::format_number;
use crate::pipeline::table::Sheet;
use crate::request::PressureMethod;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One converted sheet: its name and `.vol` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub sheet: String,
    pub body: String,
}

impl SheetTable {
    /// Entry name inside the multi-sheet archive.
    pub fn entry_name(&self) -> String {
        format!("Pressure {}.vol", self.sheet)
    }
}

#[derive(Debug, Clone, Copy)]
struct Samples {
    /// Source line of the last sample, for error reporting.
    line: usize,
    sum: f64,
    count: usize,
    max: f64,
    min: f64,
}

impl Samples {
    fn new(line: usize, value: f64) -> Self {
        Self {
            line,
            sum: value,
            count: 1,
            max: value,
            min: value,
        }
    }

    fn push(&mut self, line: usize, value: f64) {
        self.line = line;
        self.sum += value;
        self.count += 1;
        self.max = self.max.max(value);
        self.min = self.min.min(value);
    }

    fn reduce(&self, method: PressureMethod) -> f64 {
        match method {
            PressureMethod::Average => self.sum / self.count as f64,
            PressureMethod::Max => self.max,
            PressureMethod::Min => self.min,
        }
    }
}

/// Convert every sheet, in workbook order.
pub fn convert(sheets: &[Sheet], method: PressureMethod) -> Result<Vec<SheetTable>, ConvertError> {
    // Only multi-sheet workbooks name the sheet in column errors.
    let labelled = sheets.len() > 1;

    sheets
        .iter()
        .map(|sheet| -> Result<SheetTable, ConvertError> {
            let label = labelled.then_some(sheet.name.as_str());
            Ok(SheetTable {
                sheet: sheet.name.clone(),
                body: convert_sheet(sheet, label, method)?,
            })
        })
        .collect()
}

fn convert_sheet(
    sheet: &Sheet,
    label: Option<&str>,
    method: PressureMethod,
) -> Result<String, ConvertError> {
    let bound = sheet.bind_columns(&["UWI", "DATE", "PRESS"], label)?;

    let mut groups: BTreeMap<(String, NaiveDate), Samples> = BTreeMap::new();
    for row in bound.rows() {
        let key = (bound.text(row, "UWI"), bound.date(row, "DATE")?);
        let press = bound.number(row, "PRESS")?;
        groups
            .entry(key)
            .and_modify(|s| s.push(row.line, press))
            .or_insert_with(|| Samples::new(row.line, press));
    }

    let mut out = String::from("*FIELD\n*DAY\t*MONTH\t*YEAR\t*PRESS\t\n");
    let mut current: Option<&str> = None;
    let mut wells = 0usize;

    for ((uwi, date), samples) in &groups {
        if current != Some(uwi.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("*NAME\t{uwi}\n"));
            current = Some(uwi.as_str());
            wells += 1;
        }
        let value = samples.reduce(method);
        if !value.is_finite() {
            return Err(ConvertError::InvalidCell {
                sheet: sheet.name.clone(),
                row: samples.line,
                column: "PRESS".to_string(),
                value: format!("{method} of {} samples", samples.count),
                reason: "aggregated value is out of range",
            });
        }
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            date.day(),
            date.month(),
            date.year(),
            format_number(value)
        ));
    }

    debug!(
        sheet = %sheet.name,
        wells,
        samples = bound.rows().len(),
        days = groups.len(),
        method = %method,
        "Wrote pressure table"
    );
    Ok(out)
}

/// Pack per-sheet tables into a zip archive.
///
/// Entries carry a fixed timestamp so identical uploads produce identical
/// archives.
pub fn archive(tables: &[SheetTable]) -> Result<Vec<u8>, ConvertError> {
    let zip_err = |e: zip::result::ZipError| ConvertError::Internal(format!("zip: {e}"));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for table in tables {
        writer
            .start_file(table.entry_name(), options)
            .map_err(zip_err)?;
        writer
            .write_all(table.body.as_bytes())
            .map_err(|e| ConvertError::Internal(format!("zip: {e}")))?;
    }
    let cursor = writer.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}
