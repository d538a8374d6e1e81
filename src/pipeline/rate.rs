//! Rate tables → `.vol` production/injection volumes.
//!
//! Every well gets a contiguous series from its first to its last period.
//! Periods with no record are written as zero for every fluid; a period
//! with two records is rejected instead of merged, because whether rates
//! should be summed or averaged depends on how the export was produced.

use crate::error::ConvertError;
use crate::pipeline::format_number;
use crate::pipeline::table::Sheet;
use crate::request::{Fluid, TimeDomain};
use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeSet;
use tracing::debug;

/// Most rows one rate table may hold, summed over every well.
///
/// A century of daily data for a well is about 36 500 rows.
pub const MAX_OUTPUT_ROWS: usize = 1_000_000;

struct RateRecord {
    uwi: String,
    date: NaiveDate,
    values: Vec<f64>,
}

/// Convert the first sheet of a rate table.
pub fn convert(
    sheets: &[Sheet],
    time_domain: TimeDomain,
    fluids: &BTreeSet<Fluid>,
) -> Result<String, ConvertError> {
    let sheet = sheets
        .first()
        .ok_or_else(|| ConvertError::Internal("rate pipeline received no sheets".into()))?;

    let fluid_names: Vec<&str> = fluids.iter().map(Fluid::as_str).collect();
    let required: Vec<&str> = ["UWI", "DATE"]
        .into_iter()
        .chain(fluid_names.iter().copied())
        .collect();
    let bound = sheet.bind_columns(&required, None)?;

    let mut records = bound
        .rows()
        .iter()
        .map(|row| -> Result<RateRecord, ConvertError> {
            let values = fluid_names
                .iter()
                .map(|f| bound.number(row, f))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RateRecord {
                uwi: bound.text(row, "UWI"),
                date: period_start(bound.date(row, "DATE")?, time_domain),
                values,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    records.sort_by(|a, b| a.uwi.cmp(&b.uwi).then(a.date.cmp(&b.date)));
    let planned = check_output_size(&records, time_domain)?;

    let mut out = String::with_capacity(planned.saturating_mul(16));
    out.push_str("*FIELD\n");
    out.push_str(&format!("*{}\n", time_domain.as_str()));
    out.push_str("*IGNORE_MISSING\n");
    out.push_str("*UPTIME_FRACTIONS\n");
    out.push_str("*UUCRATES\n");
    out.push_str("*MISSING_VALUE -9999\n");
    out.push_str("*DAY\t*MONTH\t*YEAR\t");
    for name in &fluid_names {
        out.push_str(&format!("*{name}\t"));
    }
    out.push('\n');

    let zeros = vec![0.0; fluid_names.len()];
    let mut wells = 0usize;
    let mut lines = 0usize;

    for well in records.chunk_by(|a, b| a.uwi == b.uwi) {
        let uwi = &well[0].uwi;
        if wells > 0 {
            out.push('\n');
        }
        out.push_str(&format!("*NAME\t{uwi}\n"));
        wells += 1;

        let mut expected = well[0].date;
        for (i, record) in well.iter().enumerate() {
            if i > 0 && record.date == well[i - 1].date {
                return Err(ConvertError::DuplicateRecord {
                    uwi: uwi.clone(),
                    period: describe_period(record.date, time_domain),
                });
            }
            while expected < record.date {
                write_row(&mut out, expected, &zeros);
                lines += 1;
                expected = next_period(expected, time_domain)?;
            }
            write_row(&mut out, record.date, &record.values);
            lines += 1;
            expected = next_period(record.date, time_domain)?;
        }
    }

    debug!(wells, lines, time_domain = %time_domain, "Wrote rate table");
    Ok(out)
}

/// Count the rows gap filling will write, failing before any are built.
fn check_output_size(
    records: &[RateRecord],
    time_domain: TimeDomain,
) -> Result<usize, ConvertError> {
    let mut total = 0usize;
    for well in records.chunk_by(|a, b| a.uwi == b.uwi) {
        let first = well[0].date;
        let last = well[well.len() - 1].date;
        let rows = periods_between(first, last, time_domain);
        total = total.saturating_add(rows);
        if total > MAX_OUTPUT_ROWS {
            return Err(ConvertError::OutputTooLarge {
                uwi: well[0].uwi.clone(),
                first: describe_period(first, time_domain),
                last: describe_period(last, time_domain),
                rows,
                limit: MAX_OUTPUT_ROWS,
            });
        }
    }
    Ok(total)
}

/// Number of periods from `first` to `last`, both included.
fn periods_between(first: NaiveDate, last: NaiveDate, time_domain: TimeDomain) -> usize {
    let steps = match time_domain {
        TimeDomain::Daily => (last - first).num_days(),
        TimeDomain::Monthly => {
            (i64::from(last.year()) - i64::from(first.year())) * 12
                + (i64::from(last.month()) - i64::from(first.month()))
        }
    };
    usize::try_from(steps).unwrap_or(0).saturating_add(1)
}

fn write_row(out: &mut String, date: NaiveDate, values: &[f64]) {
    out.push_str(&format!("{}\t{}\t{}\t", date.day(), date.month(), date.year()));
    for v in values {
        out.push_str(&format_number(*v));
        out.push('\t');
    }
    out.push('\n');
}

fn period_start(date: NaiveDate, time_domain: TimeDomain) -> NaiveDate {
    match time_domain {
        TimeDomain::Daily => date,
        TimeDomain::Monthly => date.with_day(1).unwrap_or(date),
    }
}

fn next_period(date: NaiveDate, time_domain: TimeDomain) -> Result<NaiveDate, ConvertError> {
    let next = match time_domain {
        TimeDomain::Daily => date.succ_opt(),
        TimeDomain::Monthly => date.checked_add_months(Months::new(1)),
    };
    next.ok_or_else(|| ConvertError::Internal(format!("date overflow after {date}")))
}

fn describe_period(date: NaiveDate, time_domain: TimeDomain) -> String {
    match time_domain {
        TimeDomain::Daily => date.format("%Y-%m-%d").to_string(),
        TimeDomain::Monthly => date.format("%Y-%m").to_string(),
    }
}
