//! Completion records → `.ev` well events.

use crate::error::ConvertError;
use crate::pipeline::format_number;
use crate::pipeline::table::Sheet;
use chrono::NaiveDate;
use tracing::debug;

/// Trailing fields of a perforation event: diameter, skin and two zeros.
const PERFORATION_EXTRA: &str = "0.625\t0\t0\t0";
/// Trailing fields of every other event.
const EMPTY_EXTRA: &str = "\t\t\t";

struct Event {
    uwi: String,
    completion: String,
    date: NaiveDate,
    top: f64,
    bottom: f64,
}

impl Event {
    fn extra(&self) -> &'static str {
        if self.completion.trim().eq_ignore_ascii_case("perforation") {
            PERFORATION_EXTRA
        } else {
            EMPTY_EXTRA
        }
    }
}

/// Convert the first sheet of a completion table.
pub fn convert(sheets: &[Sheet]) -> Result<String, ConvertError> {
    let sheet = sheets
        .first()
        .ok_or_else(|| ConvertError::Internal("completion pipeline received no sheets".into()))?;
    let bound = sheet.bind_columns(&["UWI", "DATE", "COMPLETION", "TOP", "BOTTOM"], None)?;

    let mut events = bound
        .rows()
        .iter()
        .map(|row| -> Result<Event, ConvertError> {
            Ok(Event {
                uwi: bound.text(row, "UWI"),
                completion: bound.text(row, "COMPLETION"),
                date: bound.date(row, "DATE")?,
                top: bound.number(row, "TOP")?,
                bottom: bound.number(row, "BOTTOM")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    events.sort_by(|a, b| {
        a.uwi
            .cmp(&b.uwi)
            .then_with(|| a.completion.cmp(&b.completion))
            .then(a.date.cmp(&b.date))
    });

    let mut out = String::from("UNITS FIELD\n\n");
    let mut previous: Option<&Event> = None;
    let mut wells = 0usize;

    for event in &events {
        match previous {
            None => {
                out.push_str(&format!("WELLNAME\t{}\n", event.uwi));
                wells += 1;
            }
            Some(prev) if prev.uwi != event.uwi => {
                out.push_str(&format!("\nWELLNAME\t{}\n", event.uwi));
                wells += 1;
            }
            Some(prev) if prev.completion != event.completion => out.push('\n'),
            Some(_) => {}
        }

        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            event.date.format("%d/%m/%Y"),
            event.completion,
            format_number(event.top),
            format_number(event.bottom),
            event.extra()
        ));
        previous = Some(event);
    }

    debug!(wells, events = events.len(), "Wrote completion events");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::read_sheets;
    use crate::request::UploadedFile;

    fn sheets(csv: &str) -> Vec<Sheet> {
        read_sheets(&UploadedFile::new("completions.csv", csv.to_string())).unwrap()
    }

    #[test]
    fn writes_wells_and_completion_blocks() {
        let csv = "UWI,DATE,COMPLETION,TOP,BOTTOM\n\
                   W2,2019-05-01,Perforation,2000,2010.5\n\
                   W1,2018-03-15,squeeze,1500,1510\n\
                   W1,2018-01-02,perforation,1500,1510\n\
                   W1,2018-06-30,perforation,1520,1530\n";
        let out = convert(&sheets(csv)).unwrap();
        assert_eq!(
            out,
            "UNITS FIELD\n\n\
             WELLNAME\tW1\n\
             02/01/2018\tperforation\t1500\t1510\t0.625\t0\t0\t0\n\
             30/06/2018\tperforation\t1520\t1530\t0.625\t0\t0\t0\n\
             \n\
             15/03/2018\tsqueeze\t1500\t1510\t\t\t\t\n\
             \n\
             WELLNAME\tW2\n\
             01/05/2019\tPerforation\t2000\t2010.5\t0.625\t0\t0\t0\n"
        );
    }

    #[test]
    fn requires_depth_columns() {
        let csv = "UWI,DATE,COMPLETION\nW1,2018-01-02,perforation\n";
        let err = convert(&sheets(csv)).unwrap_err();
        assert_eq!(err.to_string(), "Please provide TOP, BOTTOM columns!");
    }

    #[test]
    fn non_numeric_depth_is_rejected() {
        let csv = "UWI,DATE,COMPLETION,TOP,BOTTOM\nW1,2018-01-02,perforation,deep,1510\n";
        let err = convert(&sheets(csv)).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidCell { ref column, .. } if column == "TOP"));
    }
}
