//! Pipeline stages for table-to-simulator conversion.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage is independently testable and the three conversions share the
//! reading and column-checking code.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ table ──▶ rate | pressure | completion
//! (bytes)   (columns)  (aggregate + serialise)
//! ```
//!
//! 1. [`input`]: detect CSV vs. workbook and read every sheet into cells
//! 2. [`table`]: bind required columns by header name and decode typed
//!    values (well id, date, numbers)
//! 3. [`rate`]: fill per-well period gaps and write the `.vol` rate table
//! 4. [`pressure`]: aggregate samples per well and day and write one `.vol`
//!    per sheet
//! 5. [`completion`]: group events per well and completion and write `.ev`
//!
//! Stages are synchronous and CPU-bound; the dispatcher runs them on
//! `spawn_blocking`.

pub mod completion;
pub mod input;
pub mod pressure;
pub mod rate;
pub mod table;

/// Format a value in shortest round-trip form (`100`, `12.5`).
pub(crate) fn format_number(value: f64) -> String {
    // Avoid printing "-0".
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}
