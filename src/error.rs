//! Error types for the reservoir-convert library.
//!
//! Two distinct error types reflect two distinct sides of the exchange:
//!
//! * [`ConvertError`]: raised while validating a submission or running a
//!   conversion pipeline. Every variant maps to an HTTP status and a
//!   user-facing `detail` string, and the type implements axum's
//!   [`IntoResponse`] so handlers can simply `?` it.
//!
//! * [`SubmitError`]: raised by the client submission flow. It wraps local
//!   validation failures, server-reported failures and transport faults so
//!   the caller always has one message to show.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Generic message returned for unexpected server-side faults.
pub const INTERNAL_DETAIL: &str = "Conversion failed due to an internal error.";

/// Where a failure came from, independent of its exact wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A required file or form field was absent (or the file was empty).
    InputMissing,
    /// A value, file or table failed a constraint.
    InputInvalid,
    /// An unexpected internal failure not attributable to the input.
    PipelineFault,
}

/// All errors raised while validating or converting a submission.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Form errors ───────────────────────────────────────────────────────
    /// A required multipart field was not supplied.
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The `file` field was present but carried no bytes.
    #[error("Uploaded field 'file' is empty")]
    EmptyFile,

    /// A field value is outside its enumerated set.
    #[error("Invalid value '{value}' for '{field}': expected one of {expected}")]
    InvalidOption {
        field: &'static str,
        value: String,
        expected: String,
    },

    /// A multi-valued field was supplied without any value.
    #[error("Field '{field}' must select at least one of {expected}")]
    EmptySelection {
        field: &'static str,
        expected: String,
    },

    /// The multipart body itself could not be parsed.
    #[error("Malformed multipart request: {0}")]
    MalformedMultipart(String),

    /// The request body exceeded the configured upload limit.
    #[error("Upload exceeds the maximum allowed size of {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    // ── File / table errors ───────────────────────────────────────────────
    /// The file is neither CSV nor a spreadsheet workbook.
    #[error("Unsupported file format. Please upload a CSV or Excel file.")]
    UnsupportedFormat { filename: String },

    /// The file looked like a supported format but could not be read.
    #[error("Could not read '{filename}': {reason}")]
    UnreadableFile { filename: String, reason: String },

    /// Required columns are absent from a sheet.
    #[error("Please provide {} columns{}!", columns.join(", "), sheet_suffix(sheet))]
    MissingColumns {
        columns: Vec<String>,
        sheet: Option<String>,
    },

    /// A sheet has a header but no data rows.
    #[error("Sheet '{sheet}' has no data rows")]
    EmptyTable { sheet: String },

    /// A cell could not be interpreted as the type its column requires.
    #[error("Invalid {column} value '{value}' in sheet '{sheet}', row {row}: {reason}")]
    InvalidCell {
        sheet: String,
        row: usize,
        column: String,
        value: String,
        reason: &'static str,
    },

    /// Two records for the same well fall into the same reporting period.
    #[error("Well '{uwi}' has more than one record for {period}; merge them before converting")]
    DuplicateRecord { uwi: String, period: String },

    /// Gap filling would produce more rows than one response may carry.
    #[error(
        "Rate output would exceed {limit} rows: well '{uwi}' spans {first} to {last} ({rows} periods)"
    )]
    OutputTooLarge {
        uwi: String,
        first: String,
        last: String,
        rows: usize,
        limit: usize,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Writing a converted artifact to disk failed.
    #[error("Failed to write output to '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Server errors ─────────────────────────────────────────────────────
    /// Binding or running the HTTP listener failed.
    #[error("Server error on {addr}: {source}")]
    Serve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error. The message is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn sheet_suffix(sheet: &Option<String>) -> String {
    match sheet {
        Some(name) => format!(" on {name}"),
        None => String::new(),
    }
}

impl ConvertError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConvertError::MissingField { .. } | ConvertError::EmptyFile => {
                ErrorCategory::InputMissing
            }
            ConvertError::Internal(_)
            | ConvertError::InvalidConfig(_)
            | ConvertError::OutputWriteFailed { .. }
            | ConvertError::Serve { .. } => ErrorCategory::PipelineFault,
            _ => ErrorCategory::InputInvalid,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::MissingField { .. }
            | ConvertError::EmptyFile
            | ConvertError::InvalidOption { .. }
            | ConvertError::EmptySelection { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ConvertError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ConvertError::MalformedMultipart(_)
            | ConvertError::UnsupportedFormat { .. }
            | ConvertError::UnreadableFile { .. }
            | ConvertError::MissingColumns { .. }
            | ConvertError::EmptyTable { .. }
            | ConvertError::InvalidCell { .. }
            | ConvertError::DuplicateRecord { .. }
            | ConvertError::OutputTooLarge { .. } => StatusCode::BAD_REQUEST,
            ConvertError::InvalidConfig(_)
            | ConvertError::OutputWriteFailed { .. }
            | ConvertError::Serve { .. }
            | ConvertError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-safe message placed in the `detail` field.
    ///
    /// Internal faults collapse to [`INTERNAL_DETAIL`]; everything else is the
    /// `Display` text, which always names the offending field or column.
    pub fn detail(&self) -> String {
        match self.category() {
            ErrorCategory::PipelineFault => INTERNAL_DETAIL.to_string(),
            _ => self.to_string(),
        }
    }
}

/// JSON body of every failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        match self.category() {
            ErrorCategory::PipelineFault => {
                tracing::error!("Conversion fault: {:#}", self);
            }
            ErrorCategory::InputInvalid => {
                tracing::info!("Rejected invalid input: {}", self);
            }
            ErrorCategory::InputMissing => {
                tracing::debug!("Rejected incomplete submission: {}", self);
            }
        }

        let body = ErrorBody {
            detail: self.detail(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Errors surfaced by [`crate::client::SubmissionFlow`].
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Another submission from the same flow is still in flight.
    #[error("A conversion is already in progress; wait for it to finish.")]
    Busy,

    /// The submission failed local validation; the server was not contacted.
    #[error("{0}")]
    Invalid(#[source] ConvertError),

    /// The server answered with a non-2xx status.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    /// The request never produced a usable response (network, timeout, abort).
    #[error("{detail}")]
    Transport { detail: String },

    /// The artifact arrived but could not be written locally.
    #[error("Failed to save artifact to '{}': {source}", path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SubmitError {
    /// Message to show the user for this failure.
    ///
    /// Local validation failures reuse the friendly prompts a form would
    /// show next to the field; everything else is the `Display` text.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Invalid(ConvertError::MissingField { field: "file" })
            | SubmitError::Invalid(ConvertError::EmptyFile) => {
                "Please upload a correct file!".to_string()
            }
            SubmitError::Invalid(ConvertError::MissingField {
                field: "time_domain",
            }) => "Please select the time domain!".to_string(),
            SubmitError::Invalid(ConvertError::EmptySelection {
                field: "fluids_list",
                ..
            })
            | SubmitError::Invalid(ConvertError::MissingField {
                field: "fluids_list",
            }) => "Please select the fluids!".to_string(),
            SubmitError::Invalid(ConvertError::MissingField { field: "method" }) => {
                "Please select the aggregation method!".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let e = ConvertError::MissingField { field: "method" };
        assert!(e.detail().contains("method"), "got: {}", e.detail());
        assert_eq!(e.category(), ErrorCategory::InputMissing);
        assert!(e.status_code().is_client_error());
    }

    #[test]
    fn missing_columns_display_with_and_without_sheet() {
        let e = ConvertError::MissingColumns {
            columns: vec!["UWI".into(), "PRESS".into()],
            sheet: None,
        };
        assert_eq!(e.to_string(), "Please provide UWI, PRESS columns!");

        let e = ConvertError::MissingColumns {
            columns: vec!["PRESS".into()],
            sheet: Some("Field A".into()),
        };
        assert_eq!(e.to_string(), "Please provide PRESS columns on Field A!");
    }

    #[test]
    fn internal_detail_does_not_leak() {
        let e = ConvertError::Internal("worker panicked at src/pipeline/rate.rs".into());
        assert_eq!(e.detail(), INTERNAL_DETAIL);
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.category(), ErrorCategory::PipelineFault);
    }

    #[test]
    fn invalid_option_is_client_error() {
        let e = ConvertError::InvalidOption {
            field: "time_domain",
            value: "WEEKLY".into(),
            expected: "DAILY, MONTHLY".into(),
        };
        assert_eq!(e.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(e.detail().contains("time_domain"));
        assert!(e.detail().contains("WEEKLY"));
    }

    #[test]
    fn submit_error_friendly_messages() {
        let e = SubmitError::Invalid(ConvertError::MissingField {
            field: "time_domain",
        });
        assert_eq!(e.user_message(), "Please select the time domain!");

        let e = SubmitError::Rejected {
            status: 400,
            detail: "Please provide OIL columns!".into(),
        };
        assert_eq!(e.user_message(), "Please provide OIL columns!");
    }
}
