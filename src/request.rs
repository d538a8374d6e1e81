//! The conversion request model and the form schema shared by client and
//! server.
//!
//! A [`Submission`] is the untyped form exactly as collected: an optional
//! file plus a multi-map of text fields. [`Submission::validate`] turns it
//! into a typed [`ConversionRequest`], checking in a fixed order:
//!
//! 1. `file` present and non-empty
//! 2. kind-specific fields present and inside their enumerations
//!
//! Parseability of the file content is checked later by the pipeline.
//! Both the HTTP dispatcher and the client flow call the same `validate`, so
//! a form the client accepts is one the server accepts.

use crate::error::ConvertError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Multipart field carrying the uploaded table.
pub const FIELD_FILE: &str = "file";
/// Rate: reporting period of the output.
pub const FIELD_TIME_DOMAIN: &str = "time_domain";
/// Rate: repeated once per selected fluid.
pub const FIELD_FLUIDS: &str = "fluids_list";
/// Pressure: aggregation applied to samples sharing a well and date.
pub const FIELD_METHOD: &str = "method";

// ── Enumerations ─────────────────────────────────────────────────────────

/// Which pipeline and option schema apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    Rate,
    Pressure,
    Completion,
}

impl ConversionKind {
    pub const ALL: [ConversionKind; 3] = [
        ConversionKind::Rate,
        ConversionKind::Pressure,
        ConversionKind::Completion,
    ];

    /// Path segment under `/convert/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionKind::Rate => "rate",
            ConversionKind::Pressure => "pressure",
            ConversionKind::Completion => "completion",
        }
    }

    /// Request path of this kind's endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            ConversionKind::Rate => "/convert/rate",
            ConversionKind::Pressure => "/convert/pressure",
            ConversionKind::Completion => "/convert/completion",
        }
    }

    /// Filename suggested for this kind's artifact.
    pub fn default_filename(&self) -> &'static str {
        match self {
            ConversionKind::Rate => "converted_rate_data.vol",
            ConversionKind::Pressure => "converted_pressure_data.vol",
            ConversionKind::Completion => "converted_completion_data.ev",
        }
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rate" => Ok(ConversionKind::Rate),
            "pressure" => Ok(ConversionKind::Pressure),
            "completion" => Ok(ConversionKind::Completion),
            _ => Err(()),
        }
    }
}

/// Reporting period of rate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeDomain {
    Daily,
    Monthly,
}

impl TimeDomain {
    pub const ALL: [TimeDomain; 2] = [TimeDomain::Daily, TimeDomain::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeDomain::Daily => "DAILY",
            TimeDomain::Monthly => "MONTHLY",
        }
    }
}

/// A produced or injected fluid stream.
///
/// The declaration order is the canonical column order of rate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Fluid {
    Oil,
    Water,
    Gas,
    Winj,
}

impl Fluid {
    pub const ALL: [Fluid; 4] = [Fluid::Oil, Fluid::Water, Fluid::Gas, Fluid::Winj];

    /// Code used both in the form and as the required column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Fluid::Oil => "OIL",
            Fluid::Water => "WATER",
            Fluid::Gas => "GAS",
            Fluid::Winj => "WINJ",
        }
    }
}

/// How pressure samples sharing a well and date are reduced to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureMethod {
    Average,
    Max,
    Min,
}

impl PressureMethod {
    pub const ALL: [PressureMethod; 3] = [
        PressureMethod::Average,
        PressureMethod::Max,
        PressureMethod::Min,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PressureMethod::Average => "average",
            PressureMethod::Max => "max",
            PressureMethod::Min => "min",
        }
    }
}

macro_rules! impl_form_value {
    ($ty:ty, case_insensitive = $ci:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                <$ty>::ALL
                    .into_iter()
                    .find(|v| {
                        if $ci {
                            v.as_str().eq_ignore_ascii_case(s)
                        } else {
                            v.as_str() == s
                        }
                    })
                    .ok_or(())
            }
        }

        impl $ty {
            /// Comma-separated list of accepted form values.
            pub fn expected() -> String {
                <$ty>::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
    };
}

impl_form_value!(TimeDomain, case_insensitive = false);
impl_form_value!(Fluid, case_insensitive = true);
impl_form_value!(PressureMethod, case_insensitive = false);

// ── Typed request ────────────────────────────────────────────────────────

/// An uploaded file: its original name and raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file, keeping only its file name.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(filename, bytes))
    }
}

/// Kind-specific options of a validated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConversionOptions {
    Rate {
        time_domain: TimeDomain,
        fluids: BTreeSet<Fluid>,
    },
    Pressure {
        method: PressureMethod,
    },
    Completion,
}

impl ConversionOptions {
    pub fn kind(&self) -> ConversionKind {
        match self {
            ConversionOptions::Rate { .. } => ConversionKind::Rate,
            ConversionOptions::Pressure { .. } => ConversionKind::Pressure,
            ConversionOptions::Completion => ConversionKind::Completion,
        }
    }

    /// Text fields as they travel in a multipart body, in order.
    ///
    /// `fluids_list` is repeated once per fluid.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ConversionOptions::Rate {
                time_domain,
                fluids,
            } => std::iter::once((FIELD_TIME_DOMAIN, time_domain.to_string()))
                .chain(fluids.iter().map(|f| (FIELD_FLUIDS, f.to_string())))
                .collect(),
            ConversionOptions::Pressure { method } => vec![(FIELD_METHOD, method.to_string())],
            ConversionOptions::Completion => Vec::new(),
        }
    }
}

/// A validated conversion request: a non-empty file plus typed options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub file: UploadedFile,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn kind(&self) -> ConversionKind {
        self.options.kind()
    }
}

// ── Untyped form ─────────────────────────────────────────────────────────

/// A form as collected from a user or a multipart body, before validation.
///
/// Field values are kept as a multi-map so repeated fields (`fluids_list`)
/// survive. Validation borrows the submission, so a rejected form keeps its
/// file and selections for the next attempt.
#[derive(Debug, Clone)]
pub struct Submission {
    pub kind: ConversionKind,
    pub file: Option<UploadedFile>,
    fields: BTreeMap<String, Vec<String>>,
}

impl Submission {
    pub fn new(kind: ConversionKind) -> Self {
        Self {
            kind,
            file: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Append a value to a (possibly repeated) text field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name, value);
        self
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// All values supplied for a field, in arrival order.
    pub fn field_values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Validate the form into a typed request.
    pub fn validate(&self) -> Result<ConversionRequest, ConvertError> {
        let file = match &self.file {
            None => {
                return Err(ConvertError::MissingField { field: FIELD_FILE });
            }
            Some(f) if f.bytes.is_empty() => return Err(ConvertError::EmptyFile),
            Some(f) => f.clone(),
        };

        let options = match self.kind {
            ConversionKind::Rate => ConversionOptions::Rate {
                time_domain: self.single_value(FIELD_TIME_DOMAIN)?,
                fluids: self.fluid_selection()?,
            },
            ConversionKind::Pressure => ConversionOptions::Pressure {
                method: self.single_value(FIELD_METHOD)?,
            },
            ConversionKind::Completion => ConversionOptions::Completion,
        };

        Ok(ConversionRequest { file, options })
    }

    /// Parse a required single-valued field.
    ///
    /// The last non-blank occurrence wins when a client repeats the field.
    fn single_value<T>(&self, field: &'static str) -> Result<T, ConvertError>
    where
        T: FromStr + FormValue,
    {
        let raw = self
            .field_values(field)
            .iter()
            .rev()
            .find(|v| !v.trim().is_empty())
            .ok_or(ConvertError::MissingField { field })?;

        raw.parse::<T>().map_err(|_| ConvertError::InvalidOption {
            field,
            value: raw.trim().to_string(),
            expected: T::expected_values(),
        })
    }

    /// Collect `fluids_list`, accepting both repeated fields and a single
    /// comma-separated value. Duplicates collapse.
    fn fluid_selection(&self) -> Result<BTreeSet<Fluid>, ConvertError> {
        let mut fluids = BTreeSet::new();
        for raw in self
            .field_values(FIELD_FLUIDS)
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            let fluid = raw.parse::<Fluid>().map_err(|_| ConvertError::InvalidOption {
                field: FIELD_FLUIDS,
                value: raw.to_string(),
                expected: Fluid::expected(),
            })?;
            fluids.insert(fluid);
        }

        if fluids.is_empty() {
            return Err(ConvertError::EmptySelection {
                field: FIELD_FLUIDS,
                expected: Fluid::expected(),
            });
        }
        Ok(fluids)
    }
}

impl From<&ConversionRequest> for Submission {
    fn from(req: &ConversionRequest) -> Self {
        let mut submission = Submission::new(req.kind()).with_file(req.file.clone());
        for (name, value) in req.options.form_fields() {
            submission.push_field(name, value);
        }
        submission
    }
}

/// Bridges the generic parser in [`Submission::single_value`] to each
/// enumeration's list of accepted values.
trait FormValue {
    fn expected_values() -> String;
}

impl FormValue for TimeDomain {
    fn expected_values() -> String {
        TimeDomain::expected()
    }
}

impl FormValue for PressureMethod {
    fn expected_values() -> String {
        PressureMethod::expected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_file() -> UploadedFile {
        UploadedFile::new("rates.csv", "UWI,DATE,OIL\nW1,2020-01-01,10\n")
    }

    #[test]
    fn missing_file_is_checked_first() {
        // Even with every other field missing, the file is reported first.
        let err = Submission::new(ConversionKind::Rate).validate().unwrap_err();
        assert!(matches!(err, ConvertError::MissingField { field: "file" }));
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = Submission::new(ConversionKind::Completion)
            .with_file(UploadedFile::new("empty.csv", Vec::<u8>::new()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConvertError::EmptyFile));
    }

    #[test]
    fn rate_requires_time_domain_then_fluids() {
        let err = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_FLUIDS, "OIL")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("time_domain"));

        let err = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_TIME_DOMAIN, "DAILY")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConvertError::EmptySelection { field: "fluids_list", .. }));
    }

    #[test]
    fn rate_rejects_unknown_time_domain() {
        let err = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_TIME_DOMAIN, "WEEKLY")
            .with_field(FIELD_FLUIDS, "OIL")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("time_domain"));
        assert!(err.to_string().contains("WEEKLY"));
    }

    #[test]
    fn fluids_collapse_and_accept_comma_lists() {
        let req = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_TIME_DOMAIN, "MONTHLY")
            .with_field(FIELD_FLUIDS, "water")
            .with_field(FIELD_FLUIDS, "OIL, WATER")
            .validate()
            .unwrap();
        match req.options {
            ConversionOptions::Rate {
                time_domain,
                fluids,
            } => {
                assert_eq!(time_domain, TimeDomain::Monthly);
                assert_eq!(fluids.into_iter().collect::<Vec<_>>(), vec![Fluid::Oil, Fluid::Water]);
            }
            other => panic!("unexpected options: {other:?}"),
        }
    }

    #[test]
    fn unknown_fluid_is_invalid() {
        let err = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_TIME_DOMAIN, "DAILY")
            .with_field(FIELD_FLUIDS, "CO2")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidOption { field: "fluids_list", .. }));
    }

    #[test]
    fn pressure_method_is_case_sensitive() {
        let base = Submission::new(ConversionKind::Pressure).with_file(csv_file());

        let err = base.validate().unwrap_err();
        assert!(matches!(err, ConvertError::MissingField { field: "method" }));

        let err = base.clone().with_field(FIELD_METHOD, "MEDIAN").validate().unwrap_err();
        assert!(err.to_string().contains("method"));

        let req = base.with_field(FIELD_METHOD, " max ").validate().unwrap();
        assert_eq!(
            req.options,
            ConversionOptions::Pressure {
                method: PressureMethod::Max
            }
        );
    }

    #[test]
    fn completion_ignores_extra_fields() {
        let req = Submission::new(ConversionKind::Completion)
            .with_file(csv_file())
            .with_field("method", "average")
            .validate()
            .unwrap();
        assert_eq!(req.kind(), ConversionKind::Completion);
    }

    #[test]
    fn request_round_trips_through_submission() {
        let req = Submission::new(ConversionKind::Rate)
            .with_file(csv_file())
            .with_field(FIELD_TIME_DOMAIN, "DAILY")
            .with_field(FIELD_FLUIDS, "GAS")
            .with_field(FIELD_FLUIDS, "OIL")
            .validate()
            .unwrap();
        let again = Submission::from(&req).validate().unwrap();
        assert_eq!(req, again);
        assert_eq!(
            Submission::from(&req).field_values(FIELD_FLUIDS),
            &["OIL".to_string(), "GAS".to_string()]
        );
    }

    #[test]
    fn kind_paths_and_filenames() {
        assert_eq!(ConversionKind::Rate.path(), "/convert/rate");
        assert_eq!(
            ConversionKind::Completion.default_filename(),
            "converted_completion_data.ev"
        );
        assert_eq!("Pressure".parse::<ConversionKind>(), Ok(ConversionKind::Pressure));
    }
}
