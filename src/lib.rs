//! # reservoir-convert
//!
//! Convert rate, pressure and well-completion tables into the text formats
//! read by reservoir simulators (`.vol` volumes, `.ev` well events).
//!
//! ## Why this crate?
//!
//! Field data arrives as CSV exports and Excel workbooks with loosely named
//! columns. Simulators want rigid tab-separated keyword files with every
//! well's series complete. This crate owns that conversion end to end: the
//! HTTP dispatcher that accepts uploads, the pipelines that check, aggregate
//! and serialise, and the client flow that submits a file and saves what
//! comes back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! multipart upload
//!  │
//!  ├─ 1. Form      Submission::validate: file, then kind-specific fields
//!  ├─ 2. Input     CSV or workbook → sheets of cells
//!  ├─ 3. Columns   bind UWI / DATE / … by header name
//!  ├─ 4. Convert   rate gap fill │ pressure aggregation │ completion blocks
//!  └─ 5. Artifact  .vol / .ev text (zip for multi-sheet pressure)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reservoir_convert::{convert, ConversionKind, Submission, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = UploadedFile::from_path("rates.csv").await?;
//!     let request = Submission::new(ConversionKind::Rate)
//!         .with_file(file)
//!         .with_field("time_domain", "MONTHLY")
//!         .with_field("fluids_list", "OIL")
//!         .with_field("fluids_list", "WATER")
//!         .validate()?;
//!     let artifact = convert(&request).await?;
//!     std::fs::write(&artifact.filename, &artifact.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! reservoir-convert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ConversionResponse, FlowState, Outcome, SubmissionFlow};
pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder};
pub use convert::{convert, convert_blocking, convert_to_file, write_artifact};
pub use error::{ConvertError, ErrorBody, ErrorCategory, SubmitError};
pub use output::Artifact;
pub use progress::{NoopProgress, ProgressObserver, SubmissionProgress};
pub use request::{
    ConversionKind, ConversionOptions, ConversionRequest, Fluid, PressureMethod, Submission,
    TimeDomain, UploadedFile,
};
pub use server::{router, serve, serve_listener};
