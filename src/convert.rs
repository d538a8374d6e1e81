//! Conversion entry points shared by the HTTP dispatcher, the client's
//! offline mode and library users.
//!
//! ## Why a blocking core with an async wrapper?
//!
//! Every pipeline is pure CPU work over an in-memory table: no I/O, no
//! awaiting. [`convert_blocking`] is that core. [`convert`] moves it onto
//! tokio's blocking pool so a large workbook never stalls the reactor that
//! is serving other uploads, and turns a panicking worker into a
//! [`ConvertError::Internal`] instead of tearing down the connection.

use crate::error::ConvertError;
use crate::output::Artifact;
use crate::pipeline::{completion, input, pressure, rate};
use crate::request::{ConversionOptions, ConversionRequest};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Filename of the multi-sheet pressure archive.
pub const PRESSURE_ARCHIVE_FILENAME: &str = "converted_pressure_data.zip";

/// Run the pipeline for `request` on the blocking pool.
///
/// The artifact is fully built before this returns; callers never see a
/// partial result.
pub async fn convert(request: &ConversionRequest) -> Result<Artifact, ConvertError> {
    let request = request.clone();
    let kind = request.kind();

    tokio::task::spawn_blocking(move || convert_blocking(&request))
        .await
        .map_err(|e| ConvertError::Internal(format!("{kind} conversion task failed: {e}")))?
}

/// Run the pipeline for `request` on the current thread.
pub fn convert_blocking(request: &ConversionRequest) -> Result<Artifact, ConvertError> {
    let start = Instant::now();
    let kind = request.kind();
    info!(
        kind = %kind,
        filename = %request.file.filename,
        bytes = request.file.bytes.len(),
        "Starting conversion"
    );

    // ── Step 1: Read the table ───────────────────────────────────────────
    let sheets = input::read_sheets(&request.file)?;

    // ── Step 2: Check, aggregate and serialise ───────────────────────────
    let artifact = match &request.options {
        ConversionOptions::Rate {
            time_domain,
            fluids,
        } => {
            let body = rate::convert(&sheets, *time_domain, fluids)?;
            Artifact::text(kind.default_filename(), body)
        }
        ConversionOptions::Pressure { method } => {
            let mut tables = pressure::convert(&sheets, *method)?;
            if tables.len() == 1 {
                let table = tables.remove(0);
                Artifact::text(kind.default_filename(), table.body)
            } else {
                debug!(sheets = tables.len(), "Packing pressure tables into archive");
                Artifact::zip(PRESSURE_ARCHIVE_FILENAME, pressure::archive(&tables)?)
            }
        }
        ConversionOptions::Completion => {
            let body = completion::convert(&sheets)?;
            Artifact::text(kind.default_filename(), body)
        }
    };

    info!(
        kind = %kind,
        artifact = %artifact.filename,
        bytes = artifact.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Conversion complete"
    );
    Ok(artifact)
}

/// Convert and write the artifact to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    request: &ConversionRequest,
    output_path: impl AsRef<Path>,
) -> Result<Artifact, ConvertError> {
    let artifact = convert(request).await?;
    write_artifact(&artifact, output_path.as_ref()).await?;
    Ok(artifact)
}

/// Write an artifact to `path`, creating parent directories as needed.
///
/// The bytes go to `<path>.tmp` first and are renamed into place, so a
/// reader never observes a half-written file.
pub async fn write_artifact(artifact: &Artifact, path: &Path) -> Result<(), ConvertError> {
    write_atomic(path, &artifact.bytes).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let failed = |e: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    Ok(())
}
