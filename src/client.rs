//! Client submission flow: validate, submit, await, save.
//!
//! One [`SubmissionFlow`] serves all three conversions; the kind and its
//! option schema travel inside the [`Submission`]. A flow is either idle or
//! submitting:
//!
//! ```text
//!            validate ok              response + save
//!   Idle ──────────────────▶ Submitting ─────────────────▶ Idle
//!    ▲  │ validate fails                  │ failure
//!    │  └─▶ (message, no request)         └─▶ (message) ───┘
//! ```
//!
//! A second `submit` while one is in flight is refused with
//! [`SubmitError::Busy`]. The submission is only borrowed, so after a
//! failure the caller still holds the file and options for another try.
//! Nothing is retried automatically.

use crate::config::ClientConfig;
use crate::error::{ConvertError, SubmitError};
use crate::progress::{NoopProgress, ProgressObserver};
use crate::request::{ConversionRequest, Submission, FIELD_FILE};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shown when a failure carries no usable explanation.
pub const TRANSPORT_FALLBACK: &str = "Error occurred during conversion.";
/// Shown when the server answered with JSON lacking a `detail`.
pub const DETAIL_FALLBACK: &str = "Conversion failed";

static RE_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#).unwrap()
});

/// What came back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResponse {
    /// 2xx: the artifact, byte for byte.
    Success {
        bytes: Bytes,
        filename: String,
        mime_type: String,
    },
    /// Anything else. `status` is `None` when no response arrived at all.
    Failure { status: Option<u16>, detail: String },
}

/// Whether a flow has a request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Submitting,
}

/// How the last completed cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(PathBuf),
    Failed(String),
}

/// Submits conversions to one server, one at a time.
pub struct SubmissionFlow {
    config: ClientConfig,
    http: reqwest::Client,
    progress: ProgressObserver,
    in_flight: AtomicBool,
    last_outcome: Mutex<Option<Outcome>>,
}

/// Clears the in-flight flag however the submission ends, cancellation
/// included.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionFlow {
    pub fn new(config: ClientConfig) -> Result<Self, ConvertError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        let progress = config
            .progress
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgress));

        Ok(Self {
            config,
            http,
            progress,
            in_flight: AtomicBool::new(false),
            last_outcome: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        if self.in_flight.load(Ordering::Acquire) {
            FlowState::Submitting
        } else {
            FlowState::Idle
        }
    }

    /// Outcome of the most recent completed cycle, if any.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome.lock().ok().and_then(|o| o.clone())
    }

    /// Validate, submit and save one conversion.
    ///
    /// Returns the path the artifact was saved to. Local validation failures
    /// return [`SubmitError::Invalid`] without contacting the server.
    pub async fn submit(&self, submission: &Submission) -> Result<PathBuf, SubmitError> {
        let kind = submission.kind;

        let request = match submission.validate() {
            Ok(request) => request,
            Err(e) => {
                let err = SubmitError::Invalid(e);
                debug!(kind = %kind, "Submission rejected locally: {}", err);
                self.record(Outcome::Failed(err.user_message()));
                return Err(err);
            }
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmitError::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        self.progress.on_submit_start(kind, &request.file.filename);
        let result = self.run(&request).await;

        match &result {
            Ok(path) => self.record(Outcome::Succeeded(path.clone())),
            Err(e) => {
                let message = e.user_message();
                warn!(kind = %kind, "Conversion failed: {}", message);
                self.progress.on_failed(kind, &message);
                self.record(Outcome::Failed(message));
            }
        }
        self.progress.on_submit_finish(kind);
        result
    }

    async fn run(&self, request: &ConversionRequest) -> Result<PathBuf, SubmitError> {
        let kind = request.kind();
        match self.send(request).await {
            ConversionResponse::Success {
                bytes, filename, ..
            } => {
                let path = self.save(&filename, bytes.clone()).await?;
                info!(kind = %kind, path = %path.display(), bytes = bytes.len(), "Saved artifact");
                self.progress.on_saved(kind, &path, bytes.len());
                Ok(path)
            }
            ConversionResponse::Failure {
                status: Some(status),
                detail,
            } => Err(SubmitError::Rejected { status, detail }),
            ConversionResponse::Failure {
                status: None,
                detail,
            } => Err(SubmitError::Transport { detail }),
        }
    }

    /// POST one validated request and classify the reply.
    ///
    /// Never fails: transport problems become a `Failure` with no status.
    pub async fn send(&self, request: &ConversionRequest) -> ConversionResponse {
        let kind = request.kind();
        let url = self.config.endpoint(kind.path());

        let file = Part::bytes(request.file.bytes.to_vec()).file_name(request.file.filename.clone());
        let form = request
            .options
            .form_fields()
            .into_iter()
            .fold(Form::new().part(FIELD_FILE, file), |form, (name, value)| {
                form.text(name, value)
            });

        debug!(kind = %kind, url = %url, "Submitting conversion");
        let response = match self.http.post(&url).multipart(form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(kind = %kind, url = %url, "Request failed: {}", e);
                return transport_failure();
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(kind = %kind, "Reading response body failed: {}", e);
                return transport_failure();
            }
        };

        if !status.is_success() {
            return ConversionResponse::Failure {
                status: Some(status.as_u16()),
                detail: failure_detail(&body),
            };
        }

        self.progress.on_response(kind, status.as_u16());
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| kind.default_filename().to_string());
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        ConversionResponse::Success {
            bytes: body,
            filename,
            mime_type,
        }
    }

    /// Write `bytes` into the output directory via temp file + rename.
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<PathBuf, SubmitError> {
        let dir = self.config.output_dir.clone();
        let path = dir.join(filename);
        let target = path.clone();

        let written = tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r);

        written.map_err(|source| SubmitError::SaveFailed {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn record(&self, outcome: Outcome) {
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(outcome);
        }
    }
}

impl std::fmt::Debug for SubmissionFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionFlow")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn transport_failure() -> ConversionResponse {
    ConversionResponse::Failure {
        status: None,
        detail: TRANSPORT_FALLBACK.to_string(),
    }
}

/// Extract the user-facing message from a failure body.
fn failure_detail(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(serde_json::Value::Null) | None => DETAIL_FALLBACK.to_string(),
            Some(serde_json::Value::String(_)) => DETAIL_FALLBACK.to_string(),
            Some(other) => other.to_string(),
        },
        _ => TRANSPORT_FALLBACK.to_string(),
    }
}

/// Pull a bare file name out of a `Content-Disposition` value.
///
/// Directory components are stripped so a server cannot steer the save
/// outside the output directory.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = RE_FILENAME.captures(value)?.get(1)?.as_str().trim();
    let base = raw.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
