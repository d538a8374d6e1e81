//! Request handlers for the conversion endpoints.

use crate::convert::convert;
use crate::error::{ConvertError, ErrorBody};
use crate::request::{ConversionKind, Submission, UploadedFile, FIELD_FILE};
use crate::server::AppState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

pub async fn convert_rate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    dispatch(ConversionKind::Rate, &state, multipart).await
}

pub async fn convert_pressure(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    dispatch(ConversionKind::Pressure, &state, multipart).await
}

pub async fn convert_completion(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    dispatch(ConversionKind::Completion, &state, multipart).await
}

/// Parse, validate, convert and shape the response for one request.
async fn dispatch(
    kind: ConversionKind,
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let submission = match multipart {
        Ok(multipart) => read_submission(kind, multipart, state.max_upload_bytes).await?,
        // A body that is not multipart at all carries no file; let
        // validation say so in the same words as an empty form.
        Err(rejection) => {
            debug!(kind = %kind, "Request is not multipart: {}", rejection.body_text());
            Submission::new(kind)
        }
    };

    let request = submission.validate()?;
    let artifact = convert(&request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.mime_type.clone()),
            (header::CONTENT_DISPOSITION, artifact.content_disposition()),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Collect every multipart field into a [`Submission`].
///
/// The first `file` part wins; text fields are appended in arrival order so
/// repeated `fluids_list` entries survive.
async fn read_submission(
    kind: ConversionKind,
    mut multipart: Multipart,
    limit_bytes: usize,
) -> Result<Submission, ConvertError> {
    let mut submission = Submission::new(kind);
    let map_err = |e: MultipartError| multipart_error(e, limit_bytes);

    while let Some(field) = multipart.next_field().await.map_err(map_err)? {
        let name = field.name().unwrap_or("").to_string();

        if name == FIELD_FILE {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "upload".to_string());
            let bytes = field.bytes().await.map_err(map_err)?;
            if submission.file.is_none() {
                debug!(kind = %kind, filename = %filename, bytes = bytes.len(), "Received upload");
                submission.file = Some(UploadedFile::new(filename, bytes));
            }
        } else if !name.is_empty() {
            let value = field.text().await.map_err(map_err)?;
            submission.push_field(name, value);
        }
    }

    Ok(submission)
}

fn multipart_error(e: MultipartError, limit_bytes: usize) -> ConvertError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ConvertError::PayloadTooLarge { limit_bytes }
    } else {
        ConvertError::MalformedMultipart(e.body_text())
    }
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: format!("No conversion endpoint at '{}'", uri.path()),
        }),
    )
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            detail: format!("Method {method} is not allowed on '{}'", uri.path()),
        }),
    )
}
