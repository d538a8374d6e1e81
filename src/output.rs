//! Conversion outputs.

use bytes::Bytes;
use serde::Serialize;

/// MIME type of `.vol` and `.ev` text artifacts.
pub const TEXT_MIME: &str = "text/plain; charset=utf-8";
/// MIME type of multi-sheet pressure archives.
pub const ZIP_MIME: &str = "application/zip";

/// The binary file handed back for a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Raw artifact content.
    #[serde(skip)]
    pub bytes: Bytes,
    /// Name the caller should save the artifact under.
    pub filename: String,
    /// Content type sent with the artifact.
    pub mime_type: String,
}

impl Artifact {
    pub fn text(filename: impl Into<String>, body: String) -> Self {
        Self {
            bytes: Bytes::from(body),
            filename: filename.into(),
            mime_type: TEXT_MIME.to_string(),
        }
    }

    pub fn zip(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            filename: filename.into(),
            mime_type: ZIP_MIME.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `Content-Disposition` header value for this artifact.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename.replace('"', ""))
    }
}
