//! Configuration for the conversion server and the submission client.
//!
//! Both sides are configured through plain structs built via a builder.
//! Setters clamp values into their sane range; `build()` rejects the
//! combinations that cannot work at all (an unparseable base URL, a zero
//! upload limit) with [`ConvertError::InvalidConfig`].
//!
//! # Design choice: explicit base URL
//! The client never discovers its server from ambient globals. The base URL
//! is a field of [`ClientConfig`], so tests point a flow at a mock server and
//! the CLI points it at whatever `--base-url` says.

use crate::error::ConvertError;
use crate::progress::SubmissionProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload limit: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default base URL the client submits to.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
/// Default client request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ── Server ───────────────────────────────────────────────────────────────

/// Configuration for the HTTP conversion dispatcher.
///
/// # Example
/// ```rust
/// use reservoir_convert::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .port(9000)
///     .max_upload_mb(50)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address of the interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// TCP port. Default: 8080.
    pub port: u16,

    /// Largest accepted request body in bytes. Default: 25 MiB.
    ///
    /// Multipart framing is counted too, so the largest accepted file is a
    /// few hundred bytes smaller than this.
    pub max_upload_bytes: usize,

    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConvertError> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        format!("{host}:{}", self.port)
            .parse::<SocketAddr>()
            .or_else(|_| format!("[{host}]:{}", self.port).parse::<SocketAddr>())
            .map_err(|_| {
                ConvertError::InvalidConfig(format!(
                    "cannot bind to host '{}' port {}",
                    self.host, self.port
                ))
            })
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Upload limit in MiB, clamped to 1–1024.
    pub fn max_upload_mb(mut self, mb: usize) -> Self {
        self.config.max_upload_bytes = mb.clamp(1, 1024) * 1024 * 1024;
        self
    }

    pub fn cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.cors_allowed_origins.push(origin.into());
        self
    }

    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .cors_allowed_origins
            .extend(origins.into_iter().map(Into::into));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, ConvertError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        for origin in &c.cors_allowed_origins {
            if reqwest::Url::parse(origin).is_err() {
                return Err(ConvertError::InvalidConfig(format!(
                    "CORS origin '{origin}' is not a valid URL"
                )));
            }
        }
        c.bind_addr()?;
        Ok(self.config)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Configuration for a [`crate::client::SubmissionFlow`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:8080`. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Whole-request timeout in seconds, upload included. Default: 120.
    ///
    /// A timeout is reported like any other failed submission.
    pub timeout_secs: u64,

    /// Directory artifacts are saved into. Default: current directory.
    pub output_dir: PathBuf,

    /// Observer notified as a submission starts and ends.
    pub progress: Option<Arc<dyn SubmissionProgress>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            output_dir: PathBuf::from("."),
            progress: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("output_dir", &self.output_dir)
            .field(
                "progress",
                &self.progress.as_ref().map(|_| "<dyn SubmissionProgress>"),
            )
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Absolute URL of `path` under the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Timeout in seconds, clamped to 1–3600.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.clamp(1, 3600);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn progress(mut self, observer: Arc<dyn SubmissionProgress>) -> Self {
        self.config.progress = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ConvertError> {
        let url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            ConvertError::InvalidConfig(format!(
                "base URL '{}' is invalid: {e}",
                self.config.base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConvertError::InvalidConfig(format!(
                "base URL '{}' must use http or https",
                self.config.base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let c = ServerConfig::builder().build().unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(c.bind_addr().unwrap().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn upload_limit_is_clamped() {
        let c = ServerConfig::builder().max_upload_mb(0).build().unwrap();
        assert_eq!(c.max_upload_bytes, 1024 * 1024);
        assert!(ServerConfig::builder().max_upload_bytes(0).build().is_err());
    }

    #[test]
    fn ipv6_host_binds() {
        let c = ServerConfig::builder().host("::1").port(9000).build().unwrap();
        assert_eq!(c.bind_addr().unwrap().to_string(), "[::1]:9000");
    }

    #[test]
    fn bad_cors_origin_is_rejected() {
        let err = ServerConfig::builder()
            .cors_origin("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn client_rejects_non_http_base_url() {
        assert!(ClientConfig::builder().base_url("ftp://example.com").build().is_err());
        assert!(ClientConfig::builder().base_url("localhost").build().is_err());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = ClientConfig::builder()
            .base_url("http://converter.local:8080/")
            .timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.endpoint("/convert/rate"), "http://converter.local:8080/convert/rate");
        assert_eq!(c.timeout_secs, 1);
    }
}
