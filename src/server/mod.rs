//! HTTP conversion dispatcher.
//!
//! ## Routes
//!
//! | Path | Method | Body |
//! |------|--------|------|
//! | `/convert/rate` | POST | multipart: `file`, `time_domain`, `fluids_list`… |
//! | `/convert/pressure` | POST | multipart: `file`, `method` |
//! | `/convert/completion` | POST | multipart: `file` |
//! | `/healthz` | GET | (none) |
//!
//! Every failure leaves the router as a `{"detail": ...}` JSON body, including
//! unknown paths, wrong methods and oversized uploads. Handlers share no
//! mutable state; concurrent requests are converted independently on the
//! blocking pool.

mod handlers;

use crate::config::ServerConfig;
use crate::error::ConvertError;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// Per-router state handed to every handler.
#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub(crate) max_upload_bytes: usize,
}

/// Build the application router with all endpoints and middleware.
pub fn router(config: &ServerConfig) -> Result<Router, ConvertError> {
    let state = AppState {
        max_upload_bytes: config.max_upload_bytes,
    };

    let router = Router::new()
        .route("/convert/rate", post(handlers::convert_rate))
        .route("/convert/pressure", post(handlers::convert_pressure))
        .route("/convert/completion", post(handlers::convert_completion))
        .route("/healthz", get(handlers::healthz))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    Ok(router)
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer, ConvertError> {
    let origin = if config.cors_allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let mut origins = Vec::with_capacity(config.cors_allowed_origins.len());
        for origin in &config.cors_allowed_origins {
            let value = origin
                .trim_end_matches('/')
                .parse::<HeaderValue>()
                .map_err(|e| {
                    ConvertError::InvalidConfig(format!("CORS origin '{origin}': {e}"))
                })?;
            origins.push(value);
        }
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        // Browsers hide this header from scripts unless exposed.
        .expose_headers([header::CONTENT_DISPOSITION]))
}

/// Bind `config`'s address and serve until `shutdown` resolves.
pub async fn serve<F>(config: &ServerConfig, shutdown: F) -> Result<(), ConvertError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ConvertError::Serve {
            addr: addr.to_string(),
            source,
        })?;
    serve_listener(listener, config, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ConvertError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let app = router(config)?;

    info!(
        addr = %addr,
        max_upload_bytes = config.max_upload_bytes,
        "Conversion server listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| ConvertError::Serve { addr, source })?;

    info!("Conversion server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::Value;

    fn server(config: ServerConfig) -> TestServer {
        TestServer::new(router(&config).unwrap()).unwrap()
    }

    fn csv_part(body: &str) -> Part {
        Part::bytes(body.as_bytes().to_vec())
            .file_name("table.csv")
            .mime_type("text/csv")
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let response = server(ServerConfig::default()).get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_path_is_json_404() {
        let response = server(ServerConfig::default())
            .post("/convert/injection")
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let detail = response.json::<Value>()["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("/convert/injection"));
    }

    #[tokio::test]
    async fn wrong_method_is_json_405() {
        let response = server(ServerConfig::default()).get("/convert/rate").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.json::<Value>()["detail"].is_string());
    }

    #[tokio::test]
    async fn non_multipart_body_reports_missing_file() {
        let response = server(ServerConfig::default())
            .post("/convert/completion")
            .text("UWI,DATE")
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let detail = response.json::<Value>()["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("file"), "got: {detail}");
    }

    #[tokio::test]
    async fn success_sets_download_headers() {
        let form = MultipartForm::new()
            .add_part("file", csv_part("UWI,DATE,PRESS\nW1,2020-01-01,100\n"))
            .add_text("method", "average");
        let response = server(ServerConfig::default())
            .post("/convert/pressure")
            .multipart(form)
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION),
            "attachment; filename=\"converted_pressure_data.vol\""
        );
        assert_eq!(
            response.header(header::CONTENT_TYPE),
            "text/plain; charset=utf-8"
        );
        assert!(response.text().starts_with("*FIELD\n"));
    }

    #[tokio::test]
    async fn oversized_upload_is_413_with_detail() {
        let config = ServerConfig::builder()
            .max_upload_bytes(64)
            .build()
            .unwrap();
        let big = format!("UWI,DATE,PRESS\n{}", "W1,2020-01-01,100\n".repeat(20));
        let form = MultipartForm::new()
            .add_part("file", csv_part(&big))
            .add_text("method", "max");
        let response = server(config).post("/convert/pressure").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let detail = response.json::<Value>()["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("64"), "got: {detail}");
    }

    #[tokio::test]
    async fn cors_exposes_content_disposition() {
        let config = ServerConfig::builder()
            .cors_origin("http://localhost:3000")
            .build()
            .unwrap();
        let response = server(config)
            .get("/healthz")
            .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"))
            .await;
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            "http://localhost:3000"
        );
    }
}
