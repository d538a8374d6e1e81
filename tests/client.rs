//! Client submission flow against mocked and real servers.

use reservoir_convert::client::{DETAIL_FALLBACK, TRANSPORT_FALLBACK};
use reservoir_convert::{
    serve_listener, ClientConfig, ConversionKind, FlowState, Outcome, ServerConfig, Submission,
    SubmissionFlow, SubmissionProgress, SubmitError, UploadedFile,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Records every progress callback as a short string.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SubmissionProgress for Recorder {
    fn on_submit_start(&self, kind: ConversionKind, filename: &str) {
        self.push(format!("start {kind} {filename}"));
    }
    fn on_saved(&self, _kind: ConversionKind, path: &Path, bytes: usize) {
        let name = path.file_name().unwrap().to_string_lossy();
        self.push(format!("saved {name} {bytes}"));
    }
    fn on_failed(&self, _kind: ConversionKind, message: &str) {
        self.push(format!("failed {message}"));
    }
    fn on_submit_finish(&self, kind: ConversionKind) {
        self.push(format!("finish {kind}"));
    }
}

fn flow(base_url: &str, out: &TempDir) -> SubmissionFlow {
    let config = ClientConfig::builder()
        .base_url(base_url)
        .output_dir(out.path())
        .timeout_secs(10)
        .build()
        .unwrap();
    SubmissionFlow::new(config).unwrap()
}

fn rate_submission(csv: &str) -> Submission {
    Submission::new(ConversionKind::Rate)
        .with_file(UploadedFile::new("rates.csv", csv.as_bytes().to_vec()))
        .with_field("time_domain", "MONTHLY")
        .with_field("fluids_list", "OIL")
}

// ── Mocked server ────────────────────────────────────────────────────────────

#[tokio::test]
async fn success_saves_body_under_disposition_name() {
    let mock = MockServer::start().await;
    let body = b"*FIELD\n*MONTHLY\n".to_vec();
    Mock::given(method("POST"))
        .and(path("/convert/rate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("content-type", "text/plain; charset=utf-8")
                .insert_header("content-disposition", "attachment; filename=\"custom.vol\""),
        )
        .expect(1)
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = ClientConfig::builder()
        .base_url(mock.uri())
        .output_dir(out.path())
        .progress(recorder.clone())
        .build()
        .unwrap();
    let flow = SubmissionFlow::new(config).unwrap();

    let saved = flow.submit(&rate_submission("UWI,DATE,OIL\n")).await.unwrap();

    assert_eq!(saved, out.path().join("custom.vol"));
    assert_eq!(std::fs::read(&saved).unwrap(), body);
    assert_eq!(flow.state(), FlowState::Idle);
    assert_eq!(flow.last_outcome(), Some(Outcome::Succeeded(saved)));
    assert_eq!(
        recorder.events(),
        vec![
            "start rate rates.csv".to_string(),
            format!("saved custom.vol {}", body.len()),
            "finish rate".to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_disposition_falls_back_to_kind_default() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_string("UNITS FIELD\n"))
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let submission = Submission::new(ConversionKind::Completion)
        .with_file(UploadedFile::new("c.csv", b"UWI".to_vec()));
    let saved = flow(&mock.uri(), &out).submit(&submission).await.unwrap();

    assert_eq!(saved.file_name().unwrap(), "converted_completion_data.ev");
}

#[tokio::test]
async fn server_detail_is_surfaced() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/rate"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "detail": "Please provide OIL columns!" })),
        )
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let flow = flow(&mock.uri(), &out);
    let err = flow.submit(&rate_submission("UWI,DATE\n")).await.unwrap_err();

    assert!(matches!(err, SubmitError::Rejected { status: 400, .. }));
    assert_eq!(err.user_message(), "Please provide OIL columns!");
    assert_eq!(
        flow.last_outcome(),
        Some(Outcome::Failed("Please provide OIL columns!".to_string()))
    );
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn non_json_failure_uses_transport_fallback() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let err = flow(&mock.uri(), &out)
        .submit(&rate_submission("UWI\n"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), TRANSPORT_FALLBACK);
}

#[tokio::test]
async fn json_failure_without_detail_uses_generic_message() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "x" })))
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let err = flow(&mock.uri(), &out)
        .submit(&rate_submission("UWI\n"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), DETAIL_FALLBACK);
}

#[tokio::test]
async fn invalid_submission_never_reaches_server() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let flow = flow(&mock.uri(), &out);

    let no_method = Submission::new(ConversionKind::Pressure)
        .with_file(UploadedFile::new("p.csv", b"UWI,DATE,PRESS\n".to_vec()));
    let err = flow.submit(&no_method).await.unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(_)));
    assert_eq!(err.user_message(), "Please select the aggregation method!");

    let no_file = Submission::new(ConversionKind::Completion);
    let err = flow.submit(&no_file).await.unwrap_err();
    assert_eq!(err.user_message(), "Please upload a correct file!");

    assert_eq!(flow.state(), FlowState::Idle);
}

#[tokio::test]
async fn failed_submission_can_be_retried_unchanged() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({ "detail": "busy" })))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let flow = flow(&mock.uri(), &out);
    let submission = rate_submission("UWI,DATE,OIL\n");

    assert!(flow.submit(&submission).await.is_err());
    let saved = flow.submit(&submission).await.unwrap();
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "ok");
}

#[tokio::test]
async fn second_submit_while_in_flight_is_busy() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/rate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("*FIELD\n")
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&mock)
        .await;

    let out = TempDir::new().unwrap();
    let flow = flow(&mock.uri(), &out);
    let submission = rate_submission("UWI,DATE,OIL\n");

    let first = flow.submit(&submission);
    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let state_during = flow.state();
        (state_during, flow.submit(&submission).await)
    };
    let (first, (state_during, second)) = tokio::join!(first, second);

    assert_eq!(state_during, FlowState::Submitting);
    assert!(matches!(second, Err(SubmitError::Busy)));
    assert!(first.is_ok());
    assert_eq!(flow.state(), FlowState::Idle);
    // The refused call does not overwrite the real outcome.
    assert!(matches!(flow.last_outcome(), Some(Outcome::Succeeded(_))));
}

// ── Real server ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn round_trip_through_real_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let config = ServerConfig::default();
        serve_listener(listener, &config, async move {
            let _ = stopped.await;
        })
        .await
    });

    let out = TempDir::new().unwrap();
    let flow = flow(&format!("http://{addr}"), &out);

    let csv = "UWI,DATE,OIL\nW1,2020-01-15,100\nW1,2020-03-10,80.5\n";
    let saved = flow.submit(&rate_submission(csv)).await.unwrap();
    assert_eq!(saved.file_name().unwrap(), "converted_rate_data.vol");
    let text = std::fs::read_to_string(&saved).unwrap();
    assert!(text.ends_with("*NAME\tW1\n1\t1\t2020\t100\t\n1\t2\t2020\t0\t\n1\t3\t2020\t80.5\t\n"));

    let bad = rate_submission("UWI,DATE\nW1,2020-01-01\n");
    let err = flow.submit(&bad).await.unwrap_err();
    assert_eq!(err.user_message(), "Please provide OIL columns!");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
