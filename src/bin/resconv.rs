//! CLI binary for reservoir-convert.
//!
//! A thin shim over the library crate: `serve` runs the HTTP dispatcher,
//! `submit` drives a [`SubmissionFlow`] against a running server, and `local`
//! runs a pipeline in-process with no server at all.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reservoir_convert::request::{FIELD_FLUIDS, FIELD_METHOD, FIELD_TIME_DOMAIN};
use reservoir_convert::{
    convert, serve, write_artifact, ClientConfig, ConversionKind, ServerConfig, Submission,
    SubmissionFlow, SubmissionProgress, SubmitError, UploadedFile,
};
use std::fmt;
use std::io;
use std::process::ExitCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: a spinner while the request is in flight, then one
/// result line.
///
/// The bar starts hidden so a submission rejected before any request leaves
/// no trace on the terminal.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        Arc::new(Self { bar })
    }
}

impl SubmissionProgress for CliProgress {
    fn on_submit_start(&self, kind: ConversionKind, filename: &str) {
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!("{kind} ← {filename}"));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_response(&self, _kind: ConversionKind, status: u16) {
        if status < 400 {
            self.bar.set_prefix("Saving");
        }
    }

    fn on_saved(&self, _kind: ConversionKind, path: &Path, bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&path.display().to_string()),
            dim(&format!("{bytes} bytes"))
        );
    }

    fn on_failed(&self, _kind: ConversionKind, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{}  {}", red("✘"), message);
    }

    fn on_submit_finish(&self, _kind: ConversionKind) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the conversion server
  resconv serve --port 8080

  # Monthly oil and water volumes from a CSV export
  resconv submit rate production.csv --time-domain MONTHLY --fluid OIL --fluid WATER

  # Daily maximum pressure per well, one .vol per workbook sheet (zipped)
  resconv submit pressure surveys.xlsx --method max --output-dir out/

  # Completion events without a server
  resconv local completion completions.xlsx -o wells.ev

ENVIRONMENT VARIABLES:
  RESCONV_BASE_URL        Server root for `submit` (default http://localhost:8080)
  RESCONV_TIMEOUT         Client timeout in seconds (default 120)
  RESCONV_OUTPUT_DIR      Where `submit` saves artifacts (default .)
  RESCONV_HOST            Interface for `serve` (default 0.0.0.0)
  RESCONV_PORT            Port for `serve` (default 8080)
  RESCONV_MAX_UPLOAD_MB   Upload limit for `serve` (default 25)
  RESCONV_CORS_ORIGINS    Comma-separated CORS origins for `serve`
  RUST_LOG                Overrides -v / -q log filtering
"#;

/// Convert reservoir rate, pressure and completion tables to simulator input.
#[derive(Parser, Debug)]
#[command(
    name = "resconv",
    version,
    about = "Convert reservoir rate, pressure and completion tables to simulator input",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESCONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP conversion server.
    Serve(ServeArgs),
    /// Upload a table to a running server and save the result.
    Submit(SubmitArgs),
    /// Convert a table in-process, without a server.
    Local(LocalArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// IP address to bind.
    #[arg(long, env = "RESCONV_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "RESCONV_PORT", default_value_t = 8080)]
    port: u16,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "RESCONV_MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,

    /// Allowed CORS origin; repeat for several. Any origin when omitted.
    #[arg(long = "cors-origin", env = "RESCONV_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,
}

#[derive(Args, Debug)]
struct ConversionArgs {
    /// Conversion to run.
    #[arg(value_enum)]
    kind: KindArg,

    /// CSV or Excel table to convert.
    file: PathBuf,

    /// Rate: reporting period (DAILY or MONTHLY).
    #[arg(long, env = "RESCONV_TIME_DOMAIN")]
    time_domain: Option<String>,

    /// Rate: fluid column to export (OIL, WATER, GAS, WINJ); repeat for several.
    #[arg(long = "fluid", env = "RESCONV_FLUIDS", value_delimiter = ',')]
    fluids: Vec<String>,

    /// Pressure: aggregation per well and day (average, max, min).
    #[arg(long, env = "RESCONV_METHOD")]
    method: Option<String>,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[command(flatten)]
    conversion: ConversionArgs,

    /// Server root URL.
    #[arg(long, env = "RESCONV_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Directory the artifact is saved into.
    #[arg(long, env = "RESCONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Request timeout in seconds.
    #[arg(long, env = "RESCONV_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Disable the spinner.
    #[arg(long, env = "RESCONV_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct LocalArgs {
    #[command(flatten)]
    conversion: ConversionArgs,

    /// Write the artifact here instead of its suggested name.
    #[arg(short, long, env = "RESCONV_OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Rate,
    Pressure,
    Completion,
}

impl From<KindArg> for ConversionKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Rate => ConversionKind::Rate,
            KindArg::Pressure => ConversionKind::Pressure,
            KindArg::Completion => ConversionKind::Completion,
        }
    }
}

/// A failure the progress observer has already shown on the terminal.
#[derive(Debug)]
struct AlreadyReported;

impl fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("conversion failed")
    }
}

impl std::error::Error for AlreadyReported {}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a `submit` user needs; keep library
    // INFO logs out of its way unless asked for.
    let spinner_active = matches!(&cli.command, Command::Submit(a) if !a.no_progress) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_active {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Submit(args) => run_submit(args, cli.quiet).await,
        Command::Local(args) => run_local(args, cli.quiet).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(message) = failure_message(&e) {
                eprintln!("{} {}", red("Error:"), message);
            }
            ExitCode::FAILURE
        }
    }
}

/// What to print for a failed run; `None` when the user has already seen it.
fn failure_message(err: &anyhow::Error) -> Option<String> {
    if err.is::<AlreadyReported>() {
        None
    } else {
        Some(format!("{err:#}"))
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::builder()
        .host(args.host)
        .port(args.port)
        .max_upload_mb(args.max_upload_mb)
        .cors_origins(args.cors_origins)
        .build()
        .context("Invalid server configuration")?;

    serve(&config, shutdown_signal())
        .await
        .context("Server failed")?;
    Ok(())
}

async fn run_submit(args: SubmitArgs, quiet: bool) -> Result<()> {
    let submission = build_submission(&args.conversion).await?;

    let mut builder = ClientConfig::builder()
        .base_url(args.base_url)
        .timeout_secs(args.timeout)
        .output_dir(args.output_dir);
    let observed = !quiet && !args.no_progress;
    if observed {
        builder = builder.progress(CliProgress::new());
    }
    let config = builder.build().context("Invalid client configuration")?;
    let flow = SubmissionFlow::new(config).context("Failed to create HTTP client")?;

    match flow.submit(&submission).await {
        Ok(path) => {
            if !observed {
                println!("{}", path.display());
            }
            Ok(())
        }
        // The observer already printed the failure line.
        Err(e) if observed && !matches!(e, SubmitError::Invalid(_)) => {
            Err(AlreadyReported.into())
        }
        Err(e) => anyhow::bail!(e.user_message()),
    }
}

async fn run_local(args: LocalArgs, quiet: bool) -> Result<()> {
    let submission = build_submission(&args.conversion).await?;
    let request = submission
        .validate()
        .map_err(|e| anyhow::anyhow!(SubmitError::Invalid(e).user_message()))?;

    let start = Instant::now();
    let artifact = convert(&request).await.context("Conversion failed")?;
    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(&artifact.filename));
    write_artifact(&artifact, &path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if !quiet {
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&path.display().to_string()),
            dim(&format!(
                "{} bytes  {}ms",
                artifact.len(),
                start.elapsed().as_millis()
            ))
        );
    }
    Ok(())
}

/// Map CLI args to an unvalidated form, exactly as a user would fill it in.
async fn build_submission(args: &ConversionArgs) -> Result<Submission> {
    let file = UploadedFile::from_path(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut submission = Submission::new(args.kind.into()).with_file(file);
    if let Some(ref td) = args.time_domain {
        submission.push_field(FIELD_TIME_DOMAIN, td.as_str());
    }
    for fluid in &args.fluids {
        submission.push_field(FIELD_FLUIDS, fluid.as_str());
    }
    if let Some(ref m) = args.method {
        submission.push_field(FIELD_METHOD, m.as_str());
    }
    Ok(submission)
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_submit_failure_is_not_printed_twice() {
        let err: anyhow::Error = AlreadyReported.into();
        assert_eq!(failure_message(&err), None);
    }

    #[test]
    fn other_failures_print_their_context_chain() {
        let err = Err::<(), _>(io::Error::other("disk full"))
            .context("Failed to write out.vol")
            .unwrap_err();
        assert_eq!(
            failure_message(&err).as_deref(),
            Some("Failed to write out.vol: disk full")
        );
    }
}
