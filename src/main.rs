use anyhow::{Context, Result};
use bqtour::config::TourConfig;
use bqtour::gcp::{auth, client};
use bqtour::tour;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Guided tour of the BigQuery API
#[derive(Parser, Debug)]
#[command(name = "bqtour", version = bqtour::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// GCP project to run the tour in
    project: Option<String>,

    /// Config file (default: <config dir>/bqtour/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service-account key file
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// OAuth client-secret file for the installed-app flow
    #[arg(long, global = true)]
    client_secret: Option<PathBuf>,

    /// Where the OAuth flow caches its tokens
    #[arg(long, global = true)]
    token_cache: Option<PathBuf>,

    /// BigQuery API root, e.g. an emulator
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the Authorization header for manual HTTP testing
    AuthHeader,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("bqtour {} started with log level: {:?}", bqtour::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

/// Config file, then environment, then flags
fn load_config(args: &Args) -> Result<TourConfig> {
    let mut config = TourConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env();

    if let Some(project) = &args.project {
        config.project_id = Some(project.clone());
    }
    if let Some(key_file) = &args.key_file {
        config.auth.key_file = Some(key_file.clone());
    }
    if let Some(secret) = &args.client_secret {
        config.auth.client_secret = Some(secret.clone());
    }
    if let Some(cache) = &args.token_cache {
        config.auth.token_cache = Some(cache.clone());
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }

    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;
    let config = load_config(&args)?;

    match args.command {
        Some(Command::AuthHeader) => {
            let credentials = client::resolve_credentials(&config)
                .await
                .context("Failed to resolve credentials")?;
            println!("{}", auth::auth_header(&credentials).await?);
        }
        None => {
            let project = config.effective_project()?;
            tracing::info!("Using project: {}, endpoint: {}", project, config.effective_endpoint());

            let client = client::build_client(&config)
                .await
                .context("Failed to initialize BigQuery client")?;

            let report = tour::run_tour(&client, &project, config.poll)
                .await
                .map_err(|e| {
                    tracing::error!("{}", bqtour::gcp::http::format_gcp_error(&e));
                    e
                })
                .context("BigQuery tour failed")?;

            tracing::info!(
                "Tour finished: job {} {}, {} rows counted",
                report.job.job_id,
                report.job_state.as_str(),
                report.row_count.unwrap_or_default()
            );
        }
    }

    Ok(())
}
