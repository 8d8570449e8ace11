//! Flightgate Server Binary
//!
//! Serves the HTTP bridge in front of an Arrow Flight data service.
//!
//! ## Usage
//!
//! ```bash
//! # Start with config.toml / config.local.toml / FLIGHTGATE_* settings
//! cargo run --bin flightgate-server
//!
//! # Point at another data service and port
//! cargo run --bin flightgate-server -- --flight grpc://db:8815 --port 8081
//! ```
//!
//! ## Tracing
//!
//! Logs go to stderr unless `FLIGHTGATE_TRACE_FILE` names a file.
//! `FLIGHTGATE_TRACE_LEVEL` and `FLIGHTGATE_TRACE_JSON` override `[logging]`.

use flightgate::config::LoggingConfig;
use flightgate::protocol::rest;
use flightgate::protocol::Handler;
use flightgate::Config;

use clap::Parser;
use std::env;
use std::sync::Arc;
use std::sync::OnceLock;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(name = "flightgate-server", version, about)]
struct Args {
    /// Configuration file (default: config.toml + config.local.toml)
    #[arg(long)]
    config: Option<String>,

    /// HTTP bind address
    #[arg(long)]
    host: Option<String>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Flight data service location (host:port)
    #[arg(long)]
    flight: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Load configuration
    let loaded = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize tracing using config as fallback when env vars are not set
    init_tracing(&config.logging);
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "config_load_failed_using_defaults");
    }

    // Command line overrides
    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(flight) = args.flight {
        config.flight.location = flight;
    }

    let http_config = config.http.clone();

    let handler = Arc::new(Handler::from_config(config).map_err(|e| {
        tracing::error!(error = %e, "handler_init_failed");
        e
    })?);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %handler.location(),
        templates = %handler.templates().dir().display(),
        local_executor = handler.local_executor().is_some(),
        "flightgate_starting"
    );

    rest::start_http_server(handler, &http_config).await?;

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    let json = env::var("FLIGHTGATE_TRACE_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    let level = env::var("FLIGHTGATE_TRACE_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let (non_blocking, guard) = match env::var("FLIGHTGATE_TRACE_FILE") {
        Ok(log_path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!("ERROR: Unable to open FLIGHTGATE_TRACE_FILE '{log_path}': {e}");
                tracing_appender::non_blocking(std::io::stderr())
            }
        },
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };
    let _ = TRACE_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(non_blocking.clone())
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
