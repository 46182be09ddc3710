pub mod api;
pub mod config;
pub mod container;
pub mod logger;
pub mod metrics;
pub mod usage;

use anyhow::Result;
use clap::Parser;
use config::{ProbeKind, Settings};
use container::DockerConnector;
use logger::{setup_logger, LogFormat};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log level
    #[arg(
        short,
        long,
        default_value = "info",
        env = "LOG_LVL",
        help = "Log Levels: info, debug, warning, error, trace, critical"
    )]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,

    /// Docker daemon address (unix socket path, unix://, tcp:// or http://)
    #[arg(long, env = "DOCKER_HOST")]
    docker_host: Option<String>,

    /// Verify the daemon over TLS when set to any non-empty value
    #[arg(long, env = "DOCKER_TLS_VERIFY")]
    docker_tls_verify: Option<String>,

    /// Directory holding ca.pem, cert.pem and key.pem
    #[arg(long, env = "DOCKER_CERT_PATH")]
    docker_cert_path: Option<PathBuf>,

    /// How volume sizes are measured
    #[arg(long, value_enum, default_value = "docker")]
    probe: ProbeKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logger(args.log_level, args.log_format);
    let log = slog_scope::logger();

    let settings = Arc::new(
        Settings::new(args.docker_host, args.probe)?
            .with_tls(args.docker_tls_verify, args.docker_cert_path),
    );
    slog::info!(log, "Starting";
        "api_version" => settings.api_version.to_string(),
        "docker_host" => settings.docker_host.as_deref().unwrap_or(config::DEFAULT_DOCKER_SOCKET),
        "probe" => format!("{:?}", settings.probe),
        "tls" => settings.docker_tls_verify
    );

    if settings.probe == ProbeKind::Docker {
        sweep_stale_helpers(&settings).await;
    }

    metrics::initialize_metrics()?;

    let app = api::router(api::AppState {
        connector: Arc::new(DockerConnector::new(settings.clone())),
        settings: settings.clone(),
    });

    let listener = tokio::net::TcpListener::bind(settings.listen_addr()).await?;
    slog::info!(log, "Listening"; "addr" => settings.listen_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    slog::info!(log, "Shutting down");

    Ok(())
}

/// Removes helper containers left behind by an earlier run. An unreachable
/// daemon is not fatal here; requests report it instead.
async fn sweep_stale_helpers(settings: &Settings) {
    let log = slog_scope::logger();
    let result = match container::runtimes::docker::connect(settings).await {
        Ok(client) => container::runtimes::docker::sweep_helpers(&client).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(0) => {}
        Ok(removed) => slog::info!(log, "Removed stale helper containers"; "count" => removed),
        Err(e) => slog::warn!(log, "Could not sweep helper containers"; "error" => e.to_string()),
    }
}
