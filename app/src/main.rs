mod config;
mod context;
mod jobs;

use clap::Parser;
use config::Config;
use context::App;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for in-flight jobs to wind down on their own
/// before aborting whatever's left, per spec.md §5's bounded grace period.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "mirror-sync", about = "Mirror-synchronization engine for CurseForge and Modrinth")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "MIRROR_SYNC_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            // Logging isn't initialized yet; a bad config path is the one
            // failure mode that has to reach the user before tracing exists.
            eprintln!("failed to load config from {:?}: {err}", cli.config);
            return ExitCode::FAILURE;
        }
    };

    setup_logging(&config.log_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config))
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> ExitCode {
    info!("starting mirror-sync");

    let shutdown = CancellationToken::new();

    let app = match App::connect(config, shutdown.clone()).await {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "fatal startup error, object store unreachable");
            return ExitCode::FAILURE;
        }
    };

    let mut handles = jobs::schedule(app);
    info!(jobs = handles.len(), "scheduler started");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping"),
        Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
    }

    shutdown.cancel();
    info!(grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(), "waiting for in-flight jobs to wind down");

    let wind_down = futures_util::future::join_all(handles.iter_mut().map(|handle| handle.join()));
    if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, wind_down).await.is_err() {
        warn!("grace period elapsed, aborting remaining jobs");
        for handle in &handles {
            info!(job = handle.name(), "aborting job");
            handle.abort();
        }
    }

    ExitCode::SUCCESS
}
