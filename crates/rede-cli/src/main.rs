//! REDE - Real estate data extract filtering pipeline

use anyhow::{Context, Result};
use clap::Parser;
use rede_cli::{log_artifact, scheduler};
use rede_common::logging::{init_logging, LogConfig, LogLevel};
use rede_pipeline::config::PipelineConfig;
use rede_pipeline::fetch::{Fetcher, FtpConfig, RetryPolicy};
use rede_pipeline::orchestrator::{Orchestrator, RunOutcome};
use rede_pipeline::publish::{Publisher, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rede")]
#[command(author, version, about = "Real estate data extract filtering pipeline")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = "config/rede.toml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Mode {
    /// Run the pipeline once and exit (non-zero when any job failed)
    Run,

    /// Run daily at the configured time until shut down
    Schedule {
        /// Also run immediately on startup
        #[arg(long)]
        now: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let config = Arc::new(
        PipelineConfig::load(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?,
    );

    let fetcher = Fetcher::new(
        FtpConfig::from_env()?,
        RetryPolicy {
            max_attempts: config.run.fetch_max_attempts,
            ..Default::default()
        },
    )?;
    let publisher = Publisher::new(StorageConfig::from_env()?);
    let log_publisher = publisher.clone();
    let orchestrator = Orchestrator::new(config.clone(), fetcher, publisher);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match cli.mode {
        Mode::Run => {
            let failed = trigger_run(&orchestrator, &log_publisher, &log_config, &cancel).await;
            if failed {
                std::process::exit(1);
            }
        },
        Mode::Schedule { now } => {
            let daily_time = config.schedule.time().context("invalid schedule time")?;
            info!(at = %config.schedule.daily_time, "scheduler started");

            if now {
                trigger_run(&orchestrator, &log_publisher, &log_config, &cancel).await;
            }

            loop {
                let delay = scheduler::next_run_delay(chrono::Local::now(), daily_time);
                info!(next_run_in_secs = delay.as_secs(), "waiting for next scheduled run");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        trigger_run(&orchestrator, &log_publisher, &log_config, &cancel).await;
                    },
                    _ = cancel.cancelled() => {
                        info!("shutdown requested, scheduler stopping");
                        break;
                    },
                }
            }
        },
    }

    Ok(())
}

/// Execute one run and publish the log artifact; returns true when any job
/// failed.
async fn trigger_run(
    orchestrator: &Orchestrator,
    publisher: &Publisher,
    log_config: &LogConfig,
    cancel: &CancellationToken,
) -> bool {
    let failed = match orchestrator.run(cancel).await {
        RunOutcome::Completed(summary) => {
            if summary.has_failures() {
                error!(
                    failed = summary.jobs_failed,
                    "run completed with job failures"
                );
            }
            summary.has_failures()
        },
        RunOutcome::Skipped => false,
    };

    // Give the non-blocking appender a moment to flush before upload.
    tokio::time::sleep(Duration::from_millis(200)).await;
    log_artifact::publish_current_log(publisher, log_config).await;

    failed
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            cancel.cancel();
        }
    });
}
