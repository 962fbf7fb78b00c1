//! chainsink - continuous replication from PostgreSQL into SingleStore
//!
//! The binary wires config, connections, metrics and the monitor together,
//! then drives [`runner::poll_tick`] forever. Any batch failure is fatal:
//! partial-batch state is tolerated by REPLACE semantics on the target, and
//! an external supervisor restarting the process resumes from the persisted
//! watermark.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainsink::config::Settings;
use chainsink::metrics;
use chainsink::monitor;
use chainsink::progress::ProgressStore;
use chainsink::runner;
use chainsink::source::Source;
use chainsink::target::Target;

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "chainsink")]
#[command(
    version,
    about = "Replicates blockchain analytics from PostgreSQL into SingleStore"
)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long)]
    config: PathBuf,

    /// Block height to start replicating at; -1 resumes from the progress
    /// store
    #[arg(long, default_value = "-1")]
    start_height: String,

    /// Maximum number of blocks to replicate per batch
    #[arg(long, default_value_t = 100)]
    batch_size: i64,

    /// Time to sleep between polls once caught up
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    poll_interval: Duration,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    metrics::init(settings.metrics.port)?;

    let source = Source::connect(&settings.postgres)
        .await
        .context("unable to connect to postgres")?;
    let target = Target::connect(&settings.singlestore)
        .await
        .context("unable to connect to singlestore")?;
    let progress = ProgressStore::new(&target);

    info!(
        "starting replication from postgres ({}:{}) to singlestore ({}:{})",
        settings.postgres.host,
        settings.postgres.port,
        settings.singlestore.host,
        settings.singlestore.port
    );

    let stored = progress
        .read_max_replicated_height()
        .await
        .context("unable to read highest replicated block from singlestore")?;
    let mut height = runner::resolve_start_height(&cli.start_height, &stored)?;

    let source_tip = source
        .max_block_height()
        .await
        .context("unable to read highest block from postgres")?;

    monitor::spawn(source.clone(), progress.clone(), MONITOR_INTERVAL);

    info!("starting replication at block height {height}");

    loop {
        let replicated = runner::poll_tick(&source, &target, &progress, &height, cli.batch_size)
            .await
            .context("replication failed")?;
        height = runner::next_height(height, replicated.as_ref());

        // only sleep once we have caught up to the tip observed at startup
        if height >= source_tip {
            tokio::time::sleep(cli.poll_interval).await;
        } else {
            info!("catching up to height {source_tip}, currently at height {height}");
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
