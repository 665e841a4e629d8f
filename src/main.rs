//! Quadrant task server and sync client.

use anyhow::Result;
use clap::{Parser, Subcommand};
use quadrant_sync::config::Config;
use quadrant_sync::queue::ChangeQueue;
use quadrant_sync::server::{ApiServer, StaticTokenValidator, start_server};
use quadrant_sync::store::{MemoryStore, RestStore, rest::StaticToken};
use quadrant_sync::sync::{SyncCoordinator, SyncOutcome, interval_ticker};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "quadrant", version, about = "Quadrant task server and sync client")]
struct Cli {
    /// Path to a config file (defaults to .quadrant/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log destination: off, stdout, stderr, or a file path.
    #[arg(long, global = true, default_value = "stderr")]
    log: String,

    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the task API server.
    Serve {
        /// Port to bind (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Sync the local change queue against a remote task API.
    Sync {
        /// Remote base URL (overrides config).
        #[arg(long)]
        remote: Option<String>,

        /// Keep running, syncing on a timer, until interrupted.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "off" => {}
        "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new().create(true).append(true).open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Sync { remote, watch } => sync(config, remote, watch).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);

    let store = Arc::new(MemoryStore::new());
    let mut state = ApiServer::new(store);
    if let Some(token) = config.server.auth_token {
        state = state.with_auth(Arc::new(StaticTokenValidator(token)));
    }

    let (shutdown_tx, addr) = start_server(state, port).await?;
    info!("serving tasks on {addr}; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(());
    Ok(())
}

async fn sync(config: Config, remote: Option<String>, watch: bool) -> Result<()> {
    let remote_url = remote.unwrap_or(config.sync.remote_url);

    if let Some(parent) = config.sync.queue_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let queue = ChangeQueue::open(&config.sync.queue_path)?;

    let mut remote_store = RestStore::new(remote_url);
    if let Some(token) = config.sync.auth_token {
        remote_store = remote_store.with_token_provider(Arc::new(StaticToken(token)));
    }

    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(remote_store),
        queue,
    ));

    if watch {
        let (tx, rx) = mpsc::channel(16);
        let ticker = interval_ticker(Duration::from_secs(config.sync.interval_seconds), tx);
        let runner = tokio::spawn(Arc::clone(&coordinator).run(rx));

        tokio::signal::ctrl_c().await?;
        ticker.abort();
        runner.abort();
        return Ok(());
    }

    match coordinator.request_sync().await {
        SyncOutcome::Completed(report) => {
            info!(
                pushed = report.pushed,
                failed = report.failed,
                pulled = report.pulled,
                "sync complete"
            );
            Ok(())
        }
        SyncOutcome::Failed(err) => Err(err.into()),
        SyncOutcome::AlreadySyncing => unreachable!("single-shot sync cannot overlap"),
    }
}
