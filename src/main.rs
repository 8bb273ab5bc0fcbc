//! # GourdWatch
//!
//! Back end for gourd pollination tracking: HTTP API plus the background
//! harvest-window reminder scheduler.
//!
//! Usage:
//!   gourdwatch serve                     # API + scheduler (default port from config)
//!   gourdwatch serve --port 8080 --in-memory
//!   gourdwatch tick --today 2024-01-08   # One sweep + evaluation, then exit
//!   gourdwatch init-config               # Write ~/.gourdwatch/config.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use gourdwatch_core::GourdWatchConfig;
use gourdwatch_core::traits::{Clock, FixedClock, MonitoringStore, PushGateway, SystemClock};
use gourdwatch_gateway::AppState;
use gourdwatch_scheduler::{
    ExpoPushGateway, LogPushGateway, MemoryStore, RecordLocks, SchedulerEngine, SqliteStore,
    spawn_scheduler,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gourdwatch",
    version,
    about = "🌱 GourdWatch: pollination tracking and harvest reminders"
)]
struct Cli {
    /// Config file (default: ~/.gourdwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API and the background scheduler
    Serve {
        /// Override gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep all data in memory (nothing is persisted)
        #[arg(long)]
        in_memory: bool,
    },
    /// Run a single scheduler tick and print the report
    Tick {
        /// Evaluate as of this date (YYYY-MM-DD) instead of the local date
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Write a default config file
    InitConfig,
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => GourdWatchConfig::default_path(),
    }
}

fn load_config(path: &Path) -> Result<GourdWatchConfig> {
    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
    }
    GourdWatchConfig::load_or_default(path)
        .with_context(|| format!("loading config {}", path.display()))
}

fn open_store(config: &GourdWatchConfig, in_memory: bool) -> Result<Arc<dyn MonitoringStore>> {
    if in_memory {
        tracing::warn!("⚠️  In-memory store: records are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = config.database.resolved_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?;
    tracing::info!("🗄️  Database: {}", path.display());
    Ok(Arc::new(store))
}

fn push_gateway(config: &GourdWatchConfig) -> Arc<dyn PushGateway> {
    if config.push.endpoint.trim().is_empty() {
        tracing::warn!("⚠️  push.endpoint is empty: reminders are logged, not sent");
        Arc::new(LogPushGateway)
    } else {
        Arc::new(ExpoPushGateway::new(&config.push))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "gourdwatch=debug,gourdwatch_scheduler=debug,gourdwatch_gateway=debug,tower_http=debug"
    } else {
        "gourdwatch=info,gourdwatch_scheduler=info,gourdwatch_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    match cli.command {
        Command::InitConfig => {
            if path.exists() {
                println!("⚠️  Config already exists: {}", path.display());
                return Ok(());
            }
            GourdWatchConfig::default().save_to(&path)?;
            println!("✅ Config written to {}", path.display());
            Ok(())
        }
        Command::Tick { today } => {
            let config = load_config(&path)?;
            let store = open_store(&config, false)?;
            let clock: Arc<dyn Clock> = match today {
                Some(date) => Arc::new(FixedClock::new(date)),
                None => Arc::new(SystemClock),
            };
            let engine = SchedulerEngine::new(
                store,
                push_gateway(&config),
                RecordLocks::new(),
                &config,
            );
            let report = engine
                .tick(clock.today())
                .await
                .context("another tick is already running")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve { port, in_memory } => {
            let config = load_config(&path)?;
            let store = open_store(&config, in_memory)?;
            let push = push_gateway(&config);
            let locks = RecordLocks::new();
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let engine = Arc::new(SchedulerEngine::new(
                store.clone(),
                push.clone(),
                locks.clone(),
                &config,
            ));

            let scheduler = if config.scheduler.enabled {
                tracing::info!(
                    "⏰ Scheduler every {}s (run on start: {})",
                    config.scheduler.interval_secs,
                    config.scheduler.run_on_start
                );
                Some(spawn_scheduler(engine.clone(), clock.clone(), &config.scheduler))
            } else {
                tracing::warn!("⚠️  Scheduler disabled; reminders run only via POST /api/v1/scheduler/run");
                None
            };

            let port = port.unwrap_or(config.gateway.port);
            println!("🌱 GourdWatch v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 API:    http://{}:{}/api/v1", config.gateway.host, port);
            println!("   📣 Push:   {}", push.name());
            println!();

            let state = AppState {
                store,
                push,
                locks,
                engine,
                clock,
                start_time: std::time::Instant::now(),
            };
            gourdwatch_gateway::serve(state, &config.gateway.host, port, shutdown_signal()).await?;

            if let Some(handle) = scheduler {
                handle.abort();
            }
            Ok(())
        }
    }
}
