// src/main.rs
//! Donation Sentinel command line
//! Replays recorded inbound events through the security monitor and prints
//! the resulting dashboards, reports and metrics.
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use donation_sentinel::monitor::clock::millis_span;
use donation_sentinel::monitor::{
    Clock, InboundMessage, ManualClock, MonitorConfig, MonitorService, SecurityEngine,
    SystemClock,
};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Donation platform security monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file (TOML or JSON); SENTINEL_CONFIG is used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSONL event file through the monitor and print the dashboard
    Replay(ReplayArgs),
    /// Feed a JSONL event file and print the report for one address
    Report {
        #[command(flatten)]
        replay: ReplayArgs,
        /// Address to report on
        #[arg(long)]
        address: String,
    },
    /// Validate the configuration and exit
    CheckConfig,
    /// Feed a JSONL event file and print Prometheus metrics
    Metrics(ReplayArgs),
}

#[derive(ClapArgs)]
struct ReplayArgs {
    /// Newline-delimited JSON inbound messages
    #[arg(long)]
    input: PathBuf,
    /// Advance a simulated clock by this many milliseconds per event
    /// instead of using wall-clock time
    #[arg(long)]
    step_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::CheckConfig => {
            config.validate().context("invalid configuration")?;
            println!("configuration ok");
        }
        Commands::Replay(replay) => {
            let service = replay_file(config, &replay).await?;
            let dashboard = service.handle().dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
            service.shutdown().await?;
        }
        Commands::Report { replay, address } => {
            let service = replay_file(config, &replay).await?;
            let report = service.handle().address_report(&address).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            service.shutdown().await?;
        }
        Commands::Metrics(replay) => {
            let service = replay_file(config, &replay).await?;
            let exported = service.engine().export_metrics()?;
            service.shutdown().await?;
            print!("{}", exported);
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    match path {
        Some(path) => {
            let mut config = MonitorConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => Ok(MonitorConfig::from_env()?),
    }
}

async fn replay_file(config: MonitorConfig, args: &ReplayArgs) -> Result<MonitorService> {
    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let manual = args.step_ms.map(|_| Arc::new(ManualClock::new(Utc::now())));
    let clock: Arc<dyn Clock> = match &manual {
        Some(manual) => manual.clone() as Arc<dyn Clock>,
        None => Arc::new(SystemClock),
    };

    let engine = SecurityEngine::builder(config).with_clock(clock).build()?;
    let service = MonitorService::spawn(Arc::new(engine));
    let handle = service.handle();

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: InboundMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping unparseable line");
                rejected += 1;
                continue;
            }
        };
        match handle.submit(message).await {
            Ok(_) => accepted += 1,
            Err(e) if e.is_input_error() => {
                warn!(line = index + 1, error = %e, "Rejected inbound event");
                rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
        if let (Some(manual), Some(step)) = (&manual, args.step_ms) {
            manual.advance(millis_span(step));
        }
    }

    info!(accepted, rejected, "Replay finished");
    Ok(service)
}
