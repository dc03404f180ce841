//! sol-screener command line entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sol_screener::config::ScreenerConfig;
use sol_screener::monitor::{JsonFeedSource, LogSink, MonitorCycle};
use sol_screener::oracle::CompositeScorer;
use sol_screener::state::NotificationState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Solana token screener
#[derive(Parser, Debug)]
#[command(name = "sol-screener", version, about, long_about = None)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(short, long, value_name = "FILE", default_value = "screener.toml")]
    config: PathBuf,

    /// Candidate feed file, overrides the config
    #[arg(short, long, value_name = "FILE")]
    feed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single monitoring cycle
    Once,

    /// Run monitoring cycles until Ctrl-C
    Daemon {
        /// Minutes between cycles, overrides the config
        #[arg(short, long)]
        interval_minutes: Option<u64>,
    },

    /// Score the current feed without notifying or marking anything
    Preview {
        /// Number of candidates to show
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,
    },

    /// Show the notification state
    Stats {
        /// Also list this many most recent entries
        #[arg(short, long, default_value_t = 0)]
        recent: usize,
    },

    /// Sweep expired entries from the notification state
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ScreenerConfig::load(&cli.config)?;
    if let Some(feed) = cli.feed {
        config.monitor.feed_path = feed;
    }

    let scorer = CompositeScorer::from_config(&config).context("Invalid configuration")?;

    match cli.command {
        Commands::Once => {
            let cycle = build_cycle(scorer, &config).await;
            let report = cycle.run_once().await?;
            info!("Cycle report: {:?}", report);
        }
        Commands::Daemon { interval_minutes } => {
            let minutes = interval_minutes.unwrap_or(config.monitor.interval_minutes).max(1);
            let cycle = build_cycle(scorer, &config).await;
            cycle
                .run_daemon(Duration::from_secs(minutes * 60), shutdown_signal())
                .await;
        }
        Commands::Preview { top } => {
            let cycle = build_cycle(scorer, &config).await;
            let batches = cycle.preview(top).await?;
            if batches.is_empty() {
                println!("nothing new to notify");
            }
            for batch in batches {
                println!("{}:", batch.category);
                for (i, entry) in batch.entries.iter().enumerate() {
                    println!(
                        "{:>2}. {:<12} {:>5.1}  {}",
                        i + 1,
                        entry.candidate.label(),
                        entry.total_score,
                        entry.breakdown.reason
                    );
                }
            }
        }
        Commands::Stats { recent } => {
            let state = NotificationState::from_config(&config.dedup).await;
            println!("storage:  {}", state.storage_description());
            println!("entries:  {}", state.len().await);
            println!("ttl:      {}h", state.ttl().num_hours());
            println!("capacity: {}", state.max_entries());
            for (key, entry) in state.snapshot().await.into_iter().take(recent) {
                println!(
                    "  {}  {:<12} {:>5.1}  {}",
                    entry.notified_at.to_rfc3339(),
                    entry.label,
                    entry.score,
                    key
                );
            }
        }
        Commands::Cleanup => {
            let state = NotificationState::from_config(&config.dedup).await;
            let report = state.cleanup().await;
            println!(
                "removed {} expired and {} over capacity, {} remaining",
                report.expired, report.capped, report.remaining
            );
            if state.is_degraded() {
                warn!("Notification state is degraded, removals were not persisted");
            }
        }
    }

    Ok(())
}

async fn build_cycle(scorer: CompositeScorer, config: &ScreenerConfig) -> MonitorCycle {
    let state = Arc::new(NotificationState::from_config(&config.dedup).await);
    MonitorCycle::new(
        scorer,
        state,
        Arc::new(JsonFeedSource::new(&config.monitor.feed_path)),
        Arc::new(LogSink),
        config.screening.clone(),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
