mod config;
mod error;
mod extract;
mod nav;
mod portal;
mod record;
mod retry;
mod scheduler;
mod store;
mod text;
mod traverse;

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use config::Settings;
use scheduler::Mode;
use store::Store;
use text::DateWindow;

#[derive(Parser)]
#[command(name = "bid_harvest", about = "Incremental bid announcement harvester")]
struct Cli {
    /// Show the browser window instead of running headless
    #[arg(long, global = true)]
    visible: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill a fixed posting-date range, skipping already collected records
    History {
        /// First posting date (YYYYMMDD)
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,
        /// Last posting date (YYYYMMDD)
        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,
        /// Stop after consecutive rows posted before this date (YYYYMMDD)
        #[arg(long, value_parser = parse_date)]
        cutoff: Option<NaiveDate>,
    },
    /// Poll yesterday..today on a fixed interval, stopping at known records
    Interval {
        /// Seconds between runs
        #[arg(long, default_value_t = 600)]
        every: u64,
    },
    /// Poll yesterday..today once a day
    Cron {
        /// Local hour to run at (0-23)
        #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: u32,
    },
    /// Show ledger, record log and snapshot counts
    Stats,
    /// Print the newest collected records
    Latest {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,
    },
    /// Regenerate the snapshot from the record log
    RebuildSnapshot,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if cli.visible {
        settings.headless = false;
    }
    let paths = settings.store_paths();

    let result = match cli.command {
        Commands::History { start, end, cutoff } => {
            let window = DateWindow::new(start, end);
            harvest(Mode::History { window, cutoff }, &settings).await
        }
        Commands::Interval { every } => {
            let every = Duration::from_secs(every.max(1));
            harvest(Mode::Interval { every }, &settings).await
        }
        Commands::Cron { hour } => harvest(Mode::Cron { hour }, &settings).await,
        Commands::Stats => {
            let s = store::stats(&paths)?;
            println!("Known ids:      {}", s.seen_ids);
            println!("Logged records: {}", s.logged_records);
            println!("Snapshot rows:  {}", s.snapshot_rows);
            Ok(())
        }
        Commands::Latest { limit } => {
            let records = store::latest(&paths, limit)?;
            if records.is_empty() {
                println!("No records in {}", paths.log.display());
                return Ok(());
            }
            for rec in &records {
                println!("ID: {} | {} | {}", rec.id, rec.collected_at, rec.title);
                println!("{}", serde_json::to_string_pretty(rec)?);
                println!("{}", "=".repeat(60));
            }
            Ok(())
        }
        Commands::RebuildSnapshot => {
            let rows = store::rebuild_snapshot(&paths)?;
            println!("Rebuilt {} with {} rows", paths.snapshot.display(), rows);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Open the store, run the mode until it ends or is cancelled, then flush
/// whatever the snapshot has not seen yet.
async fn harvest(mode: Mode, settings: &Settings) -> anyhow::Result<()> {
    let cancel = scheduler::listen_for_signals();
    let mut store = Store::open(&settings.store_paths(), settings.batch_size)?;
    let result = scheduler::run(mode, settings, &mut store, cancel).await;
    store.shutdown_flush().await;
    result
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    text::parse_ymd(s).map_err(|e| format!("expected YYYYMMDD: {}", e))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
