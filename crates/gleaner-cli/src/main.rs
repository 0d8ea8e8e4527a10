//! gleaner - crawl scheduler の操作用 CLI
//!
//! 実際のスクレイパーは持たないので、`run` はランダムな遅延・件数・失敗を返す
//! シミュレーターで Scheduler を動かします。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gleaner_core::config::{Settings, load_settings};
use gleaner_core::domain::{
    CrawlError, ExecutionLogEntry, ExecutionStatus, ExecutionUpdate, SinkError, Source, TaskId,
};
use gleaner_core::impls::{InMemoryExecutionLog, TracingExecutionLog};
use gleaner_core::ports::{CrawlExecutor, CrawlReport, ExecutionLog};
use gleaner_core::{SchedulerBuilder, SchedulerStatus};

/// Gleaner: recurring, retryable, concurrency-limited crawl scheduling
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(version)]
#[command(about = "Crawl task queue and scheduler", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler against a simulated crawler
    Run {
        /// Path to TOML configuration file (defaults when omitted)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "N")]
        for_secs: Option<u64>,

        /// Queue a manual crawl at startup, e.g. `amazon:electronics`
        #[arg(long, value_name = "SOURCE[:CATEGORY]", value_parser = parse_trigger)]
        trigger: Vec<Trigger>,

        /// Probability that a simulated crawl fails
        #[arg(long, value_name = "P", default_value_t = 0.2, value_parser = parse_probability)]
        failure_rate: f64,
    },

    /// Load and validate a config file, then print the effective schedules
    CheckConfig {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Print the default configuration as TOML
    Defaults,
}

#[derive(Debug, Clone)]
struct Trigger {
    source: Source,
    category: Option<String>,
}

fn parse_trigger(s: &str) -> Result<Trigger, String> {
    let (source, category) = match s.split_once(':') {
        Some((source, category)) => (source, Some(category.trim().to_string())),
        None => (s, None),
    };
    let source = source.parse::<Source>().map_err(|e| e.to_string())?;
    Ok(Trigger { source, category })
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not between 0 and 1"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Run {
            config,
            for_secs,
            trigger,
            failure_rate,
        } => {
            let settings = match config {
                Some(path) => read_settings(&path)?,
                None => Settings::default(),
            };
            handle_run(settings, for_secs, trigger, failure_rate).await
        }
        Command::CheckConfig { config } => handle_check_config(&config),
        Command::Defaults => {
            print!("{}", Settings::default().to_toml_string()?);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level.
/// `RUST_LOG` wins when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("gleaner=info,gleaner_core=info,warn"),
                1 => EnvFilter::new("gleaner=debug,gleaner_core=debug,info"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn read_settings(path: &Path) -> Result<Settings> {
    info!("Loading configuration from: {}", path.display());
    load_settings(path).with_context(|| format!("invalid configuration in {}", path.display()))
}

fn handle_check_config(path: &Path) -> Result<()> {
    let settings = read_settings(path)?;

    println!("Dispatch:");
    println!("  max_concurrent: {}", settings.dispatch.max_concurrent);
    println!("  poll interval: {}s", settings.dispatch.poll_interval_secs);
    match settings.dispatch.execution_timeout_secs {
        Some(secs) => println!("  execution timeout: {secs}s"),
        None => println!("  execution timeout: none"),
    }
    println!(
        "Retry: max_retries={} base_delay={}ms multiplier={}",
        settings.retry.max_retries, settings.retry.base_delay_ms, settings.retry.multiplier
    );

    println!("\nSchedules:");
    for schedule in settings.effective_schedules() {
        println!(
            "  - {:<8} every {:>4} min  {}  [{}]",
            schedule.source,
            schedule.interval_minutes,
            if schedule.enabled { "on " } else { "off" },
            schedule.categories.join(", ")
        );
    }

    println!("\nSubscribers ({} categories)", settings.subscribers.len());
    println!("\n✓ Configuration is valid");
    Ok(())
}

async fn handle_run(
    settings: Settings,
    for_secs: Option<u64>,
    triggers: Vec<Trigger>,
    failure_rate: f64,
) -> Result<()> {
    let log = Arc::new(InMemoryExecutionLog::new());
    let scheduler = SchedulerBuilder::new()
        .settings(settings)
        .executor(Arc::new(SimulatedCrawler::new(failure_rate)))
        .execution_log(Arc::new(TeeLog {
            memory: Arc::clone(&log),
            tracing: TracingExecutionLog,
        }))
        .build()?;

    scheduler.start().await;
    for trigger in triggers {
        let task_id = scheduler
            .trigger_manual_crawl(trigger.source, trigger.category, None)
            .await?;
        info!(task_id = %task_id, source = %trigger.source, "manual crawl requested");
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("interrupted, shutting down");
        }
        _ = run_for(for_secs) => {
            info!("run time elapsed, shutting down");
        }
    }
    scheduler.stop().await;

    let report = RunReport {
        status: scheduler.status().await,
        executions: ExecutionSummary::from_entries(&log.entries().await),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_for(secs: Option<u64>) {
    match secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    status: SchedulerStatus,
    executions: ExecutionSummary,
}

#[derive(Debug, Default, Serialize)]
struct ExecutionSummary {
    attempts: usize,
    completed: usize,
    failed: usize,
    /// Started but not finished when the run ended.
    in_flight: usize,
    items_collected: u64,
}

impl ExecutionSummary {
    fn from_entries(entries: &[ExecutionLogEntry]) -> Self {
        let mut summary = Self {
            attempts: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            match entry.status {
                ExecutionStatus::Started => summary.in_flight += 1,
                ExecutionStatus::Completed => summary.completed += 1,
                ExecutionStatus::Failed => summary.failed += 1,
            }
            summary.items_collected += entry.items_collected.unwrap_or(0);
        }
        summary
    }
}

/// Keeps entries for the final summary and also logs them.
struct TeeLog {
    memory: Arc<InMemoryExecutionLog>,
    tracing: TracingExecutionLog,
}

#[async_trait]
impl ExecutionLog for TeeLog {
    async fn record(&self, entry: ExecutionLogEntry) -> Result<(), SinkError> {
        self.tracing.record(entry.clone()).await?;
        self.memory.record(entry).await
    }

    async fn update(&self, task_id: TaskId, update: ExecutionUpdate) -> Result<(), SinkError> {
        self.tracing.update(task_id, update.clone()).await?;
        self.memory.update(task_id, update).await
    }
}

/// Stand-in for a real scraper: sleeps a random 0.2-2s, then either fails
/// with probability `failure_rate` or reports a random item count.
struct SimulatedCrawler {
    failure_rate: f64,
}

impl SimulatedCrawler {
    fn new(failure_rate: f64) -> Self {
        Self { failure_rate }
    }
}

#[async_trait]
impl CrawlExecutor for SimulatedCrawler {
    async fn execute(
        &self,
        source: Source,
        category: Option<&str>,
        keywords: &[String],
    ) -> Result<CrawlReport, CrawlError> {
        // ThreadRng is !Send; draw everything before the first await
        let (latency_ms, fails, items_collected) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(200..=2_000u64),
                rng.gen_bool(self.failure_rate),
                rng.gen_range(0..=50u64),
            )
        };

        tracing::debug!(
            source = %source,
            category = ?category,
            keywords = keywords.len(),
            latency_ms,
            "simulated crawl"
        );
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if fails {
            return Err(CrawlError::failed(format!(
                "{source} responded with 503 Service Unavailable"
            )));
        }
        Ok(CrawlReport { items_collected })
    }
}
