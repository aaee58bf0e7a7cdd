use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;

use botqueue::config::{GlobalConfig, load_config};
use botqueue::domain::{CommentRequest, RunOutcome, Target, WorkerAccount, WorkerPool};
use botqueue::scheduler::{RequestScheduler, SubmitOutcome};
use botqueue::services::{DryRunActionClient, MemoryDataStore, Responder};
use cli::Cli;
use cli::commands::Commands;

const DRY_RUN_LATENCY: Duration = Duration::from_millis(50);

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("botqueue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("botqueue.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Prints replies to the terminal
struct ConsoleResponder;

impl Responder for ConsoleResponder {
    fn respond(&self, status: Option<u16>, message: &str) {
        let prefix = match status {
            Some(code) if code >= 400 => format!("[{}]", code).red(),
            Some(code) => format!("[{}]", code).green(),
            None => "[reply]".cyan(),
        };
        println!("{} {}", prefix, message);
    }
}

fn run_application(cli: &Cli, config: GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Simulate {
            target,
            amount,
            group,
            workers,
            proxies,
            limited,
            quotes,
            delay_ms,
        } => {
            let target = if *group {
                Target::group(target)
            } else {
                Target::profile(target)
            };
            let pool = synthetic_pool(*workers, *proxies, *limited);
            handle_simulate(target, *amount, pool, quotes.clone(), *delay_ms, config)
        }
        Commands::Config => handle_config_command(&config),
    }
}

/// Workers spread round-robin over the proxies, the last `limited` of them limited
fn synthetic_pool(workers: usize, proxies: usize, limited: usize) -> Vec<WorkerAccount> {
    let proxies = proxies.max(1);
    (0..workers)
        .map(|i| {
            WorkerAccount::new(i, &format!("bot{}", i), i % proxies).with_limited(i + limited >= workers)
        })
        .collect()
}

fn handle_simulate(
    target: Target,
    amount: u32,
    pool: Vec<WorkerAccount>,
    quotes: Vec<String>,
    delay_ms: Option<u64>,
    mut config: GlobalConfig,
) -> Result<()> {
    if let Some(ms) = delay_ms {
        config.scheduler.action_delay_ms = ms;
    }
    config.validate()?;

    let quotes = if quotes.is_empty() {
        vec!["Nice profile!".to_string()]
    } else {
        quotes
    };

    info!("Simulating {} comments on {} with {} workers", amount, target, pool.len());
    println!(
        "{} {} comments on {} with {} workers",
        "Simulating:".green(),
        amount,
        target,
        pool.len()
    );

    let target_id = target.id.clone();
    let request = CommentRequest::new("cli", target, amount, quotes);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let scheduler = RequestScheduler::new(
            config,
            Arc::new(WorkerPool::new(pool)),
            Arc::new(DryRunActionClient::new(DRY_RUN_LATENCY)),
            Arc::new(MemoryDataStore::new()),
        );

        match scheduler.submit(request, Arc::new(ConsoleResponder)).await? {
            SubmitOutcome::Started { request_id, handle } => {
                let outcome = handle.await.context("Request task failed")?;
                let label = match &outcome {
                    RunOutcome::Finished { failed: 0 } => "Finished".green(),
                    RunOutcome::Finished { .. } => "Finished with failures".yellow(),
                    _ => "Stopped".red(),
                };
                println!("{} {} ({:?})", label, request_id, outcome);

                if let Some(snapshot) = scheduler.status(&target_id) {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
            }
            SubmitOutcome::Rejected(rejection) => {
                println!("{} {:?}", "Rejected:".red(), rejection);
            }
        }
        Ok::<(), eyre::Report>(())
    })
}

fn handle_config_command(config: &GlobalConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config.log_level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
