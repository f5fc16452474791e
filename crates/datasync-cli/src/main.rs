//! datasync CLI - copy a table between pooled SQL databases.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use datasync::{Config, PoolRegistry, SyncError, SyncExecutor, SyncReport, SyncRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "datasync")]
#[command(about = "Replace a target table with the rows of a source table")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "datasync.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one table
    Sync {
        /// Logical name of the source database
        #[arg(long)]
        source_db: String,

        /// Table to read
        #[arg(long)]
        source_table: String,

        /// Logical name of the target database
        #[arg(long)]
        target_db: String,

        /// Table to clear and fill
        #[arg(long)]
        target_table: String,

        /// Copy at most this many rows
        #[arg(long)]
        max_rows: Option<u64>,

        /// Override rows per insert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run the jobs defined in the configuration file
    Run {
        /// Run only the named job
        #[arg(long)]
        job: Option<String>,
    },

    /// Test every configured database connection
    HealthCheck,

    /// Load and validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Commands::Validate = cli.command {
        println!(
            "Configuration is valid: {} data sources, {} jobs",
            config.datasources.len(),
            config.jobs.len()
        );
        return Ok(());
    }

    let cancel_token = setup_signal_handler()?;
    let batch_size = config.sync.batch_size;
    let config = Arc::new(config);
    let registry = Arc::new(PoolRegistry::with_drivers(config.clone()));
    let executor = SyncExecutor::new(registry.clone())
        .with_batch_size(batch_size)
        .with_cancellation(cancel_token);

    let result = match cli.command {
        Commands::Validate => Ok(()),
        Commands::Sync {
            source_db,
            source_table,
            target_db,
            target_table,
            max_rows,
            batch_size,
        } => {
            let executor = match batch_size {
                Some(size) => executor.with_batch_size(size),
                None => executor,
            };
            let mut request = SyncRequest::new(source_db, source_table, target_db, target_table);
            request.max_rows = max_rows;

            match executor.data_sync(&request).await {
                Ok(report) => print_report(&report, cli.output_json),
                Err(e) => Err(e),
            }
        }
        Commands::Run { job } => run_jobs(&config, &executor, job.as_deref(), cli.output_json).await,
        Commands::HealthCheck => health_check(&config, &registry, cli.output_json).await,
    };

    registry.destroy_all().await;
    result
}

async fn run_jobs(
    config: &Config,
    executor: &SyncExecutor,
    only: Option<&str>,
    output_json: bool,
) -> Result<(), SyncError> {
    let jobs = match only {
        Some(name) => {
            let job = config
                .job(name)
                .ok_or_else(|| SyncError::Config(format!("no job named '{}'", name)))?;
            vec![job.clone()]
        }
        None => config.jobs.clone(),
    };
    if jobs.is_empty() {
        return Err(SyncError::Config(
            "no jobs defined in the configuration".to_string(),
        ));
    }

    let outcomes = executor.run_jobs(&jobs).await;

    if output_json {
        let summary: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(report) => serde_json::json!({ "job": o.name, "report": report }),
                Err(e) => serde_json::json!({ "job": o.name, "error": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\nJobs:");
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => println!(
                    "  OK     {} ({} rows in {:.2}s)",
                    outcome.name, report.rows_copied, report.duration_seconds
                ),
                Err(e) => println!("  FAILED {}: {}", outcome.name, e),
            }
        }
    }

    if outcomes.len() < jobs.len() {
        return Err(SyncError::Cancelled);
    }
    match outcomes.into_iter().find_map(|o| o.result.err()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn health_check(
    config: &Config,
    registry: &PoolRegistry,
    output_json: bool,
) -> Result<(), SyncError> {
    let mut results = Vec::with_capacity(config.datasources.len());
    for (name, params) in &config.datasources {
        let start = std::time::Instant::now();
        let outcome = registry.health_check(name).await;
        results.push((name.clone(), params.driver.clone(), start.elapsed(), outcome));
    }
    let healthy = results.iter().all(|(_, _, _, r)| r.is_ok());

    if output_json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|(name, driver, elapsed, outcome)| {
                serde_json::json!({
                    "name": name,
                    "driver": driver,
                    "connected": outcome.is_ok(),
                    "latency_ms": elapsed.as_millis() as u64,
                    "error": outcome.as_ref().err().map(|e| e.to_string()),
                })
            })
            .collect();
        let body = serde_json::json!({ "healthy": healthy, "datasources": entries });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Health Check Results:");
        for (name, driver, elapsed, outcome) in &results {
            println!(
                "  {} ({}): {} ({}ms)",
                name,
                driver,
                if outcome.is_ok() { "OK" } else { "FAILED" },
                elapsed.as_millis()
            );
            if let Err(e) = outcome {
                println!("    Error: {}", e);
            }
        }
        println!(
            "\n  Overall: {}",
            if healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    match results.into_iter().find_map(|(_, _, _, r)| r.err()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_report(report: &SyncReport, output_json: bool) -> Result<(), SyncError> {
    if output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\nSync completed!");
        println!("  Sync ID: {}", report.sync_id);
        println!(
            "  {}:{} -> {}:{}",
            report.source_db, report.source_table, report.target_db, report.target_table
        );
        println!("  Rows deleted: {}", report.rows_deleted);
        println!("  Rows copied: {}", report.rows_copied);
        println!("  Batches: {}", report.batches_flushed);
        if report.row_cap_reached {
            println!("  Row cap reached");
        }
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!("  Throughput: {} rows/sec", report.rows_per_second);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, SyncError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Rolling back the running sync...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, SyncError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back the running sync...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
