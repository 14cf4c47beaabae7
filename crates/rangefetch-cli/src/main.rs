use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rangefetch_client::{ApiFetcher, ClientConfig};
use rangefetch_core::models::{FetchOutcome, Identifier};
use rangefetch_core::pacing::PacedFetcher;
use rangefetch_core::traits::RecordFetcher;
use rangefetch_core::{Orchestrator, RateConfig, RateController, RunConfig};
use rangefetch_export::{ExportConfig, FieldMapping, FileSink, load_error_ids};

#[derive(Parser)]
#[command(name = "rangefetch", version, about = "Adaptive-rate record fetcher for numeric ID ranges")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep an identifier range and checkpoint everything found
    Run {
        /// First identifier (inclusive)
        #[arg(long, env = "RANGEFETCH_START", default_value_t = 1)]
        start: Identifier,

        /// Last identifier (inclusive)
        #[arg(long, env = "RANGEFETCH_END", default_value_t = 50_000)]
        end: Identifier,

        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Re-run the identifiers listed in a previous error log
    Retry {
        /// Error log CSV written by an earlier run
        #[arg(short, long)]
        errors: PathBuf,

        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Fetch a single identifier and print the classified outcome
    Probe {
        #[arg(long)]
        id: Identifier,

        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Lookup endpoint (form POST)
    #[arg(long, env = "RANGEFETCH_ENDPOINT", default_value = rangefetch_client::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Connect timeout in seconds
    #[arg(long, env = "RANGEFETCH_CONNECT_TIMEOUT", default_value_t = 3.05)]
    connect_timeout: f64,

    /// Total request timeout in seconds
    #[arg(long, env = "RANGEFETCH_TIMEOUT", default_value_t = 30.0)]
    timeout: f64,
}

impl ClientArgs {
    fn to_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig::new(&self.endpoint)
            .with_timeouts(seconds(self.connect_timeout)?, seconds(self.timeout)?))
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of concurrent workers
    #[arg(short, long, env = "RANGEFETCH_WORKERS", default_value_t = 5)]
    workers: usize,

    /// Attempts per identifier before it goes to the error log
    #[arg(long, env = "RANGEFETCH_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Seconds between periodic checkpoints
    #[arg(long, env = "RANGEFETCH_CHECKPOINT_SECS", default_value_t = 3600)]
    checkpoint_secs: u64,

    /// Seconds in-flight workers may keep going after Ctrl-C
    #[arg(long, env = "RANGEFETCH_GRACE_SECS", default_value_t = 5)]
    grace_secs: u64,

    /// Pause before the first request, in seconds
    #[arg(long, env = "RANGEFETCH_INITIAL_INTERVAL", default_value_t = 0.3)]
    initial_interval: f64,

    /// Shortest pause pacing may shrink to, in seconds
    #[arg(long, env = "RANGEFETCH_MIN_INTERVAL", default_value_t = 0.05)]
    min_interval: f64,

    /// Longest pause pacing may grow to, in seconds
    #[arg(long, env = "RANGEFETCH_MAX_INTERVAL", default_value_t = 5.0)]
    max_interval: f64,

    /// Output directory for checkpoint files
    #[arg(short, long, env = "RANGEFETCH_OUTPUT", default_value = "results")]
    output: PathBuf,

    /// Projection fields, e.g. "CinemaID,CinemaName,ProvinceName:Province"
    #[arg(long, env = "RANGEFETCH_FIELDS")]
    fields: Option<String>,

    /// Skip the .xlsx workbooks
    #[arg(long, env = "RANGEFETCH_NO_SPREADSHEET")]
    no_spreadsheet: bool,
}

impl RunArgs {
    fn apply(&self, config: RunConfig) -> Result<RunConfig> {
        let rate = RateConfig::default()
            .with_bounds(seconds(self.min_interval)?, seconds(self.max_interval)?)
            .with_initial_interval(seconds(self.initial_interval)?);
        Ok(config
            .with_workers(self.workers)
            .with_max_attempts(self.max_attempts)
            .with_rate(rate)
            .with_checkpoint_interval(Duration::from_secs(self.checkpoint_secs))
            .with_grace_period(Duration::from_secs(self.grace_secs)))
    }

    fn export_config(&self) -> Result<ExportConfig> {
        let config = ExportConfig::new(&self.output).with_spreadsheet(!self.no_spreadsheet);
        match &self.fields {
            Some(list) => {
                let fields = FieldMapping::parse_list(list).context("Invalid --fields")?;
                Ok(config.with_fields("projection", fields))
            }
            None => Ok(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rangefetch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            start,
            end,
            client,
            run,
        } => {
            let config = run.apply(RunConfig::for_range(start, end))?;
            cmd_run(config, &client, &run).await?;
        }
        Commands::Retry {
            errors,
            client,
            run,
        } => {
            let ids = load_error_ids(&errors)
                .with_context(|| format!("Failed to load error log {}", errors.display()))?;
            if ids.is_empty() {
                println!("No identifiers to retry in {}", errors.display());
                return Ok(());
            }
            let config = run.apply(RunConfig::for_ids(ids))?;
            cmd_run(config, &client, &run).await?;
        }
        Commands::Probe { id, client } => {
            cmd_probe(id, &client).await?;
        }
    }

    Ok(())
}

async fn cmd_run(config: RunConfig, client: &ClientArgs, run: &RunArgs) -> Result<()> {
    let fetcher = ApiFetcher::new(client.to_config()?).context("Failed to create HTTP client")?;
    let sink = FileSink::new(run.export_config()?);

    tracing::info!(
        run_id = %config.run_id,
        endpoint = %fetcher.endpoint(),
        output = %run.output.display(),
        "Run configured"
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let orchestrator = Orchestrator::new(config, fetcher, sink);
    let summary = orchestrator.run(cancel).await.context("Run failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.cancelled {
        println!(
            "\nInterrupted: {} identifiers never started",
            summary.discarded
        );
    }
    println!(
        "\nFound {} records, {} errors (results in {})",
        summary.successes,
        summary.errors,
        run.output.display()
    );

    Ok(())
}

async fn cmd_probe(id: Identifier, client: &ClientArgs) -> Result<()> {
    let fetcher = ApiFetcher::new(client.to_config()?).context("Failed to create HTTP client")?;
    let paced = PacedFetcher::new(fetcher, RateController::new(RateConfig::default()));

    let outcome = paced.fetch(id).await;
    let report = match &outcome {
        FetchOutcome::Success(record) => serde_json::json!({
            "id": id,
            "outcome": outcome.label(),
            "record": record.data,
        }),
        FetchOutcome::Empty => serde_json::json!({ "id": id, "outcome": outcome.label() }),
        FetchOutcome::Transient(e) | FetchOutcome::Fatal(e) => serde_json::json!({
            "id": id,
            "outcome": outcome.label(),
            "error": e.to_string(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Cancel `token` on the first Ctrl-C; a second Ctrl-C exits immediately.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Shutdown signal received, draining workers (Ctrl-C again to abort)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second Ctrl-C, exiting without final checkpoint");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

/// Conventional exit status for termination by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("Invalid duration: {value} seconds"))
}
