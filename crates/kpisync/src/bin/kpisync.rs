use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kpisync::backends::{DryRun, FileStore, SheetsStore};
use kpisync::health::HealthServer;
use kpisync::{GridStore, RunReport, Syncer, SystemClock, SystemScraper, ThreadSleeper, metrics};
use kpisync_spec::{Config, ConfigError, StoreSpec};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "kpisync", version, about = "Sync KPI values into a week-indexed spreadsheet")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "KPISYNC_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape every configured source and write the results.
    Run(RunArgs),
    /// Check a config file and report every problem found.
    Validate(ConfigArgs),
    /// Print the JSON schema of the config file.
    Schema,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Path to the YAML config.
    #[arg(long, short, default_value = "config.yaml", env = "KPISYNC_CONFIG")]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Run once and exit even when `interval-secs` is set.
    #[arg(long)]
    once: bool,

    /// Read from the store but only log writes.
    #[arg(long)]
    dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Command::Run(args) => run(&args),
        Command::Validate(args) => validate(&args.config),
        Command::Schema => {
            println!("{}", kpisync_spec::schema_json());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(ConfigError::Invalid(invalid)) = err.downcast_ref::<ConfigError>() {
                eprintln!("invalid configuration:");
                for issue in invalid.issues() {
                    eprintln!("  {issue}");
                }
                return ExitCode::from(EXIT_INVALID_CONFIG);
            }
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load(path: &Path) -> Result<Config> {
    Config::load(path).map_err(|err| match err {
        invalid @ ConfigError::Invalid(_) => anyhow::Error::new(invalid),
        other => anyhow::Error::new(other).context(format!("loading {}", path.display())),
    })
}

fn validate(path: &Path) -> Result<()> {
    let config = load(path)?;
    let (mode, items) = if config.has_legacy_kpis() {
        ("KPI", config.kpi.len())
    } else {
        ("datapoints", config.datapoints.len())
    };
    println!("{}: ok ({items} {mode})", path.display());
    Ok(())
}

fn open_store(spec: &StoreSpec, dry_run: bool) -> Result<Box<dyn GridStore>> {
    let store: Box<dyn GridStore> = match spec {
        StoreSpec::Sheets { token_env } => Box::new(
            SheetsStore::from_env(token_env).context("cannot set up the Sheets client")?,
        ),
        StoreSpec::File { path } => Box::new(
            FileStore::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
    };
    if dry_run {
        info!("dry run: writes are logged, not sent");
        return Ok(Box::new(DryRun::new(store)));
    }
    Ok(store)
}

fn run(args: &RunArgs) -> Result<()> {
    let config = load(&args.config.config)?;

    let _health = match &config.metrics {
        Some(spec) => Some(
            HealthServer::spawn(spec)
                .with_context(|| format!("cannot listen on {}", spec.address))?,
        ),
        None => None,
    };

    let store = open_store(&config.store, args.dry_run)?;
    let scraper = SystemScraper::new()?;
    let mut syncer = Syncer::new(&config, store, scraper, SystemClock, ThreadSleeper)?;

    loop {
        let timer = metrics::SYNC_RUN_DURATION_SECONDS.start_timer();
        let result = syncer.run_once();
        timer.observe_duration();
        let report = result.context("sync run aborted")?;
        log_report(&report);

        match config.interval_secs {
            Some(secs) if !args.once => {
                info!(next_in_secs = secs, "waiting for next run");
                std::thread::sleep(Duration::from_secs(secs));
            }
            _ => return Ok(()),
        }
    }
}

fn log_report(report: &RunReport) {
    let tally = report.tally();
    info!(
        week = report.week(),
        synced = tally.synced,
        collision = tally.collision,
        failed = tally.failed,
        "run complete"
    );
    if let RunReport::Datapoints(report) = report {
        for failure in &report.failures {
            warn!(datapoint = %failure.title, error = %failure.error, "datapoint not synced");
        }
    }
}
