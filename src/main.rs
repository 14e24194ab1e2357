//! tbb: run a sequential test by betting over observation files.
//!
//! Loads configuration, initialises structured logging, reads the
//! observation streams, runs the experiment and optionally writes a JSON
//! report.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use testing_by_betting::config::AppConfig;
use testing_by_betting::{data, sequential_experiment};

#[derive(Debug, Parser)]
#[command(name = "tbb", version, about = "Anytime-valid sequential testing by betting")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Write the outcome report here (overrides output.report_path).
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Seed for the randomised stopping rule (overrides test.seed).
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut cfg = AppConfig::load(&cli.config)?;
    if let Some(seed) = cli.seed {
        cfg.test.seed = Some(seed);
    }

    info!(
        config = %cli.config.display(),
        kind = ?cfg.test.kind,
        alpha = cfg.test.alpha,
        strategy = %cfg.test.strategy,
        "tbb starting up"
    );

    let sample_a = data::load_observations(&cfg.data.sample_a)?;
    let sample_b = match &cfg.data.sample_b {
        Some(path) => Some(data::load_observations(path)?),
        None => None,
    };

    let outcome = sequential_experiment(|| cfg.build_tester(), &sample_a, sample_b.as_deref())
        .context("Sequential experiment failed")?;

    match outcome.reject_time {
        Some(t) => info!(
            reject_time = t,
            wealth = outcome.final_wealth(),
            "Null rejected at observation {t}"
        ),
        None if outcome.rejected_at_stop => info!(
            steps = outcome.steps,
            wealth = outcome.final_wealth(),
            "Null rejected at the stopping time by the randomised rule"
        ),
        None => info!(
            steps = outcome.steps,
            wealth = outcome.final_wealth(),
            "Null not rejected"
        ),
    }

    let report_path = cli.report.or_else(|| cfg.output.report_path.clone());
    match report_path {
        Some(path) => {
            data::save_outcome(&outcome, &path)?;
            info!(path = %path.display(), "Report written");
        }
        None => warn!("No report path configured; outcome not saved"),
    }

    Ok(())
}

/// Initialise tracing with an env-filter. JSON output when `--json-logs`
/// is passed or `TBB_LOG_JSON` is set.
fn init_logging(json_flag: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("testing_by_betting=info,tbb=info"));

    let json_logging = json_flag || std::env::var("TBB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
