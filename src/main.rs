use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pmcnorm::config::{Config, JobConfig};
use pmcnorm::job;
use pmcnorm::normalize::OutputMode;

/// Multiplex-corrected views of per-CPU PMU counter samples.
#[derive(Parser)]
#[command(name = "pmcnorm", about)]
struct Cli {
    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides the config file's level. Default: info.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every job in a YAML configuration file.
    Run {
        /// Path to the YAML configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Normalize a single counter table.
    Normalize {
        /// Table kind (dtlb_misses, itlb_misses, llc_misses, branch_misses).
        #[arg(long)]
        table: String,

        /// JSON record array to read.
        #[arg(long)]
        input: PathBuf,

        /// Output path. Default: <input stem>.<mode>.json next to the input.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Derived view: rate (pdf) or cumulative (cdf).
        #[arg(long, default_value = "rate")]
        mode: OutputMode,

        /// Counter column override.
        #[arg(long)]
        counter_column: Option<String>,

        /// Derived column name override.
        #[arg(long)]
        output_column: Option<String>,

        /// Stamp every row with this collection id.
        #[arg(long)]
        collection_id: Option<String>,

        /// Collection start in seconds since boot; adds an uptime_sec column.
        #[arg(long)]
        start_uptime_sec: Option<i64>,

        /// Keep structurally invalid rows instead of dropping them.
        #[arg(long)]
        no_filter: bool,
    },

    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

const DEFAULT_LOG_LEVEL: &str = "info";

/// An explicit `--log-level` always wins over the config file.
fn effective_log_level<'a>(flag: Option<&'a str>, configured: &'a str) -> &'a str {
    flag.unwrap_or(configured)
}

fn init_tracing(level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level: {level}"))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("pmcnorm {}", version::full());
            Ok(())
        }

        Command::Run { config } => {
            let cfg = Config::load(&config)
                .with_context(|| format!("loading config from {}", config.display()))?;

            init_tracing(effective_log_level(
                cli.log_level.as_deref(),
                &cfg.log_level,
            ))?;

            tracing::info!(
                version = version::RELEASE,
                jobs = cfg.jobs.len(),
                "starting pmcnorm",
            );

            let summaries = job::run_all(&cfg)?;
            let degenerate: usize = summaries.iter().map(|s| s.degenerate_spans).sum();
            tracing::info!(jobs = summaries.len(), degenerate_spans = degenerate, "done");
            Ok(())
        }

        Command::Normalize {
            table,
            input,
            output,
            mode,
            counter_column,
            output_column,
            collection_id,
            start_uptime_sec,
            no_filter,
        } => {
            init_tracing(effective_log_level(
                cli.log_level.as_deref(),
                DEFAULT_LOG_LEVEL,
            ))?;

            let output = output.unwrap_or_else(|| input.with_extension(format!("{mode}.json")));
            let job = JobConfig {
                table,
                input,
                output,
                mode,
                counter_column,
                output_column,
            };

            let cfg = Config {
                collection_id,
                start_uptime_sec,
                filter_invalid_rows: !no_filter,
                jobs: vec![job],
                ..Default::default()
            };
            cfg.validate()?;

            job::run_all(&cfg)?;
            Ok(())
        }
    }
}
