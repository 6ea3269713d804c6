use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::normalize::OutputMode;
use crate::table::kind::TableKind;

/// Top-level configuration for a batch normalization run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stamped onto every input row as `collection_id` when set.
    #[serde(default)]
    pub collection_id: Option<String>,

    /// Collection start, in seconds since boot. When set, every output gains
    /// an `uptime_sec` column relative to it.
    #[serde(default)]
    pub start_uptime_sec: Option<i64>,

    /// Drop structurally invalid rows before normalizing. Default: true.
    #[serde(default = "default_true")]
    pub filter_invalid_rows: bool,

    /// Tables to normalize.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// One input table → one derived output table.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Registry name of the table kind (e.g. "dtlb_misses").
    pub table: String,

    /// JSON record array to read.
    pub input: PathBuf,

    /// Where to write the derived JSON record array.
    pub output: PathBuf,

    /// Derived view to produce. Default: rate.
    #[serde(default = "default_mode")]
    pub mode: OutputMode,

    /// Counter column override. Default: the kind's cumulative column.
    #[serde(default)]
    pub counter_column: Option<String>,

    /// Derived column name override. Default: the kind's name.
    #[serde(default)]
    pub output_column: Option<String>,
}

impl JobConfig {
    /// Resolves the table kind through the registry.
    pub fn kind(&self) -> Result<TableKind> {
        TableKind::from_name(&self.table).with_context(|| format!("job for {}", self.table))
    }

    /// Counter column to normalize.
    pub fn counter_column(&self, kind: TableKind) -> &str {
        self.counter_column
            .as_deref()
            .unwrap_or_else(|| kind.counter_column())
    }

    /// Name of the derived column.
    pub fn output_column(&self, kind: TableKind) -> &str {
        self.output_column
            .as_deref()
            .unwrap_or_else(|| kind.derived_column())
    }
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mode() -> OutputMode {
    OutputMode::Rate
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            collection_id: None,
            start_uptime_sec: None,
            filter_invalid_rows: true,
            jobs: Vec::new(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            bail!("at least one job is required");
        }

        if let Some(start) = self.start_uptime_sec {
            if start < 0 {
                bail!("start_uptime_sec must not be negative, got {start}");
            }
        }

        if let Some(id) = &self.collection_id {
            if id.is_empty() {
                bail!("collection_id must not be empty when set");
            }
        }

        let mut outputs = HashSet::new();

        for (i, job) in self.jobs.iter().enumerate() {
            job.kind().with_context(|| format!("jobs[{i}]"))?;

            if job.input.as_os_str().is_empty() {
                bail!("jobs[{i}].input is required");
            }
            if job.output.as_os_str().is_empty() {
                bail!("jobs[{i}].output is required");
            }
            if job.input == job.output {
                bail!("jobs[{i}] would overwrite its input {}", job.input.display());
            }
            if !outputs.insert(job.output.clone()) {
                bail!(
                    "output {} is written by more than one job",
                    job.output.display()
                );
            }

            if job.counter_column.as_deref() == Some("") {
                bail!("jobs[{i}].counter_column must not be empty when set");
            }
            if job.output_column.as_deref() == Some("") {
                bail!("jobs[{i}].output_column must not be empty when set");
            }
        }

        Ok(())
    }
}
