//! Runs configured normalization jobs against JSON record files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::collection::CollectionData;
use crate::config::{Config, JobConfig};
use crate::normalize;
use crate::table::json::{read_records, write_records};
use crate::table::kind::{CollectionTable, PerfCounterTable};
use crate::table::TableError;

/// Column added to outputs when the run has a collection start time.
pub const UPTIME_SEC: &str = "uptime_sec";

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub table: String,
    pub input_rows: usize,
    /// Rows left after best-effort filtering.
    pub kept_rows: usize,
    pub partitions: usize,
    pub degenerate_spans: usize,
}

/// Runs every job in `cfg`, stopping at the first failure.
pub fn run_all(cfg: &Config) -> Result<Vec<JobSummary>> {
    cfg.jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            run_job(job, cfg).with_context(|| format!("jobs[{i}] ({})", job.table))
        })
        .collect()
}

/// Reads the job's input, normalizes it, and writes the derived table.
///
/// Run-wide settings (collection id, filtering, uptime origin) come from `cfg`.
pub fn run_job(job: &JobConfig, cfg: &Config) -> Result<JobSummary> {
    let kind = job.kind()?;

    let file = File::open(&job.input)
        .with_context(|| format!("opening input {}", job.input.display()))?;
    let raw = read_records(BufReader::new(file), Some(&kind.schema()))
        .with_context(|| format!("reading records from {}", job.input.display()))?;

    let typed = match cfg.collection_id.as_deref() {
        Some(id) => PerfCounterTable::from_table_with_collection_id(kind, raw, id)?,
        None => PerfCounterTable::from_table(kind, raw)?,
    };

    let input_rows = typed.table().num_rows();
    let cleaned = if cfg.filter_invalid_rows {
        typed.filtered_table()
    } else {
        typed.table().clone()
    };

    let normalized = normalize::normalize(
        &cleaned,
        kind.as_str(),
        job.counter_column(kind),
        job.output_column(kind),
        job.mode,
    )?;

    let output = match cfg.start_uptime_sec {
        Some(start) => {
            let secs = CollectionData::normalize_uptime_sec(&normalized.table, start)
                .context("derived table lost its timestamp column")?;
            normalized
                .table
                .with_float_column(UPTIME_SEC, secs)
                .map_err(|e| TableError::mismatch(kind.as_str(), e))?
        }
        None => normalized.table,
    };

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let file = File::create(&job.output)
        .with_context(|| format!("creating output {}", job.output.display()))?;
    let mut writer = BufWriter::new(file);
    write_records(&output, &mut writer)
        .with_context(|| format!("writing records to {}", job.output.display()))?;
    writer.flush().context("flushing output")?;

    let summary = JobSummary {
        table: kind.as_str().to_string(),
        input_rows,
        kept_rows: cleaned.num_rows(),
        partitions: normalized.partitions,
        degenerate_spans: normalized.degenerate_spans,
    };

    info!(
        table = %summary.table,
        mode = %job.mode,
        input_rows = summary.input_rows,
        kept_rows = summary.kept_rows,
        partitions = summary.partitions,
        output = %job.output.display(),
        "wrote normalized table",
    );

    Ok(summary)
}
