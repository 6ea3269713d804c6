//! Multiplex-corrected views of cumulative PMU counter tables.
//!
//! When more counters are requested than the PMU has slots, the kernel
//! time-shares slots and each sample reports how long the counter was
//! enabled vs. actually running. Differencing the raw counter ignores that
//! gap; here every per-span delta is scaled by the running/enabled ratio of
//! its span before it is reported.
//!
//! [`as_rate`] yields the corrected per-span value, [`as_cumulative`] its
//! running total. Both work per CPU, in timestamp order, and leave every
//! other column untouched.

pub mod partition;
pub mod span;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::table::{DataType, Field, Schema, SchemaMismatch, Table, TableError, Value};

use self::partition::{partition_by_cpu, Sample};
use self::span::{correct_spans, prefix_sum, CounterReading, Reading};

/// Column names the normalizer reads and writes.
pub mod columns {
    pub const TS_UPTIME_US: &str = "ts_uptime_us";
    pub const CPU: &str = "cpu";
    pub const PMU_ENABLED_TIME_US: &str = "pmu_enabled_time_us";
    pub const PMU_RUNNING_TIME_US: &str = "pmu_running_time_us";
    pub const SPAN_DURATION_US: &str = "span_duration_us";
}

/// Label used in errors for tables without a registry name.
const UNNAMED_TABLE: &str = "samples";

/// Which derived view to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Corrected value per sample span.
    #[serde(alias = "pdf")]
    Rate,
    /// Per-CPU running total of the corrected values.
    #[serde(alias = "cdf")]
    Cumulative,
}

impl OutputMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rate => "rate",
            Self::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate" | "pdf" => Ok(Self::Rate),
            "cumulative" | "cdf" => Ok(Self::Cumulative),
            other => Err(format!(
                "unknown output mode {other:?} (expected rate or cumulative)"
            )),
        }
    }
}

/// Result of one normalization call.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: Table,
    /// Number of CPU partitions seen.
    pub partitions: usize,
    /// Spans with no defined corrected value (stalled enabled time or a
    /// non-finite counter); their value is `NaN`.
    pub degenerate_spans: usize,
}

/// Corrected per-span values of `counter_column`, written to `output_column`.
pub fn as_rate(
    table: &Table,
    counter_column: &str,
    output_column: &str,
) -> Result<Table, TableError> {
    normalize(
        table,
        UNNAMED_TABLE,
        counter_column,
        output_column,
        OutputMode::Rate,
    )
    .map(|n| n.table)
}

/// Per-CPU running totals of the corrected values, written to `output_column`.
pub fn as_cumulative(
    table: &Table,
    counter_column: &str,
    output_column: &str,
) -> Result<Table, TableError> {
    normalize(
        table,
        UNNAMED_TABLE,
        counter_column,
        output_column,
        OutputMode::Cumulative,
    )
    .map(|n| n.table)
}

/// Normalizes `counter_column` of `table`.
///
/// The output drops the counter and both PMU time columns, keeps every
/// other column, and appends `output_column` (`f64`) followed by
/// `span_duration_us` (`i64`). Rows are grouped by ascending CPU and
/// ordered by timestamp within a CPU. The schema is fully validated before
/// any row is processed; `table_name` only labels errors and logs.
pub fn normalize(
    table: &Table,
    table_name: &str,
    counter_column: &str,
    output_column: &str,
    mode: OutputMode,
) -> Result<Normalized, TableError> {
    let mismatch = |e: SchemaMismatch| TableError::mismatch(table_name, e);

    let layout = InputLayout::resolve(table.schema(), counter_column).map_err(mismatch)?;
    let output_schema = layout
        .output_schema(table.schema(), output_column)
        .map_err(mismatch)?;
    let samples = layout.samples(table).map_err(mismatch)?;

    let partitions = partition_by_cpu(samples);
    let mut rows = Vec::with_capacity(table.num_rows());
    let mut degenerate_spans = 0;

    for samples in partitions.values() {
        let readings: Vec<Reading> = samples.iter().map(|s| s.reading).collect();
        let spans = correct_spans(&readings);
        degenerate_spans += spans.iter().filter(|s| s.is_degenerate()).count();

        let values: Vec<Option<f64>> = match mode {
            OutputMode::Rate => spans.iter().map(|s| s.value).collect(),
            OutputMode::Cumulative => prefix_sum(&spans),
        };

        for ((sample, span), value) in samples.iter().zip(&spans).zip(values) {
            let source = &table.rows()[sample.row];
            let mut row = Vec::with_capacity(output_schema.len());
            row.extend(layout.pass_through.iter().map(|&i| source[i].clone()));
            row.push(Value::Float(value.unwrap_or(f64::NAN)));
            row.push(Value::Int(span.span_duration_us));
            rows.push(row);
        }
    }

    debug!(
        table = table_name,
        counter = counter_column,
        mode = %mode,
        rows = rows.len(),
        partitions = partitions.len(),
        "normalized counter table",
    );

    if degenerate_spans > 0 {
        warn!(
            table = table_name,
            counter = counter_column,
            degenerate_spans,
            "spans without a finite corrected value set to NaN",
        );
    }

    Ok(Normalized {
        table: Table::from_parts_unchecked(output_schema, rows),
        partitions: partitions.len(),
        degenerate_spans,
    })
}

/// Column positions of the inputs the correction reads.
struct InputLayout {
    ts: usize,
    cpu: usize,
    enabled: usize,
    running: usize,
    counter: usize,
    /// Input columns copied to the output, in input order.
    pass_through: Vec<usize>,
}

impl InputLayout {
    fn resolve(schema: &Schema, counter_column: &str) -> Result<Self, SchemaMismatch> {
        schema.check_required(&[
            Field::new(columns::TS_UPTIME_US, DataType::Int64),
            Field::new(columns::CPU, DataType::Int64),
            Field::new(columns::PMU_ENABLED_TIME_US, DataType::Int64),
            Field::new(columns::PMU_RUNNING_TIME_US, DataType::Int64),
        ])?;

        let counter = schema
            .index_of(counter_column)
            .ok_or_else(|| SchemaMismatch::MissingColumn {
                column: counter_column.to_string(),
            })?;
        let counter_dtype = schema.fields()[counter].dtype;
        if !matches!(counter_dtype, DataType::Int64 | DataType::Float64) {
            return Err(SchemaMismatch::WrongType {
                column: counter_column.to_string(),
                expected: DataType::Int64,
                found: counter_dtype,
            });
        }

        // Presence was checked above.
        let index = |name: &str| schema.index_of(name).unwrap_or_default();
        let enabled = index(columns::PMU_ENABLED_TIME_US);
        let running = index(columns::PMU_RUNNING_TIME_US);
        let pass_through = (0..schema.len())
            .filter(|i| ![counter, enabled, running].contains(i))
            .collect();

        Ok(Self {
            ts: index(columns::TS_UPTIME_US),
            cpu: index(columns::CPU),
            enabled,
            running,
            counter,
            pass_through,
        })
    }

    fn output_schema(&self, input: &Schema, output_column: &str) -> Result<Schema, SchemaMismatch> {
        let mut fields: Vec<Field> = self
            .pass_through
            .iter()
            .map(|&i| input.fields()[i].clone())
            .collect();
        fields.push(Field::new(output_column, DataType::Float64));
        fields.push(Field::new(columns::SPAN_DURATION_US, DataType::Int64));
        Schema::new(fields)
    }

    fn samples(&self, table: &Table) -> Result<Vec<Sample>, SchemaMismatch> {
        let schema = table.schema();
        let int_at = |row: &[Value], col: usize, row_idx: usize| {
            row[col].as_i64().ok_or_else(|| SchemaMismatch::NullValue {
                column: schema.fields()[col].name.clone(),
                row: row_idx,
            })
        };

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                let row = row.as_slice();
                let counter = match &row[self.counter] {
                    Value::Int(v) => CounterReading::Int(*v),
                    Value::Float(v) => CounterReading::Float(*v),
                    _ => {
                        return Err(SchemaMismatch::NullValue {
                            column: schema.fields()[self.counter].name.clone(),
                            row: row_idx,
                        })
                    }
                };
                Ok(Sample {
                    row: row_idx,
                    cpu: int_at(row, self.cpu, row_idx)?,
                    ts_uptime_us: int_at(row, self.ts, row_idx)?,
                    reading: Reading {
                        counter,
                        enabled_us: int_at(row, self.enabled, row_idx)?,
                        running_us: int_at(row, self.running, row_idx)?,
                    },
                })
            })
            .collect()
    }
}
