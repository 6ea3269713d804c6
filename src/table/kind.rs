//! Typed counter tables and the name → kind registry.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use super::schema::{DataType, Field, Schema, SchemaMismatch, TableError};
use super::{Table, Value};
use crate::normalize::{self, columns, Normalized, OutputMode};

/// Column stamped by [`CollectionTable::from_table_with_collection_id`].
pub const COLLECTION_ID: &str = "collection_id";

/// Contract shared by every table kind fed through the normalizer.
pub trait CollectionTable: Sized {
    /// Stable registry name of this table's kind.
    fn name(&self) -> &'static str;

    /// Fixed column declaration of this table's kind.
    fn schema(&self) -> Schema;

    /// Read-only access to the underlying rows.
    fn table(&self) -> &Table;

    /// Best-effort view with structurally invalid rows removed.
    ///
    /// This is a data-cleaning heuristic. It never fails; suspicious rows are
    /// dropped rather than reported, so a clean result says nothing about
    /// the correctness of the remaining samples.
    fn filtered_table(&self) -> Table;

    /// Builds the typed table from an untyped one.
    fn from_table(kind: TableKind, table: Table) -> Result<Self, TableError>;

    /// Stamps every row with `collection_id`, then builds the typed table.
    fn from_table_with_collection_id(
        kind: TableKind,
        table: Table,
        collection_id: &str,
    ) -> Result<Self, TableError> {
        let stamped = table
            .with_literal_column(COLLECTION_ID, Value::from(collection_id))
            .map_err(|e| TableError::mismatch(kind.as_str(), e))?;
        Self::from_table(kind, stamped)
    }
}

/// PMU counter table kinds written by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    DtlbMisses,
    ItlbMisses,
    LlcMisses,
    BranchMisses,
}

impl TableKind {
    /// Returns the canonical table name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DtlbMisses => "dtlb_misses",
            Self::ItlbMisses => "itlb_misses",
            Self::LlcMisses => "llc_misses",
            Self::BranchMisses => "branch_misses",
        }
    }

    /// Cumulative counter column normalized for this kind.
    pub const fn counter_column(self) -> &'static str {
        match self {
            Self::DtlbMisses => "cumulative_dtlb_misses",
            Self::ItlbMisses => "cumulative_itlb_misses",
            Self::LlcMisses => "cumulative_llc_misses",
            Self::BranchMisses => "cumulative_branch_misses",
        }
    }

    /// Default name of the derived column.
    pub const fn derived_column(self) -> &'static str {
        self.as_str()
    }

    /// Resolves a table name through the process-wide registry.
    pub fn from_name(name: &str) -> Result<Self, TableError> {
        REGISTRY
            .get(name)
            .copied()
            .ok_or_else(|| TableError::UnknownTable {
                name: name.to_string(),
            })
    }

    /// Return all kinds in declaration order.
    pub fn all() -> &'static [Self] {
        &[
            Self::DtlbMisses,
            Self::ItlbMisses,
            Self::LlcMisses,
            Self::BranchMisses,
        ]
    }

    /// Fixed schema for this kind. `collection_id` is optional and not listed.
    pub fn schema(self) -> Schema {
        Schema::from_static(&[
            (columns::CPU, DataType::Int64),
            ("pid", DataType::Int64),
            ("tgid", DataType::Int64),
            (columns::TS_UPTIME_US, DataType::Int64),
            (self.counter_column(), DataType::Int64),
            (columns::PMU_ENABLED_TIME_US, DataType::Int64),
            (columns::PMU_RUNNING_TIME_US, DataType::Int64),
        ])
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name → kind map, built once on first lookup and read-only afterwards.
static REGISTRY: Lazy<HashMap<&'static str, TableKind>> = Lazy::new(|| {
    TableKind::all()
        .iter()
        .map(|kind| (kind.as_str(), *kind))
        .collect()
});

/// A validated PMU counter table.
#[derive(Debug, Clone)]
pub struct PerfCounterTable {
    kind: TableKind,
    table: Table,
}

impl PerfCounterTable {
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Per-span multiplex-corrected rate using the kind's column names.
    pub fn as_rate(&self) -> Result<Normalized, TableError> {
        self.normalize(OutputMode::Rate)
    }

    /// Per-CPU running total using the kind's column names.
    pub fn as_cumulative(&self) -> Result<Normalized, TableError> {
        self.normalize(OutputMode::Cumulative)
    }

    pub fn normalize(&self, mode: OutputMode) -> Result<Normalized, TableError> {
        normalize::normalize(
            &self.table,
            self.kind.as_str(),
            self.kind.counter_column(),
            self.kind.derived_column(),
            mode,
        )
    }
}

impl CollectionTable for PerfCounterTable {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn schema(&self) -> Schema {
        self.kind.schema()
    }

    fn table(&self) -> &Table {
        &self.table
    }

    fn filtered_table(&self) -> Table {
        let schema = self.table.schema();
        let required: Vec<usize> = self
            .kind
            .schema()
            .names()
            .filter_map(|name| schema.index_of(name))
            .collect();
        let ts = schema.index_of(columns::TS_UPTIME_US);
        let enabled = schema.index_of(columns::PMU_ENABLED_TIME_US);
        let running = schema.index_of(columns::PMU_RUNNING_TIME_US);

        self.table.filter_rows(|row| {
            if required.iter().any(|&i| row[i].is_null()) {
                return false;
            }
            if let Some(ts) = ts.and_then(|i| row[i].as_i64()) {
                if ts < 0 {
                    return false;
                }
            }
            match (
                enabled.and_then(|i| row[i].as_i64()),
                running.and_then(|i| row[i].as_i64()),
            ) {
                (Some(enabled), Some(running)) => running <= enabled,
                _ => true,
            }
        })
    }

    fn from_table(kind: TableKind, table: Table) -> Result<Self, TableError> {
        let mut required = kind.schema().fields().to_vec();
        if table.schema().field(COLLECTION_ID).is_some() {
            required.push(Field::new(COLLECTION_ID, DataType::Utf8));
        }
        table
            .schema()
            .check_required(&required)
            .map_err(|e: SchemaMismatch| TableError::mismatch(kind.as_str(), e))?;
        Ok(Self { kind, table })
    }
}
