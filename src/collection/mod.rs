//! Tables gathered from a single collection run.

use std::collections::BTreeMap;

use tracing::debug;

use crate::normalize::{columns, Normalized, OutputMode};
use crate::table::kind::{CollectionTable, PerfCounterTable, TableKind};
use crate::table::{Table, TableError};

/// The counter tables of one collection run, keyed by table name.
///
/// Each kind appears at most once; the collector already deduplicates to
/// one table per (run, kind).
#[derive(Debug, Clone, Default)]
pub struct CollectionData {
    collection_id: Option<String>,
    tables: BTreeMap<TableKind, PerfCounterTable>,
}

impl CollectionData {
    /// Builds a collection from typed tables.
    pub fn from_tables(tables: Vec<PerfCounterTable>) -> Result<Self, TableError> {
        let mut by_kind = BTreeMap::new();
        for table in tables {
            let kind = table.kind();
            if by_kind.insert(kind, table).is_some() {
                return Err(TableError::DuplicateTable {
                    name: kind.as_str().to_string(),
                });
            }
        }
        Ok(Self {
            collection_id: None,
            tables: by_kind,
        })
    }

    /// Resolves each table name through the registry and builds typed tables.
    pub fn from_named_tables<I, S>(tables: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, Table)>,
        S: AsRef<str>,
    {
        let typed = tables
            .into_iter()
            .map(|(name, table)| {
                let kind = TableKind::from_name(name.as_ref())?;
                PerfCounterTable::from_table(kind, table)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tables(typed)
    }

    /// Like [`from_named_tables`](Self::from_named_tables), stamping every
    /// row of every table with `collection_id`.
    pub fn with_collection_id<I, S>(collection_id: &str, tables: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, Table)>,
        S: AsRef<str>,
    {
        let typed = tables
            .into_iter()
            .map(|(name, table)| {
                let kind = TableKind::from_name(name.as_ref())?;
                PerfCounterTable::from_table_with_collection_id(kind, table, collection_id)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut data = Self::from_tables(typed)?;
        data.collection_id = Some(collection_id.to_string());
        Ok(data)
    }

    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    pub fn get(&self, kind: TableKind) -> Option<&PerfCounterTable> {
        self.tables.get(&kind)
    }

    /// Tables in kind declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &PerfCounterTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Normalizes every table with its kind's default column names.
    pub fn normalize(
        &self,
        mode: OutputMode,
    ) -> Result<BTreeMap<&'static str, Normalized>, TableError> {
        let mut out = BTreeMap::new();
        for table in self.tables.values() {
            out.insert(table.name(), table.normalize(mode)?);
        }
        debug!(
            collection_id = self.collection_id().unwrap_or("-"),
            tables = out.len(),
            mode = %mode,
            "normalized collection",
        );
        Ok(out)
    }

    /// Sample timestamps as seconds since the collection started.
    ///
    /// Returns `None` if `table` has no timestamp column. Null timestamps
    /// map to `NaN`.
    pub fn normalize_uptime_sec(table: &Table, start_uptime_sec: i64) -> Option<Vec<f64>> {
        let start = start_uptime_sec as f64;
        Some(
            table
                .column_f64(columns::TS_UPTIME_US)?
                .into_iter()
                .map(|ts_us| ts_us / 1_000_000.0 - start)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::kind::COLLECTION_ID;
    use crate::table::{Row, Value};

    fn counter_table(kind: TableKind, rows: &[[i64; 7]]) -> Table {
        let rows: Vec<Row> = rows
            .iter()
            .map(|r| r.iter().map(|v| Value::Int(*v)).collect())
            .collect();
        Table::new(kind.schema(), rows).expect("valid table")
    }

    fn scenario(kind: TableKind) -> Table {
        counter_table(
            kind,
            &[
                [0, 7, 7, 100_000_000, 1000, 50, 50],
                [0, 7, 7, 200_000_000, 1500, 100, 80],
                [0, 7, 7, 300_000_000, 1800, 140, 100],
            ],
        )
    }

    #[test]
    fn test_from_named_tables_resolves_kinds() {
        let data = CollectionData::from_named_tables(vec![
            ("dtlb_misses", scenario(TableKind::DtlbMisses)),
            ("llc_misses", scenario(TableKind::LlcMisses)),
        ])
        .expect("collection");

        assert_eq!(data.len(), 2);
        assert!(data.get(TableKind::DtlbMisses).is_some());
        assert!(data.get(TableKind::ItlbMisses).is_none());
        assert!(data.collection_id().is_none());
    }

    #[test]
    fn test_unknown_table_name_rejected() {
        let err = CollectionData::from_named_tables(vec![(
            "system_info",
            scenario(TableKind::DtlbMisses),
        )])
        .unwrap_err();
        assert_eq!(
            err,
            TableError::UnknownTable {
                name: "system_info".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let a = PerfCounterTable::from_table(TableKind::DtlbMisses, scenario(TableKind::DtlbMisses))
            .expect("typed");
        let err = CollectionData::from_tables(vec![a.clone(), a]).unwrap_err();
        assert_eq!(
            err,
            TableError::DuplicateTable {
                name: "dtlb_misses".to_string()
            }
        );
    }

    #[test]
    fn test_with_collection_id_stamps_every_table() {
        let data = CollectionData::with_collection_id(
            "run-42",
            vec![
                ("dtlb_misses", scenario(TableKind::DtlbMisses)),
                ("itlb_misses", scenario(TableKind::ItlbMisses)),
            ],
        )
        .expect("collection");

        assert_eq!(data.collection_id(), Some("run-42"));
        for table in data.tables() {
            assert!(table
                .table()
                .column(COLLECTION_ID)
                .expect("stamped")
                .all(|v| v.as_str() == Some("run-42")));
        }
    }

    #[test]
    fn test_normalize_every_table() {
        let data = CollectionData::from_named_tables(vec![
            ("dtlb_misses", scenario(TableKind::DtlbMisses)),
            ("branch_misses", scenario(TableKind::BranchMisses)),
        ])
        .expect("collection");

        let out = data.normalize(OutputMode::Cumulative).expect("normalized");
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), ["branch_misses", "dtlb_misses"]);

        let dtlb = out["dtlb_misses"]
            .table
            .column_f64("dtlb_misses")
            .expect("derived");
        assert_eq!(dtlb.len(), 3);
        assert!((dtlb[2] - 1450.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_uptime_sec() {
        let secs = CollectionData::normalize_uptime_sec(&scenario(TableKind::DtlbMisses), 100)
            .expect("timestamps");
        assert_eq!(secs, vec![0.0, 100.0, 200.0]);
    }
}
