//! JSON record-array interchange for tables.
//!
//! Tables are read from and written to arrays of flat objects, one object
//! per row:
//!
//! ```json
//! [{"cpu": 0, "ts_uptime_us": 100, "cumulative_dtlb_misses": 1000}]
//! ```
//!
//! Column order follows first appearance across records. A schema hint fixes
//! the type of the columns it names; other columns are inferred. `NaN` and
//! infinite floats are written as `null`.

use std::io::{Read, Write};

use serde_json::{Map, Number};
use thiserror::Error;

use super::schema::{DataType, Field, Schema, SchemaMismatch};
use super::{Row, Table, Value};

/// Errors that can occur while converting JSON records.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("decoding records: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of records")]
    NotAnArray,

    #[error("record {row} is not a JSON object")]
    NotAnObject { row: usize },

    #[error("record {row}: column {column} holds a nested value")]
    Nested { row: usize, column: String },

    #[error("record {row}: column {column} is not a valid {expected} value")]
    TypeConflict {
        row: usize,
        column: String,
        expected: DataType,
    },

    #[error(transparent)]
    Schema(#[from] SchemaMismatch),
}

/// Reads a record array into a table.
pub fn read_records<R: Read>(reader: R, hint: Option<&Schema>) -> Result<Table, RecordError> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    records_to_table(value, hint)
}

/// Converts an already-parsed record array into a table.
pub fn records_to_table(
    value: serde_json::Value,
    hint: Option<&Schema>,
) -> Result<Table, RecordError> {
    let serde_json::Value::Array(items) = value else {
        return Err(RecordError::NotAnArray);
    };

    let mut records = Vec::with_capacity(items.len());
    for (row, item) in items.into_iter().enumerate() {
        match item {
            serde_json::Value::Object(map) => records.push(map),
            _ => return Err(RecordError::NotAnObject { row }),
        }
    }

    let mut names: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let dtype = match hint.and_then(|h| h.field(&name)) {
            Some(field) => field.dtype,
            None => infer_dtype(&records, &name)?,
        };
        fields.push(Field::new(name, dtype));
    }
    let schema = Schema::new(fields)?;

    let rows = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            schema
                .fields()
                .iter()
                .map(|field| match record.get(&field.name) {
                    None => Ok(Value::Null),
                    Some(v) => convert(v, field, row),
                })
                .collect::<Result<Row, RecordError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Table::new(schema, rows)?)
}

/// Writes `table` as a record array.
pub fn write_records<W: Write>(table: &Table, writer: W) -> Result<(), RecordError> {
    serde_json::to_writer(writer, &table_to_records(table))?;
    Ok(())
}

/// Converts `table` into a record array.
pub fn table_to_records(table: &Table) -> serde_json::Value {
    let names: Vec<&str> = table.schema().names().collect();
    serde_json::Value::Array(
        table
            .rows()
            .iter()
            .map(|row| {
                let map: Map<String, serde_json::Value> = names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| ((*name).to_string(), to_json(value)))
                    .collect();
                serde_json::Value::Object(map)
            })
            .collect(),
    )
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(v) => serde_json::Value::from(*v),
        Value::Float(v) => Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
    }
}

fn infer_dtype(
    records: &[Map<String, serde_json::Value>],
    name: &str,
) -> Result<DataType, RecordError> {
    let mut inferred: Option<DataType> = None;
    for (row, record) in records.iter().enumerate() {
        let dtype = match record.get(name) {
            None | Some(serde_json::Value::Null) => continue,
            Some(serde_json::Value::Bool(_)) => DataType::Bool,
            Some(serde_json::Value::String(_)) => DataType::Utf8,
            Some(serde_json::Value::Number(n)) if n.is_i64() => DataType::Int64,
            Some(serde_json::Value::Number(_)) => DataType::Float64,
            Some(_) => {
                return Err(RecordError::Nested {
                    row,
                    column: name.to_string(),
                })
            }
        };
        inferred = Some(match (inferred, dtype) {
            (None, dtype) => dtype,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            (Some(expected), _) => {
                return Err(RecordError::TypeConflict {
                    row,
                    column: name.to_string(),
                    expected,
                })
            }
        });
    }
    Ok(inferred.unwrap_or(DataType::Utf8))
}

fn convert(value: &serde_json::Value, field: &Field, row: usize) -> Result<Value, RecordError> {
    let conflict = || RecordError::TypeConflict {
        row,
        column: field.name.clone(),
        expected: field.dtype,
    };
    match (field.dtype, value) {
        (_, serde_json::Value::Null) => Ok(Value::Null),
        (_, serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            Err(RecordError::Nested {
                row,
                column: field.name.clone(),
            })
        }
        (DataType::Int64, serde_json::Value::Number(n)) => {
            n.as_i64().map(Value::Int).ok_or_else(conflict)
        }
        (DataType::Float64, serde_json::Value::Number(n)) => {
            n.as_f64().map(Value::Float).ok_or_else(conflict)
        }
        (DataType::Utf8, serde_json::Value::String(s)) => Ok(Value::from(s.as_str())),
        (DataType::Bool, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
        _ => Err(conflict()),
    }
}
