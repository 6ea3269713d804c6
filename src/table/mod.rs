//! Row-major typed tables.
//!
//! A [`Table`] pairs a [`Schema`] with rows of dynamically typed [`Value`]s.
//! Every row has exactly one value per column, and every non-null value
//! matches its column's declared [`DataType`]. Tables are immutable once
//! built; every transform returns a new table.

pub mod json;
pub mod kind;
pub mod schema;

use std::sync::Arc;

pub use self::schema::{DataType, Field, Schema, SchemaMismatch, TableError};

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bool(bool),
}

impl Value {
    /// Type of a non-null value.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int64),
            Self::Float(_) => Some(DataType::Float64),
            Self::Str(_) => Some(DataType::Utf8),
            Self::Bool(_) => Some(DataType::Bool),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// One table row, in schema column order.
pub type Row = Vec<Value>;

/// Immutable, schema-bearing, row-major table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table, checking row widths and cell types against `schema`.
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self, SchemaMismatch> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(SchemaMismatch::RowWidth {
                    row: i,
                    expected: schema.len(),
                    found: row.len(),
                });
            }
            for (value, field) in row.iter().zip(schema.fields()) {
                if let Some(found) = value.dtype() {
                    if found != field.dtype {
                        return Err(SchemaMismatch::WrongType {
                            column: field.name.clone(),
                            expected: field.dtype,
                            found,
                        });
                    }
                }
            }
        }
        Ok(Self { schema, rows })
    }

    /// Builds a table without validation; callers guarantee the row shape.
    pub(crate) fn from_parts_unchecked(schema: Schema, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == schema.len()));
        Self { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    /// Iterates the values of the named column, or `None` if it does not exist.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Numeric column as `f64`, with nulls and non-numeric cells as `NaN`.
    ///
    /// This is the plain x/y data handed to plotting consumers.
    pub fn column_f64(&self, name: &str) -> Option<Vec<f64>> {
        Some(
            self.column(name)?
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    /// Returns a copy with a constant column added, or replaced if the name exists.
    pub fn with_literal_column(&self, name: &str, value: Value) -> Result<Self, SchemaMismatch> {
        let Some(dtype) = value.dtype() else {
            return Err(SchemaMismatch::NullLiteral {
                column: name.to_string(),
            });
        };

        let schema = self.schema.with_field(Field::new(name, dtype));
        let replace_at = self.schema.index_of(name);
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                match replace_at {
                    Some(idx) => row[idx] = value.clone(),
                    None => row.push(value.clone()),
                }
                row
            })
            .collect();

        Ok(Self::from_parts_unchecked(schema, rows))
    }

    /// Returns a copy with a `Float64` column holding one value per row.
    pub fn with_float_column(&self, name: &str, values: Vec<f64>) -> Result<Self, SchemaMismatch> {
        if values.len() != self.rows.len() {
            return Err(SchemaMismatch::RowWidth {
                row: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }

        let schema = self
            .schema
            .with_field(Field::new(name, DataType::Float64));
        let replace_at = self.schema.index_of(name);
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, v)| {
                let mut row = row.clone();
                match replace_at {
                    Some(idx) => row[idx] = Value::Float(v),
                    None => row.push(Value::Float(v)),
                }
                row
            })
            .collect();

        Ok(Self::from_parts_unchecked(schema, rows))
    }

    /// Returns a copy keeping only rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&Row) -> bool) -> Self {
        Self::from_parts_unchecked(
            self.schema.clone(),
            self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        )
    }

    /// Projects the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, SchemaMismatch> {
        let mut indices = Vec::with_capacity(names.len());
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| SchemaMismatch::MissingColumn {
                    column: (*name).to_string(),
                })?;
            indices.push(idx);
            fields.push(self.schema.fields()[idx].clone());
        }
        let schema = Schema::new(fields)?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self::from_parts_unchecked(schema, rows))
    }
}
