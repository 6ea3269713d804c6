use std::fmt;

use thiserror::Error;

/// Column type of a [`Table`](super::Table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    Float64,
    Utf8,
    Bool,
}

impl DataType {
    /// Returns the canonical type label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int64 => "i64",
            Self::Float64 => "f64",
            Self::Utf8 => "str",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub dtype: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// The specific way a table failed to satisfy a schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatch {
    #[error("missing column {column}")]
    MissingColumn { column: String },

    #[error("column {column} has type {found}, expected {expected}")]
    WrongType {
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("column {column} is null at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column {column} cannot be filled with a null literal")]
    NullLiteral { column: String },

    #[error("row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column {column}")]
    DuplicateColumn { column: String },
}

/// Errors raised while building or validating tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("schema mismatch in table {table}: {source}")]
    SchemaMismatch {
        table: String,
        #[source]
        source: SchemaMismatch,
    },

    #[error("unknown table kind: {name}")]
    UnknownTable { name: String },

    #[error("table {name} appears more than once in a collection")]
    DuplicateTable { name: String },
}

impl TableError {
    pub(crate) fn mismatch(table: &str, source: SchemaMismatch) -> Self {
        Self::SchemaMismatch {
            table: table.to_string(),
            source,
        }
    }
}

/// Ordered list of column declarations. Column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate column names.
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaMismatch> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaMismatch::DuplicateColumn {
                    column: field.name.clone(),
                });
            }
        }
        Ok(Self { fields })
    }

    /// Builds a schema from a static declaration.
    pub(crate) fn from_static(decl: &[(&str, DataType)]) -> Self {
        Self {
            fields: decl
                .iter()
                .map(|(name, dtype)| Field::new(*name, *dtype))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the named column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Checks that every required field is present with the declared type.
    /// Extra columns are allowed.
    pub fn check_required(&self, required: &[Field]) -> Result<(), SchemaMismatch> {
        for req in required {
            let Some(found) = self.field(&req.name) else {
                return Err(SchemaMismatch::MissingColumn {
                    column: req.name.clone(),
                });
            };
            if found.dtype != req.dtype {
                return Err(SchemaMismatch::WrongType {
                    column: req.name.clone(),
                    expected: req.dtype,
                    found: found.dtype,
                });
            }
        }
        Ok(())
    }

    /// Returns a schema with `field` appended, or replacing a same-named column in place.
    pub(crate) fn with_field(&self, field: Field) -> Self {
        let mut fields = self.fields.clone();
        match fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => fields.push(field),
        }
        Self { fields }
    }
}
