//! Ordered table schemas and normalized column types
//!
//! Every gateway reports column types in its own engine vocabulary (`INT64`,
//! `bigint`, `NVARCHAR(50)`, ...). [`LogicalType::from_engine_type`] maps them onto
//! one family so schemas from different engines can be compared position by
//! position.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Normalized column type family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Float,
    Numeric,
    Boolean,
    String,
    Bytes,
    Date,
    Datetime,
    Time,
    Timestamp,
    Other(String),
}

impl LogicalType {
    /// Maps an engine-specific type name onto a logical type
    ///
    /// Length and precision parameters (`VARCHAR(255)`, `NUMERIC(10,2)`) are
    /// ignored and matching is case-insensitive.
    pub fn from_engine_type(raw: &str) -> Self {
        let base = raw.split('(').next().unwrap_or(raw);
        let normalized = base.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = normalized.to_ascii_uppercase();

        match upper.as_str() {
            "INTEGER" | "INT" | "INT64" | "BIGINT" | "SMALLINT" | "TINYINT" | "INT2"
            | "INT4" | "INT8" | "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => LogicalType::Integer,
            "FLOAT" | "FLOAT64" | "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE"
            | "DOUBLE PRECISION" => LogicalType::Float,
            "NUMERIC" | "BIGNUMERIC" | "DECIMAL" | "BIGDECIMAL" | "MONEY" | "SMALLMONEY" => {
                LogicalType::Numeric
            }
            "BOOL" | "BOOLEAN" | "BIT" => LogicalType::Boolean,
            "STRING" | "VARCHAR" | "NVARCHAR" | "TEXT" | "NTEXT" | "CHAR" | "NCHAR"
            | "CHARACTER" | "CHARACTER VARYING" | "BPCHAR" | "CITEXT" | "UUID"
            | "UNIQUEIDENTIFIER" => LogicalType::String,
            "BYTES" | "BYTEA" | "BINARY" | "VARBINARY" => LogicalType::Bytes,
            "DATE" => LogicalType::Date,
            "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "TIMESTAMP WITHOUT TIME ZONE" => {
                LogicalType::Datetime
            }
            "TIME" | "TIME WITHOUT TIME ZONE" | "TIME WITH TIME ZONE" => LogicalType::Time,
            "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" | "DATETIMEOFFSET" => {
                LogicalType::Timestamp
            }
            "JSON" | "JSONB" => LogicalType::Other("JSON".to_string()),
            _ => LogicalType::Other(upper),
        }
    }

    /// Whether two types describe the same kind of column
    ///
    /// Zone-less datetimes and timestamps are treated as one temporal family,
    /// since warehouses autodetect CSV timestamps as zoned values.
    pub fn compatible_with(&self, other: &LogicalType) -> bool {
        use LogicalType::*;
        match (self, other) {
            (Datetime, Timestamp) | (Timestamp, Datetime) => true,
            (a, b) => a == b,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::Integer | LogicalType::Float | LogicalType::Numeric
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            LogicalType::Date | LogicalType::Datetime | LogicalType::Timestamp
        )
    }

    /// Warehouse type name used when declaring this column
    pub fn as_str(&self) -> &str {
        match self {
            LogicalType::Integer => "INTEGER",
            LogicalType::Float => "FLOAT",
            LogicalType::Numeric => "NUMERIC",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::String => "STRING",
            LogicalType::Bytes => "BYTES",
            LogicalType::Date => "DATE",
            LogicalType::Datetime => "DATETIME",
            LogicalType::Time => "TIME",
            LogicalType::Timestamp => "TIMESTAMP",
            LogicalType::Other(name) => name,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(LogicalType::from_engine_type(&raw))
    }
}

/// One column of an ordered schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: LogicalType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered sequence of columns; position is significant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Position of a column, matched case-insensitively
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
