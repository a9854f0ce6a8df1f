//! Resolved per-service run descriptors and discovered source entities

use super::ids::{DatasetId, ServiceName, TableId};
use serde::{Deserialize, Serialize};

/// Everything the core needs to know about one service for one run
///
/// Built once at startup from configuration templates; never re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: ServiceName,
    pub dataset: DatasetId,
    /// Directory or object prefix holding the service's CSV files
    pub source_prefix: String,
    /// Schema holding the service's tables in the relational source
    pub relational_schema: String,
    /// Region the destination dataset is expected to live in
    pub region: String,
}

/// One file or source table, mapped to exactly one destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntity {
    pub id: TableId,
    /// Name as it appears at the source (file name or source table name)
    pub artifact: String,
    /// Full path, object name, or qualified table the gateway reads from
    pub location: String,
}

impl SourceEntity {
    pub fn new(id: TableId, artifact: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id,
            artifact: artifact.into(),
            location: location.into(),
        }
    }
}

/// Rows sampled from one side, as raw optional strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Sample {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}
