//! Load phase results

use crate::domain::{ServiceName, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final state of one entity after the load phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Table did not exist and was created from the source
    Created,
    /// Existing table was merged with the source
    Upserted,
    /// Table already populated; nothing written
    Skipped,
    Failed,
}

impl LoadOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadOutcome::Failed)
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadOutcome::Created => "created",
            LoadOutcome::Upserted => "upserted",
            LoadOutcome::Skipped => "skipped",
            LoadOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Load result for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    pub table: TableId,
    pub outcome: LoadOutcome,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Destination row count observed after the load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadResult {
    pub fn success(table: TableId, outcome: LoadOutcome, attempts: u32, rows: Option<u64>) -> Self {
        Self {
            table,
            outcome,
            attempts,
            destination_rows: rows,
            error: None,
        }
    }

    pub fn failed(table: TableId, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            table,
            outcome: LoadOutcome::Failed,
            attempts,
            destination_rows: None,
            error: Some(error.into()),
        }
    }
}

/// Load state of a whole service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLoadStatus {
    /// Every entity loaded
    Completed,
    /// At least one entity failed
    PartiallyFailed,
    /// The service could not be processed at all (discovery, dataset)
    Failed,
    /// Nothing was found to load
    Empty,
}

/// Load results for one service
#[derive(Debug, Clone)]
pub struct ServiceLoadReport {
    pub service: ServiceName,
    pub status: ServiceLoadStatus,
    /// Sorted by table id
    pub entities: Vec<LoadResult>,
    /// Service-level failure (discovery, dataset creation)
    pub error: Option<String>,
    /// Most entities of this service in flight at once
    pub peak_entities: usize,
}

impl ServiceLoadReport {
    pub fn from_results(service: ServiceName, mut entities: Vec<LoadResult>) -> Self {
        entities.sort_by(|a, b| a.table.cmp(&b.table));
        let status = if entities.is_empty() {
            ServiceLoadStatus::Empty
        } else if entities.iter().any(|e| e.outcome.is_failed()) {
            ServiceLoadStatus::PartiallyFailed
        } else {
            ServiceLoadStatus::Completed
        };
        Self {
            service,
            status,
            entities,
            error: None,
            peak_entities: 0,
        }
    }

    pub fn failed(service: ServiceName, error: impl Into<String>) -> Self {
        Self {
            service,
            status: ServiceLoadStatus::Failed,
            entities: Vec::new(),
            error: Some(error.into()),
            peak_entities: 0,
        }
    }
}
