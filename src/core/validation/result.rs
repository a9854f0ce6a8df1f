//! Validation findings

use crate::domain::{Column, ServiceName, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of validating one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every selected check passed
    Success,
    /// A check found a difference (including a missing destination table)
    Failed,
    /// A gateway call failed, so the checks could not complete
    Error,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Success => "success",
            ValidationStatus::Failed => "failed",
            ValidationStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Row count agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessResult {
    pub source_rows: u64,
    pub destination_rows: u64,
    pub destination_exists: bool,
    #[serde(rename = "match")]
    pub matches: bool,
}

/// One position where the ordered schemas disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMismatch {
    pub position: usize,
    pub source: Option<Column>,
    pub destination: Option<Column>,
}

/// One sampled cell that differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMismatch {
    pub row: usize,
    pub column: String,
    pub source_value: Option<String>,
    pub destination_value: Option<String>,
}

/// Schema and sampled value agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectnessResult {
    pub schema_match: bool,
    pub column_mismatches: Vec<ColumnMismatch>,
    /// Rows actually compared
    pub sample_size: usize,
    /// Every differing cell, including those not recorded below
    pub sample_mismatch_count: usize,
    pub sample_mismatches: Vec<SampleMismatch>,
    #[serde(rename = "match")]
    pub matches: bool,
}

/// Validation result for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub table: TableId,
    pub status: ValidationStatus,
    pub destination_exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correctness: Option<CorrectnessResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn error(table: TableId, destination_exists: bool, error: impl Into<String>) -> Self {
        Self {
            table,
            status: ValidationStatus::Error,
            destination_exists,
            completeness: None,
            correctness: None,
            error: Some(error.into()),
        }
    }

    /// Whether the entity's data disagrees between source and destination
    pub fn is_mismatch(&self) -> bool {
        self.status == ValidationStatus::Failed
    }
}

/// Validation results for one service
#[derive(Debug, Clone)]
pub struct ServiceValidationReport {
    pub service: ServiceName,
    /// Sorted by table id
    pub entities: Vec<ValidationResult>,
    /// Discovery failure, if any
    pub error: Option<String>,
    /// Most entities of this service in flight at once
    pub peak_entities: usize,
}

impl ServiceValidationReport {
    pub fn from_results(service: ServiceName, mut entities: Vec<ValidationResult>) -> Self {
        entities.sort_by(|a, b| a.table.cmp(&b.table));
        Self {
            service,
            entities,
            error: None,
            peak_entities: 0,
        }
    }

    pub fn failed(service: ServiceName, error: impl Into<String>) -> Self {
        Self {
            service,
            entities: Vec::new(),
            error: Some(error.into()),
            peak_entities: 0,
        }
    }
}
