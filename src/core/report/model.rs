//! Run report structures
//!
//! The report is persisted as pretty-printed JSON. Field order follows the
//! struct definitions; services are sorted by name and entities by table id,
//! so two reports of the same outcome serialize identically.

use crate::core::load::{LoadResult, ServiceLoadStatus};
use crate::core::validation::ValidationResult;
use crate::domain::{DatasetId, Result, ServiceName, TableId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Process exit codes
pub mod exit_code {
    /// No failed loads and no failed validations
    pub const SUCCESS: i32 = 0;
    /// A load failed or a validation errored or mismatched
    pub const FAILURES: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const FATAL: i32 = 5;
    /// Stopped by SIGINT/SIGTERM
    pub const INTERRUPTED: i32 = 130;
}

/// Aggregated status, ordered by precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Warning => "warning",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Load and validation results joined for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub table: TableId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

impl EntityReport {
    pub fn new(table: TableId) -> Self {
        Self {
            table,
            load: None,
            validation: None,
        }
    }

    pub fn load_failed(&self) -> bool {
        self.load.as_ref().is_some_and(|l| l.outcome.is_failed())
    }
}

/// Service-level completeness summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub total_source_rows: u64,
    pub total_destination_rows: u64,
    pub missing_entities: Vec<TableId>,
    pub mismatched_entities: Vec<TableId>,
    pub all_entities_processed: bool,
}

/// Everything known about one service after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service: ServiceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
    pub status: Status,
    /// Absent when the run skipped the load phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_status: Option<ServiceLoadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: ServiceSummary,
    pub entities: Vec<EntityReport>,
}

/// Final report of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_date: String,
    pub generated_at: DateTime<Utc>,
    pub status: Status,
    pub exit_code: i32,
    #[serde(default)]
    pub interrupted: bool,
    pub services: Vec<ServiceReport>,
}

impl RunReport {
    pub fn service(&self, name: &ServiceName) -> Option<&ServiceReport> {
        self.services.iter().find(|s| &s.service == name)
    }

    /// Format report as JSON
    pub fn format_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write report to file, creating parent directories
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = self.format_json()?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a previously written report, `None` if the file does not exist
    pub fn read_from_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Human-readable summary for the console
    pub fn format_text(&self) -> String {
        let mut output = String::new();
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!("  TABLIFT RUN REPORT ({})\n", self.run_date));
        output.push_str("═══════════════════════════════════════════════════════════════\n\n");

        for service in &self.services {
            output.push_str(&format!(
                "  {:<24} {:<8} source rows: {:>10}  destination rows: {:>10}\n",
                service.service.as_str(),
                service.status.to_string(),
                service.summary.total_source_rows,
                service.summary.total_destination_rows
            ));
            if let Some(ref error) = service.error {
                output.push_str(&format!("    error: {error}\n"));
            }
            for table in &service.summary.missing_entities {
                output.push_str(&format!("    missing: {table}\n"));
            }
            for table in &service.summary.mismatched_entities {
                output.push_str(&format!("    mismatch: {table}\n"));
            }
            for entity in service.entities.iter().filter(|e| e.load_failed()) {
                let reason = entity
                    .load
                    .as_ref()
                    .and_then(|l| l.error.as_deref())
                    .unwrap_or("unknown error");
                output.push_str(&format!("    load failed: {} ({reason})\n", entity.table));
            }
        }

        output.push('\n');
        if self.interrupted {
            output.push_str("  Run interrupted before all work was scheduled\n");
        }
        output.push_str(&format!(
            "  Status: {}   Exit code: {}\n",
            self.status, self.exit_code
        ));
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output
    }
}
