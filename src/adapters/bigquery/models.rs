//! BigQuery REST API payloads
//!
//! Only the fields Tablift reads or writes are modelled.

use crate::domain::{Column, LogicalType, Schema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

/// `datasets` resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResource {
    pub dataset_reference: DatasetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

impl TableSchema {
    pub fn to_schema(&self) -> Schema {
        self.fields
            .iter()
            .map(|f| Column::new(f.name.clone(), LogicalType::from_engine_type(&f.field_type)))
            .collect()
    }
}

/// `tables` resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResource {
    #[serde(default)]
    pub schema: TableSchema,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfiguration {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_uris: Vec<String>,
    pub destination_table: TableReference,
    pub source_format: &'static str,
    pub skip_leading_rows: u32,
    pub autodetect: bool,
    pub allow_quoted_newlines: bool,
    pub write_disposition: &'static str,
    pub create_disposition: &'static str,
}

impl LoadConfiguration {
    /// CSV load with header row, autodetected schema, replacing table contents
    pub fn csv_truncate(destination_table: TableReference, source_uris: Vec<String>) -> Self {
        Self {
            source_uris,
            destination_table,
            source_format: "CSV",
            skip_leading_rows: 1,
            autodetect: true,
            allow_quoted_newlines: true,
            write_disposition: "WRITE_TRUNCATE",
            create_disposition: "CREATE_IF_NEEDED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobConfiguration {
    pub load: LoadConfiguration,
}

/// Request body for `jobs.insert`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInsert {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorProto {
    /// Whether BigQuery reports this as a retryable backend condition
    pub fn is_transient(&self) -> bool {
        matches!(
            self.reason.as_deref(),
            Some("backendError") | Some("internalError") | Some("rateLimitExceeded")
        )
    }

    pub fn describe(&self) -> String {
        format!(
            "{}: {}",
            self.reason.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
}

/// `jobs` resource as returned by insert and get
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResource {
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: JobStatus,
}

/// Request body for `jobs.query`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub use_legacy_sql: bool,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub format_options: FormatOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    pub use_int64_timestamp: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cell {
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Row {
    pub f: Vec<Cell>,
}

/// Response of `jobs.query` and `jobs.getQueryResults`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_complete: bool,
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

/// Generic error envelope (`{"error": {...}}`)
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_configuration_serialization() {
        let load = LoadConfiguration::csv_truncate(
            TableReference {
                project_id: "p".to_string(),
                dataset_id: "d".to_string(),
                table_id: "t".to_string(),
            },
            vec!["gs://bucket/t.csv".to_string()],
        );
        let json = serde_json::to_value(&load).unwrap();
        assert_eq!(json["sourceUris"][0], "gs://bucket/t.csv");
        assert_eq!(json["skipLeadingRows"], 1);
        assert_eq!(json["writeDisposition"], "WRITE_TRUNCATE");
        assert_eq!(json["destinationTable"]["tableId"], "t");
    }

    #[test]
    fn test_table_schema_conversion() {
        let resource: TableResource = serde_json::from_str(
            r#"{"schema":{"fields":[{"name":"id","type":"INTEGER"},{"name":"created","type":"TIMESTAMP"}]}}"#,
        )
        .unwrap();
        let schema = resource.schema.to_schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.columns()[1].data_type, LogicalType::Timestamp);
    }

    #[test]
    fn test_error_proto_classification() {
        let err = ErrorProto {
            reason: Some("backendError".to_string()),
            message: None,
        };
        assert!(err.is_transient());
        let err = ErrorProto {
            reason: Some("invalid".to_string()),
            message: Some("bad column".to_string()),
        };
        assert!(!err.is_transient());
        assert_eq!(err.describe(), "invalid: bad column");
    }
}
