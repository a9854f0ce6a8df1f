//! Domain error types
//!
//! This module defines the error hierarchy for Tablift. Errors are domain-specific
//! and don't expose third-party client types; gateway implementations translate
//! their transport errors into [`GatewayError`] before returning.

use thiserror::Error;

/// Main Tablift error type
///
/// This is the primary error type used throughout the application.
/// Data findings (row-count, schema, or sample mismatches) are never represented
/// here; they are recorded in validation results instead.
#[derive(Debug, Error)]
pub enum TabliftError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Warehouse or source gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Source location could not be listed
    #[error("Discovery error for service '{service}': {message}")]
    Discovery { service: String, message: String },

    /// Two source artifacts normalize to the same destination table
    #[error("Ambiguous entity '{table}': both '{first}' and '{second}' map to it")]
    AmbiguousEntity {
        table: String,
        first: String,
        second: String,
    },

    /// A targeted table has no matching source artifact
    #[error("Entity '{table}' not found in source for service '{service}'")]
    EntityNotFound { service: String, table: String },

    /// Destination dataset lives in a different region than configured
    #[error("Region mismatch for dataset '{dataset}': expected '{expected}', found '{actual}'")]
    RegionMismatch {
        dataset: String,
        expected: String,
        actual: String,
    },

    /// No key columns could be determined for an upsert
    #[error("No key columns available for table '{0}'")]
    MissingKey(String),

    /// Load process errors
    #[error("Load error: {0}")]
    Load(String),

    /// Validation process errors (not data mismatches)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl TabliftError {
    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TabliftError::Gateway(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Errors returned by warehouse and source gateways
///
/// The transient/permanent split drives retry decisions in the load and
/// validation phases.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to reach the remote endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request or job did not finish in time
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 404/429)
    #[error("Request rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A load or query job finished with an error
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Relational source query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl GatewayError {
    /// Whether the failure is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionFailed(_)
                | GatewayError::Timeout(_)
                | GatewayError::RateLimited(_)
                | GatewayError::ServerError { .. }
        )
    }

    /// Classifies an HTTP status code returned with `body`
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            404 => GatewayError::NotFound(message),
            408 => GatewayError::Timeout(message),
            429 => GatewayError::RateLimited(message),
            500..=599 => GatewayError::ServerError { status, message },
            _ => GatewayError::Rejected { status, message },
        }
    }
}

impl From<std::io::Error> for TabliftError {
    fn from(err: std::io::Error) -> Self {
        TabliftError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TabliftError {
    fn from(err: serde_json::Error) -> Self {
        TabliftError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TabliftError {
    fn from(err: toml::de::Error) -> Self {
        TabliftError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<csv::Error> for TabliftError {
    fn from(err: csv::Error) -> Self {
        TabliftError::Serialization(format!("CSV error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tablift_error_display() {
        let err = TabliftError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_region_mismatch_display() {
        let err = TabliftError::RegionMismatch {
            dataset: "dev_billing_service".to_string(),
            expected: "europe-west2".to_string(),
            actual: "US".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Region mismatch for dataset 'dev_billing_service': expected 'europe-west2', found 'US'"
        );
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: TabliftError = GatewayError::Timeout("30s".to_string()).into();
        assert!(matches!(err, TabliftError::Gateway(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(GatewayError::from_status(503, "unavailable").is_transient());
        assert!(GatewayError::from_status(429, "slow down").is_transient());
        assert!(!GatewayError::from_status(400, "bad request").is_transient());
        assert!(matches!(
            GatewayError::from_status(404, "gone"),
            GatewayError::NotFound(_)
        ));
    }

    #[test]
    fn test_structural_errors_are_not_transient() {
        let err = TabliftError::AmbiguousEntity {
            table: "users".to_string(),
            first: "Users.csv".to_string(),
            second: "users.csv".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!TabliftError::Gateway(GatewayError::JobFailed("x".into())).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TabliftError = io_err.into();
        assert!(matches!(err, TabliftError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TabliftError = toml_err.into();
        assert!(err.to_string().contains("TOML parse error"));
    }
}
