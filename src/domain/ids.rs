//! Domain identifier types with validation
//!
//! Newtype wrappers for service names and destination identifiers. Table
//! identifiers are always canonical: derived deterministically from an artifact
//! name so reruns target the same destination object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowercases `raw` and replaces every non-ASCII-alphanumeric character with `_`
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Service name newtype wrapper
///
/// # Examples
///
/// ```
/// use tablift::domain::ids::ServiceName;
///
/// let service = ServiceName::new("billing").unwrap();
/// assert_eq!(service.as_str(), "billing");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Creates a new ServiceName, rejecting empty names
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Service name cannot be empty".to_string());
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical destination table identifier
///
/// Built from a source artifact name: a trailing `.csv` extension is stripped,
/// then the rest is lowercased with non-alphanumeric characters replaced by
/// underscores.
///
/// # Examples
///
/// ```
/// use tablift::domain::ids::TableId;
///
/// let id = TableId::from_artifact("Order-Items.csv").unwrap();
/// assert_eq!(id.as_str(), "order_items");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Derives the canonical identifier for an artifact (file or source table) name
    pub fn from_artifact(artifact: &str) -> Result<Self, String> {
        let base = artifact.rsplit(['/', '\\']).next().unwrap_or(artifact);
        let stem = strip_extension(base, "csv");
        if stem.trim().is_empty() {
            return Err(format!("Cannot derive table name from '{artifact}'"));
        }
        Ok(Self(canonicalize(stem)))
    }

    /// Canonicalizes a user-supplied table name (e.g. a `--table` filter)
    pub fn new(name: impl AsRef<str>) -> Result<Self, String> {
        Self::from_artifact(name.as_ref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the staging table used while upserting into this table
    pub fn staging(&self) -> TableId {
        TableId(format!("{}__staging", self.0))
    }
}

fn strip_extension<'a>(name: &'a str, ext: &str) -> &'a str {
    match name.rsplit_once('.') {
        Some((stem, found)) if found.eq_ignore_ascii_case(ext) => stem,
        _ => name,
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for TableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Destination dataset identifier
///
/// Dataset names only allow letters, digits and underscores, so the resolved
/// template value is sanitized the same way table names are (case preserved).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Dataset name cannot be empty".to_string());
        }
        let sanitized = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DatasetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_id_from_artifact() {
        assert_eq!(TableId::from_artifact("users.csv").unwrap().as_str(), "users");
        assert_eq!(
            TableId::from_artifact("sql-exports/2024-01-01/csvextract/billing/Order Items.CSV")
                .unwrap()
                .as_str(),
            "order_items"
        );
        assert_eq!(
            TableId::from_artifact("public.Invoice-Lines").unwrap().as_str(),
            "public_invoice_lines"
        );
    }

    #[test]
    fn test_table_id_is_stable() {
        let first = TableId::from_artifact("Customer-Addresses.csv").unwrap();
        let second = TableId::from_artifact("Customer-Addresses.csv").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_artifacts_can_collide() {
        let a = TableId::from_artifact("user-events.csv").unwrap();
        let b = TableId::from_artifact("User_Events.csv").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_table_id_rejects_empty() {
        assert!(TableId::from_artifact(".csv").is_err());
        assert!(TableId::new("  ").is_err());
    }

    #[test]
    fn test_staging_name() {
        let id = TableId::new("orders").unwrap();
        assert_eq!(id.staging().as_str(), "orders__staging");
    }

    #[test]
    fn test_dataset_id_sanitized() {
        let id = DatasetId::new("dev_billing-v2_service").unwrap();
        assert_eq!(id.as_str(), "dev_billing_v2_service");
        assert!(DatasetId::new("").is_err());
    }

    #[test]
    fn test_service_name_validation() {
        assert!(ServiceName::new("billing").is_ok());
        assert!(ServiceName::new("").is_err());
        assert_eq!(ServiceName::from_str("auth").unwrap().to_string(), "auth");
    }
}
