//! Domain models and types for Tablift.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ServiceName`], [`TableId`], [`DatasetId`])
//! - **Schemas and values** ([`Schema`], [`LogicalType`], [`CellValue`])
//! - **Run descriptors** ([`ServiceDescriptor`], [`SourceEntity`])
//! - **Error types** ([`TabliftError`], [`GatewayError`]) and the [`Result`] alias
//!
//! # Canonical table names
//!
//! ```rust
//! use tablift::domain::TableId;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let id = TableId::from_artifact("Patient-Visits.csv")?;
//! assert_eq!(id.as_str(), "patient_visits");
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod result;
pub mod schema;
pub mod service;
pub mod value;

pub use errors::{GatewayError, TabliftError};
pub use ids::{DatasetId, ServiceName, TableId};
pub use result::Result;
pub use schema::{Column, LogicalType, Schema};
pub use service::{Sample, ServiceDescriptor, SourceEntity};
pub use value::CellValue;
