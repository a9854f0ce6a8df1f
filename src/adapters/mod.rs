//! External system integrations for Tablift.
//!
//! This module provides adapters for integrating with external systems:
//!
//! - [`warehouse`] - Destination warehouse abstraction (trait-based)
//! - [`bigquery`] - Google BigQuery implementation
//! - [`source`] - Source abstraction with CSV (local/GCS) and relational variants
//! - [`postgresql`] - PostgreSQL connection pooling for the relational source
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. The core only sees
//! [`WarehouseGateway`](warehouse::WarehouseGateway) and
//! [`SourceGateway`](source::SourceGateway) trait objects.
//!
//! # BigQuery Adapter
//!
//! ```rust,no_run
//! use tablift::adapters::bigquery::{BigQueryClient, BigQueryWarehouse};
//! use tablift::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tablift.toml")?;
//! let client = BigQueryClient::new(&config.warehouse)?;
//! let warehouse = BigQueryWarehouse::new(client);
//! // Hand the warehouse to the run coordinator
//! # Ok(())
//! # }
//! ```
//!
//! # File Sources
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablift::adapters::source::{FileSourceGateway, LocalFileStore};
//!
//! let store = Arc::new(LocalFileStore::new("/data/exports"));
//! let source = FileSourceGateway::new(store, 1000);
//! ```

pub mod bigquery;
pub mod postgresql;
pub mod source;
pub mod warehouse;
