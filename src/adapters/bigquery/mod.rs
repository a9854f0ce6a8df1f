//! Google BigQuery integration
//!
//! [`BigQueryClient`] speaks the REST API; [`BigQueryWarehouse`] implements
//! [`WarehouseGateway`](crate::adapters::warehouse::WarehouseGateway) on top of it.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::BigQueryWarehouse;
pub use client::BigQueryClient;
