//! Warehouse abstraction traits
//!
//! This module defines the operations the load orchestrator and validation
//! engine need from a destination warehouse.

use crate::domain::{DatasetId, Result, Sample, Schema, TableId};
use async_trait::async_trait;

/// Where a bulk load reads its CSV data from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Object the warehouse can read directly (e.g. `gs://bucket/path.csv`)
    Uri(String),
    /// CSV bytes uploaded with the load request
    Bytes(Vec<u8>),
}

impl LoadSource {
    /// Short description for logs, never the payload itself
    pub fn describe(&self) -> String {
        match self {
            LoadSource::Uri(uri) => uri.clone(),
            LoadSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Destination warehouse client
///
/// Implementations translate their transport errors into
/// [`GatewayError`](crate::domain::GatewayError) so callers can decide whether
/// to retry.
#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    /// Check whether a dataset exists
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool>;

    /// Create a dataset in the given region
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be created. Creating a dataset
    /// that already exists is not an error.
    async fn create_dataset(&self, dataset: &DatasetId, region: &str) -> Result<()>;

    /// Region (location) the dataset actually lives in
    async fn dataset_region(&self, dataset: &DatasetId) -> Result<String>;

    /// Check whether a table exists
    async fn table_exists(&self, dataset: &DatasetId, table: &TableId) -> Result<bool>;

    /// Create (or replace) a table from CSV data with an autodetected schema
    ///
    /// The load truncates any existing contents, so repeating it converges to
    /// the same table.
    async fn create_table(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
    ) -> Result<()>;

    /// Merge CSV data into an existing table by key
    ///
    /// Data is first loaded into a staging table, then merged: rows whose key
    /// matches are updated, others inserted. Repeating the upsert with the same
    /// data leaves the table unchanged.
    ///
    /// # Arguments
    ///
    /// * `key_columns` - Columns identifying a row; never empty
    async fn upsert(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
        key_columns: &[String],
    ) -> Result<()>;

    /// Drop a table if it exists
    async fn delete_table(&self, dataset: &DatasetId, table: &TableId) -> Result<()>;

    /// Ordered table schema
    async fn get_schema(&self, dataset: &DatasetId, table: &TableId) -> Result<Schema>;

    /// Number of rows in a table
    async fn get_row_count(&self, dataset: &DatasetId, table: &TableId) -> Result<u64>;

    /// Up to `n` rows ordered by `order_by` ascending, nulls first
    async fn get_sample(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample>;
}
