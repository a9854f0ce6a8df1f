//! Source abstraction traits
//!
//! A source is either a set of CSV files or a relational database. Both are
//! reached through [`SourceGateway`], chosen once per run.

use crate::adapters::warehouse::LoadSource;
use crate::domain::{Result, Sample, Schema, ServiceDescriptor, SourceEntity, TabliftError};
use async_trait::async_trait;

/// A raw artifact found at a service's source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    /// File name or table name as listed by the source
    pub name: String,
    /// Path, object name, or qualified table name
    pub location: String,
}

impl SourceArtifact {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Source data access for one run
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// Short name used in logs and reports (`files`, `relational`)
    fn kind(&self) -> &'static str;

    /// Lists candidate data artifacts for a service
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be reached. A reachable but
    /// empty location yields an empty list.
    async fn list_entities(&self, service: &ServiceDescriptor) -> Result<Vec<SourceArtifact>>;

    /// Ordered schema of an entity
    async fn get_schema(&self, service: &ServiceDescriptor, entity: &SourceEntity)
        -> Result<Schema>;

    /// Number of data rows in an entity
    async fn get_row_count(&self, service: &ServiceDescriptor, entity: &SourceEntity)
        -> Result<u64>;

    /// Up to `n` rows ordered by `order_by` ascending, nulls first
    ///
    /// Columns in `order_by` that the entity lacks are ignored.
    async fn get_sample(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample>;

    /// Data the warehouse should bulk-load for an entity
    ///
    /// Only file-backed sources can feed loads.
    async fn load_source(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<LoadSource> {
        Err(TabliftError::Load(format!(
            "{} source cannot provide load data for '{}'",
            self.kind(),
            entity.id
        )))
    }
}
