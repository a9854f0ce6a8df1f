//! Source entity discovery
//!
//! Turns the raw artifacts a source lists for a service into the sorted set of
//! [`SourceEntity`] values the load and validation phases work on.

use crate::adapters::source::{SourceArtifact, SourceGateway};
use crate::core::retry::RetryPolicy;
use crate::domain::{Result, ServiceDescriptor, SourceEntity, TableId, TabliftError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps source artifacts to canonical destination tables
pub struct SourceCatalog {
    source: Arc<dyn SourceGateway>,
    skip_patterns: Vec<String>,
    retry: RetryPolicy,
}

impl SourceCatalog {
    /// `skip_patterns` are matched case-insensitively as substrings of the
    /// artifact name
    pub fn new(source: Arc<dyn SourceGateway>, skip_patterns: &[String]) -> Self {
        Self {
            source,
            skip_patterns: skip_patterns
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            retry: RetryPolicy::none(),
        }
    }

    /// Retries transient listing failures before giving up on the service
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn source(&self) -> &Arc<dyn SourceGateway> {
        &self.source
    }

    /// Every data entity of a service, sorted by canonical table id
    ///
    /// # Errors
    ///
    /// `Discovery` if the source location cannot be listed once retries are
    /// exhausted, `AmbiguousEntity` if two artifacts map to the same table.
    pub async fn discover(&self, service: &ServiceDescriptor) -> Result<Vec<SourceEntity>> {
        let candidates = self.candidates(service).await?;

        let mut entities: BTreeMap<TableId, SourceEntity> = BTreeMap::new();
        for entity in candidates {
            if let Some(existing) = entities.get(&entity.id) {
                return Err(ambiguous(existing, &entity));
            }
            entities.insert(entity.id.clone(), entity);
        }

        tracing::info!(
            service = %service.name,
            source = self.source.kind(),
            entities = entities.len(),
            "Discovered source entities"
        );
        Ok(entities.into_values().collect())
    }

    /// The single entity that maps to `table`
    ///
    /// Other entities of the service are not checked for ambiguity.
    pub async fn discover_one(
        &self,
        service: &ServiceDescriptor,
        table: &TableId,
    ) -> Result<SourceEntity> {
        let mut matching = self
            .candidates(service)
            .await?
            .into_iter()
            .filter(|entity| &entity.id == table);

        let Some(first) = matching.next() else {
            return Err(TabliftError::EntityNotFound {
                service: service.name.to_string(),
                table: table.to_string(),
            });
        };
        if let Some(second) = matching.next() {
            return Err(ambiguous(&first, &second));
        }
        Ok(first)
    }

    async fn candidates(&self, service: &ServiceDescriptor) -> Result<Vec<SourceEntity>> {
        let artifacts = self
            .retry
            .call("list_entities", || self.source.list_entities(service))
            .await
            .map_err(|e| match e {
                TabliftError::Discovery { .. } => e,
                other => TabliftError::Discovery {
                    service: service.name.to_string(),
                    message: other.to_string(),
                },
            })?;

        let mut entities = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if self.is_skipped(&artifact) {
                tracing::debug!(service = %service.name, artifact = %artifact.name, "Skipping control artifact");
                continue;
            }
            match TableId::from_artifact(&artifact.name) {
                Ok(id) => entities.push(SourceEntity::new(id, artifact.name, artifact.location)),
                Err(e) => {
                    tracing::warn!(service = %service.name, artifact = %artifact.name, error = %e, "Ignoring artifact");
                }
            }
        }
        Ok(entities)
    }

    fn is_skipped(&self, artifact: &SourceArtifact) -> bool {
        let name = artifact.name.to_ascii_lowercase();
        self.skip_patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

fn ambiguous(first: &SourceEntity, second: &SourceEntity) -> TabliftError {
    let (first, second) = if first.artifact <= second.artifact {
        (first, second)
    } else {
        (second, first)
    };
    TabliftError::AmbiguousEntity {
        table: first.id.to_string(),
        first: first.artifact.clone(),
        second: second.artifact.clone(),
    }
}
