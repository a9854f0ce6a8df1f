//! Completeness and correctness checks
//!
//! Every check re-queries both sides; nothing from the load phase is trusted.
//! Services and entities run on bounded pools, like the load phase.

use super::compare::{compare_samples, compare_schemas, sample_order};
use super::result::{
    CompletenessResult, CorrectnessResult, ServiceValidationReport, ValidationResult,
    ValidationStatus,
};
use crate::adapters::warehouse::WarehouseGateway;
use crate::config::{LoadConfig, ValidationConfig, ValidationMode};
use crate::core::catalog::SourceCatalog;
use crate::core::load::KeyPolicy;
use crate::core::pool::{PoolStats, TaskOutcome, WorkerPool};
use crate::core::retry::RetryPolicy;
use crate::domain::{Result, ServiceDescriptor, SourceEntity, TableId, TabliftError};
use crate::log_entity_outcome;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Validation knobs resolved from configuration and CLI flags
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub mode: ValidationMode,
    pub sample_size: usize,
    pub numeric_tolerance: f64,
    pub max_recorded_mismatches: usize,
}

impl From<&ValidationConfig> for ValidationSettings {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            mode: config.mode,
            sample_size: config.sample_size,
            numeric_tolerance: config.numeric_tolerance,
            max_recorded_mismatches: config.max_recorded_mismatches,
        }
    }
}

struct Inner {
    warehouse: Arc<dyn WarehouseGateway>,
    catalog: Arc<SourceCatalog>,
    keys: KeyPolicy,
    retry: RetryPolicy,
    settings: ValidationSettings,
    service_pool: WorkerPool,
    entity_concurrency: usize,
    entity_peak: AtomicUsize,
}

/// Compares the warehouse against a source
#[derive(Clone)]
pub struct ValidationEngine {
    inner: Arc<Inner>,
}

impl ValidationEngine {
    /// Pool sizes, keys and retries come from the load settings so both phases
    /// put the same pressure on the gateways
    pub fn new(
        warehouse: Arc<dyn WarehouseGateway>,
        catalog: Arc<SourceCatalog>,
        settings: ValidationSettings,
        load: &LoadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                warehouse,
                catalog,
                keys: KeyPolicy::from_config(load),
                retry: RetryPolicy::from_config(&load.retry),
                settings,
                service_pool: WorkerPool::new("validation-services", load.service_concurrency),
                entity_concurrency: load.entity_concurrency,
                entity_peak: AtomicUsize::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.inner.settings
    }

    pub fn service_stats(&self) -> &Arc<PoolStats> {
        self.inner.service_pool.stats()
    }

    /// Largest in-flight count any single service's entity pool reached
    pub fn entity_peak(&self) -> usize {
        self.inner.entity_peak.load(Ordering::SeqCst)
    }

    /// Validates every service; `table` narrows each service to one table
    pub async fn validate_services(
        &self,
        services: &[ServiceDescriptor],
        table: Option<&TableId>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<ServiceValidationReport> {
        let this = self.clone();
        let table = table.cloned();
        let signal = shutdown.clone();

        let outcomes = self
            .inner
            .service_pool
            .run_all(services.to_vec(), shutdown, move |service| {
                let this = this.clone();
                let table = table.clone();
                let signal = signal.clone();
                async move {
                    this.validate_service(&service, table.as_ref(), &signal)
                        .await
                }
            })
            .await;

        services
            .iter()
            .zip(outcomes)
            .filter_map(|(service, outcome)| match outcome {
                TaskOutcome::Completed(report) => Some(report),
                TaskOutcome::Panicked(message) => Some(ServiceValidationReport::failed(
                    service.name.clone(),
                    format!("Validation task panicked: {message}"),
                )),
                TaskOutcome::Cancelled => None,
            })
            .collect()
    }

    /// Validates one service's entities on a bounded pool
    pub async fn validate_service(
        &self,
        service: &ServiceDescriptor,
        table: Option<&TableId>,
        shutdown: &watch::Receiver<bool>,
    ) -> ServiceValidationReport {
        tracing::info!(
            service = %service.name,
            mode = %self.inner.settings.mode,
            source = self.inner.catalog.source().kind(),
            "Validating service"
        );

        let discovered = match table {
            Some(table) => self
                .inner
                .catalog
                .discover_one(service, table)
                .await
                .map(|entity| vec![entity]),
            None => self.inner.catalog.discover(service).await,
        };
        let entities = match discovered {
            Ok(entities) => entities,
            Err(e) => {
                tracing::error!(service = %service.name, error = %e, "Discovery failed");
                return ServiceValidationReport::failed(service.name.clone(), e.to_string());
            }
        };

        let pool = WorkerPool::new("validation-entities", self.inner.entity_concurrency);
        let this = self.clone();
        let descriptor = service.clone();
        let outcomes = pool
            .run_all(entities.clone(), shutdown, move |entity| {
                let this = this.clone();
                let descriptor = descriptor.clone();
                async move { this.validate_entity(&descriptor, &entity).await }
            })
            .await;

        let results = entities
            .iter()
            .zip(outcomes)
            .filter_map(|(entity, outcome)| match outcome {
                TaskOutcome::Completed(result) => Some(result),
                TaskOutcome::Panicked(message) => Some(ValidationResult::error(
                    entity.id.clone(),
                    false,
                    format!("Validation task panicked: {message}"),
                )),
                TaskOutcome::Cancelled => None,
            })
            .collect();

        let mut report = ServiceValidationReport::from_results(service.name.clone(), results);
        report.peak_entities = pool.stats().peak();
        self.inner
            .entity_peak
            .fetch_max(report.peak_entities, Ordering::SeqCst);
        report
    }

    /// Runs the selected checks for one entity
    ///
    /// Gateway failures that survive retries produce an `error` result.
    pub async fn validate_entity(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> ValidationResult {
        let result = match self.check_entity(service, entity).await {
            Ok(result) => result,
            Err((exists, e)) => {
                tracing::error!(service = %service.name, table = %entity.id, error = %e, "Validation error");
                ValidationResult::error(entity.id.clone(), exists, e.to_string())
            }
        };
        log_entity_outcome!("validation", service.name, entity.id, result.status);
        result
    }

    async fn check_entity(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> std::result::Result<ValidationResult, (bool, TabliftError)> {
        let mode = self.inner.settings.mode;
        let exists = self
            .with_retry("table_exists", || {
                self.inner.warehouse.table_exists(&service.dataset, &entity.id)
            })
            .await
            .map_err(|e| (false, e))?;

        let mut result = ValidationResult {
            table: entity.id.clone(),
            status: ValidationStatus::Success,
            destination_exists: exists,
            completeness: None,
            correctness: None,
            error: None,
        };

        if !exists {
            if mode.includes_completeness() {
                let source_rows = self.source_rows(service, entity).await.map_err(|e| (false, e))?;
                result.completeness = Some(CompletenessResult {
                    source_rows,
                    destination_rows: 0,
                    destination_exists: false,
                    matches: false,
                });
            }
            result.status = ValidationStatus::Failed;
            return Ok(result);
        }

        let source_rows = self.source_rows(service, entity).await.map_err(|e| (true, e))?;
        let destination_rows = self
            .with_retry("get_row_count", || {
                self.inner.warehouse.get_row_count(&service.dataset, &entity.id)
            })
            .await
            .map_err(|e| (true, e))?;

        if mode.includes_completeness() {
            result.completeness = Some(CompletenessResult {
                source_rows,
                destination_rows,
                destination_exists: true,
                matches: source_rows == destination_rows,
            });
        }

        if mode.includes_correctness() {
            let correctness = self
                .correctness(service, entity, source_rows, destination_rows)
                .await
                .map_err(|e| (true, e))?;
            result.correctness = Some(correctness);
        }

        let completeness_ok = result.completeness.as_ref().map_or(true, |c| c.matches);
        let correctness_ok = result.correctness.as_ref().map_or(true, |c| c.matches);
        if !(completeness_ok && correctness_ok) {
            result.status = ValidationStatus::Failed;
        }
        Ok(result)
    }

    async fn correctness(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
        source_rows: u64,
        destination_rows: u64,
    ) -> Result<CorrectnessResult> {
        let source = self.inner.catalog.source();
        let warehouse = &self.inner.warehouse;
        let settings = &self.inner.settings;

        let source_schema = self
            .with_retry("source_schema", || source.get_schema(service, entity))
            .await?;
        let destination_schema = self
            .with_retry("get_schema", || {
                warehouse.get_schema(&service.dataset, &entity.id)
            })
            .await?;

        let column_mismatches = compare_schemas(&source_schema, &destination_schema);
        let keys = self
            .inner
            .keys
            .resolve(&entity.id, &source_schema)
            .unwrap_or_default();
        let order = sample_order(&keys, &source_schema, &destination_schema);

        let n = settings
            .sample_size
            .min(source_rows.min(destination_rows) as usize);

        let (sample_size, mismatch_count, mismatches) = if n == 0 {
            (0, 0, Vec::new())
        } else {
            let source_sample = self
                .with_retry("source_sample", || {
                    source.get_sample(service, entity, n, &order)
                })
                .await?;
            let destination_sample = self
                .with_retry("get_sample", || {
                    warehouse.get_sample(&service.dataset, &entity.id, n, &order)
                })
                .await?;

            let comparison = compare_samples(
                &source_sample,
                &destination_sample,
                &source_schema,
                &destination_schema,
                settings.numeric_tolerance,
                settings.max_recorded_mismatches,
            );
            (
                comparison.rows_compared,
                comparison.mismatch_count,
                comparison.mismatches,
            )
        };

        let schema_match = column_mismatches.is_empty();
        Ok(CorrectnessResult {
            schema_match,
            column_mismatches,
            sample_size,
            sample_mismatch_count: mismatch_count,
            sample_mismatches: mismatches,
            matches: schema_match && mismatch_count == 0,
        })
    }

    async fn source_rows(&self, service: &ServiceDescriptor, entity: &SourceEntity) -> Result<u64> {
        let source = self.inner.catalog.source();
        self.with_retry("source_row_count", || source.get_row_count(service, entity))
            .await
    }

    async fn with_retry<F, Fut, T>(&self, name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.inner.retry.call(name, operation).await
    }
}
