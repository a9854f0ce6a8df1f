//! Concurrent load orchestration
//!
//! Services run on an outer [`WorkerPool`]; each service loads its entities on
//! its own inner pool. Every entity is either created from its source file or
//! merged into the existing table, with transient gateway failures retried and
//! any other failure confined to that entity.

use super::keys::KeyPolicy;
use super::result::{LoadOutcome, LoadResult, ServiceLoadReport};
use crate::adapters::warehouse::WarehouseGateway;
use crate::config::LoadConfig;
use crate::core::catalog::SourceCatalog;
use crate::core::pool::{PoolStats, TaskOutcome, WorkerPool};
use crate::core::retry::RetryPolicy;
use crate::domain::{Result, ServiceDescriptor, SourceEntity, TableId, TabliftError};
use crate::log_entity_outcome;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// What a load run should touch
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// Bypass the skip-populated short-circuit
    pub rerun: bool,
    /// Only this table (the request must name a single service)
    pub table: Option<TableId>,
}

struct Inner {
    warehouse: Arc<dyn WarehouseGateway>,
    catalog: Arc<SourceCatalog>,
    keys: KeyPolicy,
    retry: RetryPolicy,
    skip_populated_tables: bool,
    allow_region_override: bool,
    service_pool: WorkerPool,
    entity_concurrency: usize,
    entity_peak: AtomicUsize,
}

/// Loads source entities into the warehouse
#[derive(Clone)]
pub struct LoadOrchestrator {
    inner: Arc<Inner>,
}

impl LoadOrchestrator {
    pub fn new(
        warehouse: Arc<dyn WarehouseGateway>,
        catalog: Arc<SourceCatalog>,
        config: &LoadConfig,
        allow_region_override: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                warehouse,
                catalog,
                keys: KeyPolicy::from_config(config),
                retry: RetryPolicy::from_config(&config.retry),
                skip_populated_tables: config.skip_populated_tables,
                allow_region_override,
                service_pool: WorkerPool::new("services", config.service_concurrency),
                entity_concurrency: config.entity_concurrency,
                entity_peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Counters of the service pool
    pub fn service_stats(&self) -> &Arc<PoolStats> {
        self.inner.service_pool.stats()
    }

    /// Largest in-flight count any single service's entity pool reached
    pub fn entity_peak(&self) -> usize {
        self.inner.entity_peak.load(Ordering::SeqCst)
    }

    /// Loads every service; services never started because of shutdown are
    /// left out of the result
    pub async fn load_services(
        &self,
        services: &[ServiceDescriptor],
        request: &LoadRequest,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<ServiceLoadReport> {
        let this = self.clone();
        let request = request.clone();
        let signal = shutdown.clone();

        let outcomes = self
            .inner
            .service_pool
            .run_all(services.to_vec(), shutdown, move |service| {
                let this = this.clone();
                let request = request.clone();
                let signal = signal.clone();
                async move { this.load_service(&service, &request, &signal).await }
            })
            .await;

        services
            .iter()
            .zip(outcomes)
            .filter_map(|(service, outcome)| match outcome {
                TaskOutcome::Completed(report) => Some(report),
                TaskOutcome::Panicked(message) => Some(ServiceLoadReport::failed(
                    service.name.clone(),
                    format!("Service task panicked: {message}"),
                )),
                TaskOutcome::Cancelled => None,
            })
            .collect()
    }

    /// Loads one service's entities on a bounded pool
    pub async fn load_service(
        &self,
        service: &ServiceDescriptor,
        request: &LoadRequest,
        shutdown: &watch::Receiver<bool>,
    ) -> ServiceLoadReport {
        tracing::info!(service = %service.name, dataset = %service.dataset, "Loading service");

        if let Err(e) = self.ensure_dataset(service).await {
            tracing::error!(service = %service.name, error = %e, "Failed to prepare dataset");
            return ServiceLoadReport::failed(service.name.clone(), e.to_string());
        }

        let discovered = match &request.table {
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
                return ServiceLoadReport::failed(service.name.clone(), e.to_string());
            }
        };

        let pool = WorkerPool::new("entities", self.inner.entity_concurrency);
        let this = self.clone();
        let descriptor = service.clone();
        let rerun = request.rerun;

        let outcomes = pool
            .run_all(entities.clone(), shutdown, move |entity| {
                let this = this.clone();
                let descriptor = descriptor.clone();
                async move { this.load_entity(&entity, &descriptor, rerun).await }
            })
            .await;

        let results = entities
            .iter()
            .zip(outcomes)
            .filter_map(|(entity, outcome)| match outcome {
                TaskOutcome::Completed(result) => Some(result),
                TaskOutcome::Panicked(message) => Some(LoadResult::failed(
                    entity.id.clone(),
                    1,
                    format!("Load task panicked: {message}"),
                )),
                TaskOutcome::Cancelled => None,
            })
            .collect();

        let mut report = ServiceLoadReport::from_results(service.name.clone(), results);
        report.peak_entities = pool.stats().peak();
        self.inner
            .entity_peak
            .fetch_max(report.peak_entities, Ordering::SeqCst);
        tracing::info!(
            service = %service.name,
            status = ?report.status,
            entities = report.entities.len(),
            peak_entities = report.peak_entities,
            failed = report.entities.iter().filter(|e| e.outcome.is_failed()).count(),
            "Service load finished"
        );
        report
    }

    /// Loads one entity, retrying transient failures
    ///
    /// Never returns an error: failures are recorded in the result.
    pub async fn load_entity(
        &self,
        entity: &SourceEntity,
        service: &ServiceDescriptor,
        rerun: bool,
    ) -> LoadResult {
        let (result, attempts) = self
            .inner
            .retry
            .run("load_entity", || self.load_once(entity, service, rerun))
            .await;

        let result = match result {
            Ok((outcome, rows)) => LoadResult::success(entity.id.clone(), outcome, attempts, rows),
            Err(e) => {
                tracing::error!(
                    service = %service.name,
                    table = %entity.id,
                    attempts,
                    error = %e,
                    "Entity load failed"
                );
                LoadResult::failed(entity.id.clone(), attempts, e.to_string())
            }
        };
        log_entity_outcome!("load", service.name, entity.id, result.outcome);
        result
    }

    async fn load_once(
        &self,
        entity: &SourceEntity,
        service: &ServiceDescriptor,
        rerun: bool,
    ) -> Result<(LoadOutcome, Option<u64>)> {
        let warehouse = &self.inner.warehouse;
        let source = self.inner.catalog.source();
        let dataset = &service.dataset;
        let table = &entity.id;

        if !warehouse.table_exists(dataset, table).await? {
            let data = source.load_source(service, entity).await?;
            tracing::debug!(table = %table, source = %data.describe(), "Creating table");
            warehouse.create_table(dataset, table, &data).await?;
            let rows = warehouse.get_row_count(dataset, table).await?;
            return Ok((LoadOutcome::Created, Some(rows)));
        }

        if !rerun && self.inner.skip_populated_tables {
            let rows = warehouse.get_row_count(dataset, table).await?;
            if rows > 0 {
                tracing::debug!(table = %table, rows, "Table already populated");
                return Ok((LoadOutcome::Skipped, Some(rows)));
            }
        }

        self.check_region(service).await?;

        let schema = source.get_schema(service, entity).await?;
        let keys = self.inner.keys.resolve(table, &schema)?;
        let data = source.load_source(service, entity).await?;
        tracing::debug!(table = %table, keys = ?keys, source = %data.describe(), "Upserting table");
        warehouse.upsert(dataset, table, &data, &keys).await?;

        let rows = warehouse.get_row_count(dataset, table).await?;
        Ok((LoadOutcome::Upserted, Some(rows)))
    }

    async fn check_region(&self, service: &ServiceDescriptor) -> Result<()> {
        let actual = self.inner.warehouse.dataset_region(&service.dataset).await?;
        if actual.eq_ignore_ascii_case(&service.region) {
            return Ok(());
        }
        if self.inner.allow_region_override {
            tracing::warn!(
                dataset = %service.dataset,
                expected = %service.region,
                actual = %actual,
                "Dataset region differs from configuration, continuing"
            );
            return Ok(());
        }
        Err(TabliftError::RegionMismatch {
            dataset: service.dataset.to_string(),
            expected: service.region.clone(),
            actual,
        })
    }

    async fn ensure_dataset(&self, service: &ServiceDescriptor) -> Result<()> {
        let warehouse = &self.inner.warehouse;
        let retry = &self.inner.retry;

        let exists = retry
            .call("dataset_exists", || warehouse.dataset_exists(&service.dataset))
            .await?;
        if !exists {
            tracing::info!(dataset = %service.dataset, region = %service.region, "Creating dataset");
            retry
                .call("create_dataset", || {
                    warehouse.create_dataset(&service.dataset, &service.region)
                })
                .await?;
        }
        Ok(())
    }
}
