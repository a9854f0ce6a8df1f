//! Run coordinator: the single entry point behind `tablift run`
//!
//! Resolves services, runs the load phase (unless validate-only) and the
//! validation phase, aggregates both into a [`RunReport`], folds a targeted
//! rerun into the previous report and writes the result.

use crate::adapters::bigquery::{BigQueryClient, BigQueryWarehouse};
use crate::adapters::postgresql::PostgreSQLClient;
use crate::adapters::source::{
    FileSourceGateway, FileStore, GcsFileStore, LocalFileStore, RelationalSourceGateway,
    SourceGateway,
};
use crate::adapters::warehouse::WarehouseGateway;
use crate::config::{SourceKind, TabliftConfig, ValidationMode, ValidationSource};
use crate::core::catalog::SourceCatalog;
use crate::core::load::{LoadOrchestrator, LoadRequest};
use crate::core::report::{merge_rerun, merge_service_rerun, ReportAggregator, RunReport};
use crate::core::retry::RetryPolicy;
use crate::core::validation::{ValidationEngine, ValidationSettings};
use crate::domain::{Result, ServiceName, TableId, TabliftError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Per-invocation options, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run date substituted into `{date}` templates (`YYYY-MM-DD`)
    pub date: String,
    pub service: Option<String>,
    pub table: Option<String>,
    pub rerun: bool,
    pub validate_only: bool,
    pub validation_mode: Option<ValidationMode>,
    pub validation_source: Option<ValidationSource>,
    pub sample_size: Option<usize>,
    pub output_file: Option<PathBuf>,
}

impl RunOptions {
    /// Checks flag combinations that configuration cannot express
    pub fn validate(&self) -> Result<()> {
        if self.table.is_some() && self.service.is_none() {
            return Err(TabliftError::Configuration(
                "--table requires --service".to_string(),
            ));
        }
        if self.rerun && self.service.is_none() {
            return Err(TabliftError::Configuration(
                "--rerun requires --service".to_string(),
            ));
        }
        if self.sample_size == Some(0) {
            return Err(TabliftError::Configuration(
                "--sample-size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    fn table_id(&self) -> Result<Option<TableId>> {
        self.table
            .as_deref()
            .map(TableId::new)
            .transpose()
            .map_err(TabliftError::Configuration)
    }
}

/// Gateways used by one run
#[derive(Clone)]
pub struct Gateways {
    pub warehouse: Arc<dyn WarehouseGateway>,
    /// Source the load phase reads from
    pub files: Arc<dyn SourceGateway>,
    /// Source the validation phase compares against
    pub validation: Arc<dyn SourceGateway>,
}

impl Gateways {
    /// Builds the production gateways from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a client cannot be built, and a
    /// gateway error when the relational source is unreachable.
    pub async fn from_config(config: &TabliftConfig, validation: ValidationSource) -> Result<Self> {
        let warehouse_client = BigQueryClient::new(&config.warehouse)?;
        tracing::info!(
            project = %warehouse_client.project_id(),
            region = %config.warehouse.region,
            "Warehouse client ready"
        );
        let warehouse: Arc<dyn WarehouseGateway> =
            Arc::new(BigQueryWarehouse::new(warehouse_client));

        let store = file_store(config)?;
        let files: Arc<dyn SourceGateway> = Arc::new(FileSourceGateway::new(
            store,
            config.validation.schema_inference_rows,
        ));

        let validation: Arc<dyn SourceGateway> = match validation {
            ValidationSource::Files => files.clone(),
            ValidationSource::Relational => {
                let relational = config.relational.clone().ok_or_else(|| {
                    TabliftError::Configuration(
                        "[relational] is required for --validate-source relational".to_string(),
                    )
                })?;
                let client = PostgreSQLClient::new(relational)?;
                client.test_connection().await?;
                Arc::new(RelationalSourceGateway::new(client))
            }
        };

        Ok(Self {
            warehouse,
            files,
            validation,
        })
    }
}

fn file_store(config: &TabliftConfig) -> Result<Arc<dyn FileStore>> {
    let source = &config.source;
    match source.kind {
        SourceKind::Local => Ok(Arc::new(LocalFileStore::new(&source.base_path))),
        SourceKind::Gcs => {
            let bucket = source
                .bucket
                .clone()
                .filter(|b| !b.trim().is_empty())
                .ok_or_else(|| {
                    TabliftError::Configuration("source.bucket is required for gcs".to_string())
                })?;
            let token = source
                .gcs_access_token
                .clone()
                .unwrap_or_else(|| config.warehouse.access_token.clone());
            Ok(Arc::new(GcsFileStore::new(
                &source.gcs_base_url,
                bucket,
                token,
                Duration::from_secs(config.warehouse.request_timeout_seconds),
            )?))
        }
    }
}

/// Drives one run end to end
pub struct RunCoordinator {
    config: TabliftConfig,
    gateways: Gateways,
    shutdown: watch::Receiver<bool>,
}

impl RunCoordinator {
    pub fn new(config: TabliftConfig, gateways: Gateways, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config,
            gateways,
            shutdown,
        }
    }

    /// Builds the coordinator with gateways for the chosen validation source
    pub async fn from_config(
        config: TabliftConfig,
        options: &RunOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let source = options
            .validation_source
            .unwrap_or(config.validation.source);
        let gateways = Gateways::from_config(&config, source).await?;
        Ok(Self::new(config, gateways, shutdown))
    }

    /// Where the report for `options` is written
    pub fn report_path(&self, options: &RunOptions) -> PathBuf {
        options
            .output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.config.report.path_for(&options.date)))
    }

    /// Runs the requested phases and writes the report
    ///
    /// Entity and service failures are recorded in the report; only
    /// configuration and I/O problems are returned as errors.
    pub async fn execute(&self, options: &RunOptions) -> Result<RunReport> {
        let report = self.run(options).await?;
        let path = self.report_path(options);

        let report = match (&options.service, options.rerun) {
            (Some(service), true) => match RunReport::read_from_file(&path)? {
                Some(previous) => {
                    let service =
                        ServiceName::new(service.clone()).map_err(TabliftError::Configuration)?;
                    match options.table_id()? {
                        Some(table) => {
                            tracing::info!(
                                path = %path.display(),
                                service = %service,
                                table = %table,
                                "Merging table rerun into previous report"
                            );
                            merge_rerun(previous, report, &service, &table)
                        }
                        None => {
                            tracing::info!(
                                path = %path.display(),
                                service = %service,
                                "Merging service rerun into previous report"
                            );
                            merge_service_rerun(previous, report, &service)
                        }
                    }
                }
                None => report,
            },
            _ => report,
        };

        report.write_to_file(&path)?;
        tracing::info!(
            path = %path.display(),
            status = %report.status,
            exit_code = report.exit_code,
            "Report written"
        );
        Ok(report)
    }

    /// Runs the phases without touching the report file
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        options.validate()?;
        let start = Instant::now();
        let services = self
            .config
            .resolve_services(&options.date, options.service.as_deref())?;
        let table = options.table_id()?;

        tracing::info!(
            date = %options.date,
            services = services.len(),
            table = table.as_ref().map(|t| t.as_str()),
            rerun = options.rerun,
            validate_only = options.validate_only,
            "Starting run"
        );

        let mut aggregator = ReportAggregator::new(options.date.clone()).with_services(&services);

        if !options.validate_only {
            let catalog = Arc::new(
                SourceCatalog::new(self.gateways.files.clone(), &self.config.source.skip_patterns)
                    .with_retry(RetryPolicy::from_config(&self.config.load.retry)),
            );
            let orchestrator = LoadOrchestrator::new(
                self.gateways.warehouse.clone(),
                catalog,
                &self.config.load,
                self.config.warehouse.allow_region_override,
            );
            let request = LoadRequest {
                rerun: options.rerun,
                table: table.clone(),
            };
            for report in orchestrator
                .load_services(&services, &request, &self.shutdown)
                .await
            {
                aggregator.add_load_report(report);
            }
            tracing::info!(
                peak_services = orchestrator.service_stats().peak(),
                peak_entities = orchestrator.entity_peak(),
                "Load phase finished"
            );
        }

        if !self.interrupted() {
            let mut settings = ValidationSettings::from(&self.config.validation);
            if let Some(mode) = options.validation_mode {
                settings.mode = mode;
            }
            if let Some(size) = options.sample_size {
                settings.sample_size = size;
            }
            let catalog = Arc::new(
                SourceCatalog::new(self.gateways.validation.clone(), &self.config.source.skip_patterns)
                    .with_retry(RetryPolicy::from_config(&self.config.load.retry)),
            );
            let engine = ValidationEngine::new(
                self.gateways.warehouse.clone(),
                catalog,
                settings,
                &self.config.load,
            );
            for report in engine
                .validate_services(&services, table.as_ref(), &self.shutdown)
                .await
            {
                aggregator.add_validation_report(report);
            }
        }

        let interrupted = self.interrupted();
        if interrupted {
            tracing::warn!("Run interrupted; unscheduled work was skipped");
        }

        let report = aggregator.finish(interrupted);
        tracing::info!(
            status = %report.status,
            exit_code = report.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(report)
    }

    fn interrupted(&self) -> bool {
        *self.shutdown.borrow()
    }
}
