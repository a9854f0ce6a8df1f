//! Shared fixtures for integration tests
//!
//! `MemoryWarehouse` keeps tables as parsed CSV rows and implements create,
//! merge, count and ordered sampling in memory. It records how many calls are
//! in flight so tests can check pool bounds.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tablift::adapters::source::{
    FileSourceGateway, LocalFileStore, SourceArtifact, SourceGateway,
};
use tablift::adapters::source::files::sanitize_header;
use tablift::adapters::warehouse::{LoadSource, WarehouseGateway};
use tablift::config::{parse_config, TabliftConfig};
use tablift::core::runner::{Gateways, RunCoordinator};
use tablift::domain::value::{compare_cells, infer_type};
use tablift::domain::{
    CellValue, Column, DatasetId, GatewayError, Result, Sample, Schema, ServiceDescriptor,
    SourceEntity, TableId, TabliftError,
};
use tokio::sync::watch;

pub const RUN_DATE: &str = "2025-01-15";

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MemoryTable {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| sanitize_header(h, i))
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                (0..columns.len())
                    .map(|i| record.get(i).filter(|v| !v.is_empty()).map(str::to_string))
                    .collect(),
            );
        }
        Ok(Self { columns, rows })
    }

    fn schema(&self) -> Schema {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Column::new(
                    name.clone(),
                    infer_type(self.rows.iter().filter_map(|r| r[i].as_deref())),
                )
            })
            .collect()
    }
}

fn key_of(row: &[Option<String>], keys: &[usize]) -> Vec<Option<String>> {
    keys.iter().map(|&i| row[i].clone()).collect()
}

#[derive(Default)]
struct State {
    datasets: BTreeMap<String, String>,
    tables: BTreeMap<(String, String), MemoryTable>,
}

/// In-memory [`WarehouseGateway`]
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    writes: AtomicUsize,
    delay: Duration,
    /// Fails this many `create_table`/`upsert` calls with a transient error
    transient_failures: AtomicUsize,
}

struct InFlight<'a>(&'a MemoryWarehouse);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay`, so concurrent calls overlap
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    pub fn with_dataset(self, dataset: &str, region: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .datasets
            .insert(dataset.to_string(), region.to_string());
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn table(&self, dataset: &str, table: &str) -> Option<MemoryTable> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&(dataset.to_string(), table.to_string()))
            .cloned()
    }

    pub fn table_names(&self, dataset: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tables
            .keys()
            .filter(|(d, _)| d == dataset)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Removes the last row of a table
    pub fn drop_last_row(&self, dataset: &str, table: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
        {
            t.rows.pop();
        }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        guard
    }

    fn transient(&self) -> Result<()> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::ServerError {
                status: 503,
                message: "Backend unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn read(&self, dataset: &DatasetId, table: &TableId) -> Result<MemoryTable> {
        self.table(dataset.as_str(), table.as_str())
            .ok_or_else(|| GatewayError::NotFound(format!("{dataset}.{table}")).into())
    }
}

fn bytes(source: &LoadSource) -> Result<&[u8]> {
    match source {
        LoadSource::Bytes(bytes) => Ok(bytes),
        LoadSource::Uri(uri) => Err(TabliftError::Load(format!("Unsupported source {uri}"))),
    }
}

#[async_trait]
impl WarehouseGateway for MemoryWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool> {
        let _guard = self.enter().await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .datasets
            .contains_key(dataset.as_str()))
    }

    async fn create_dataset(&self, dataset: &DatasetId, region: &str) -> Result<()> {
        let _guard = self.enter().await;
        self.state
            .lock()
            .unwrap()
            .datasets
            .insert(dataset.to_string(), region.to_string());
        Ok(())
    }

    async fn dataset_region(&self, dataset: &DatasetId) -> Result<String> {
        let _guard = self.enter().await;
        self.state
            .lock()
            .unwrap()
            .datasets
            .get(dataset.as_str())
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(dataset.to_string()).into())
    }

    async fn table_exists(&self, dataset: &DatasetId, table: &TableId) -> Result<bool> {
        let _guard = self.enter().await;
        Ok(self.table(dataset.as_str(), table.as_str()).is_some())
    }

    async fn create_table(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
    ) -> Result<()> {
        let _guard = self.enter().await;
        self.transient()?;
        let parsed = MemoryTable::parse(bytes(source)?)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .tables
            .insert((dataset.to_string(), table.to_string()), parsed);
        Ok(())
    }

    async fn upsert(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
        key_columns: &[String],
    ) -> Result<()> {
        let _guard = self.enter().await;
        self.transient()?;
        let staged = MemoryTable::parse(bytes(source)?)?;
        let mut state = self.state.lock().unwrap();
        let target = state
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| GatewayError::NotFound(table.to_string()))?;

        let key_index = |columns: &[String]| -> Result<Vec<usize>> {
            key_columns
                .iter()
                .map(|k| {
                    columns
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case(k))
                        .ok_or_else(|| TabliftError::Load(format!("Key column '{k}' missing")))
                })
                .collect()
        };
        let target_keys = key_index(&target.columns)?;
        let staged_keys = key_index(&staged.columns)?;

        let mut seen = Vec::new();
        for row in &staged.rows {
            let key = key_of(row, &staged_keys);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key.clone());
            match target
                .rows
                .iter_mut()
                .find(|r| key_of(r, &target_keys) == key)
            {
                Some(existing) => *existing = row.clone(),
                None => target.rows.push(row.clone()),
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_table(&self, dataset: &DatasetId, table: &TableId) -> Result<()> {
        let _guard = self.enter().await;
        self.state
            .lock()
            .unwrap()
            .tables
            .remove(&(dataset.to_string(), table.to_string()));
        Ok(())
    }

    async fn get_schema(&self, dataset: &DatasetId, table: &TableId) -> Result<Schema> {
        let _guard = self.enter().await;
        Ok(self.read(dataset, table)?.schema())
    }

    async fn get_row_count(&self, dataset: &DatasetId, table: &TableId) -> Result<u64> {
        let _guard = self.enter().await;
        Ok(self.read(dataset, table)?.rows.len() as u64)
    }

    async fn get_sample(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample> {
        let _guard = self.enter().await;
        let data = self.read(dataset, table)?;
        let schema = data.schema();
        let order: Vec<(usize, Column)> = order_by
            .iter()
            .filter_map(|name| {
                let i = schema.index_of(name)?;
                Some((i, schema.columns()[i].clone()))
            })
            .collect();

        let mut rows = data.rows.clone();
        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|(i, c)| {
                    compare_cells(
                        &CellValue::parse(a[*i].as_deref(), &c.data_type),
                        &CellValue::parse(b[*i].as_deref(), &c.data_type),
                    )
                })
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(n);
        Ok(Sample::new(data.columns, rows))
    }
}

/// Writes `files` (name, contents) under `root/<service>/`
pub fn write_service(root: &Path, service: &str, files: &[(&str, String)]) {
    let dir = root.join(service);
    std::fs::create_dir_all(&dir).unwrap();
    for (name, contents) in files {
        std::fs::write(dir.join(name), contents).unwrap();
    }
}

/// CSV with an `id` and a `name` column and `rows` data rows
pub fn people_csv(rows: usize) -> String {
    let mut csv = String::from("id,name,score\n");
    for i in 1..=rows {
        csv.push_str(&format!("{i},person_{i},{}.5\n", i % 7));
    }
    csv
}

/// Configuration with a local source rooted at `root`
///
/// `load` lines go under `[load]`; `extra` is appended as further sections.
pub fn config(root: &Path, services: &[&str], load: &str, extra: &str) -> TabliftConfig {
    let services = services
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
services = [{services}]

[warehouse]
project_id = "test-project"
region = "europe-west2"
dataset_template = "{{service}}_dataset"
access_token = "token"

[source]
kind = "local"
base_path = "{}"
path_template = "{{service}}"

[load]
{load}

[load.retry]
max_retries = 3
initial_delay_ms = 1
max_delay_ms = 5

{extra}
"#,
        root.display()
    );
    let config = parse_config(&toml).unwrap();
    config.validate().unwrap();
    config
}

pub fn file_source(root: &Path) -> Arc<dyn SourceGateway> {
    Arc::new(FileSourceGateway::new(
        Arc::new(LocalFileStore::new(root)),
        1000,
    ))
}

/// Source whose first listings answer 503 before delegating
pub struct BusySource {
    inner: Arc<dyn SourceGateway>,
    busy_listings: AtomicUsize,
    listings: AtomicUsize,
}

impl BusySource {
    pub fn new(inner: Arc<dyn SourceGateway>, busy_listings: usize) -> Self {
        Self {
            inner,
            busy_listings: AtomicUsize::new(busy_listings),
            listings: AtomicUsize::new(0),
        }
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceGateway for BusySource {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn list_entities(&self, service: &ServiceDescriptor) -> Result<Vec<SourceArtifact>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let busy = self
            .busy_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if busy {
            return Err(GatewayError::ServerError {
                status: 503,
                message: "gcs busy".to_string(),
            }
            .into());
        }
        self.inner.list_entities(service).await
    }

    async fn get_schema(&self, service: &ServiceDescriptor, entity: &SourceEntity) -> Result<Schema> {
        self.inner.get_schema(service, entity).await
    }

    async fn get_row_count(&self, service: &ServiceDescriptor, entity: &SourceEntity) -> Result<u64> {
        self.inner.get_row_count(service, entity).await
    }

    async fn get_sample(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample> {
        self.inner.get_sample(service, entity, n, order_by).await
    }

    async fn load_source(&self, service: &ServiceDescriptor, entity: &SourceEntity) -> Result<LoadSource> {
        self.inner.load_source(service, entity).await
    }
}

pub fn coordinator(
    config: TabliftConfig,
    warehouse: Arc<MemoryWarehouse>,
    shutdown: watch::Receiver<bool>,
) -> RunCoordinator {
    let files = file_source(Path::new(&config.source.base_path));
    coordinator_with_source(config, warehouse, files, shutdown)
}

pub fn coordinator_with_source(
    config: TabliftConfig,
    warehouse: Arc<MemoryWarehouse>,
    files: Arc<dyn SourceGateway>,
    shutdown: watch::Receiver<bool>,
) -> RunCoordinator {
    let gateways = Gateways {
        warehouse,
        files: files.clone(),
        validation: files,
    };
    RunCoordinator::new(config, gateways, shutdown)
}
