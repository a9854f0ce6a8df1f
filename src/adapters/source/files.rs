//! CSV-backed source gateway
//!
//! Each entity is one CSV file with a header row. Column names are normalized
//! the same way warehouse schema autodetection names them, and column types are
//! inferred from a leading window of rows, so both sides of a comparison
//! describe the same columns.

use super::store::FileStore;
use super::traits::{SourceArtifact, SourceGateway};
use crate::adapters::warehouse::LoadSource;
use crate::domain::value::{compare_cells, infer_type};
use crate::domain::{CellValue, Column, Result, Sample, Schema, ServiceDescriptor, SourceEntity};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parsed CSV contents
#[derive(Debug, Default)]
struct CsvTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl CsvTable {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
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
            let row = (0..columns.len())
                .map(|i| {
                    record
                        .get(i)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
                .collect();
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    fn infer_schema(&self, window: usize) -> Schema {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values = self
                    .rows
                    .iter()
                    .take(window)
                    .filter_map(|row| row[i].as_deref());
                Column::new(name.clone(), infer_type(values))
            })
            .collect()
    }
}

/// Normalizes a CSV header the way BigQuery names autodetected columns
///
/// Characters other than letters, digits and `_` become `_`; a leading digit
/// gets a `_` prefix; a blank header becomes `string_field_<index>`.
pub fn sanitize_header(raw: &str, index: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return format!("string_field_{index}");
    }
    let mut name: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// [`SourceGateway`] reading CSV exports through a [`FileStore`]
pub struct FileSourceGateway {
    store: Arc<dyn FileStore>,
    inference_rows: usize,
}

impl FileSourceGateway {
    pub fn new(store: Arc<dyn FileStore>, inference_rows: usize) -> Self {
        Self {
            store,
            inference_rows: inference_rows.max(1),
        }
    }

    async fn read_table(&self, entity: &SourceEntity) -> Result<CsvTable> {
        let bytes = self.store.read(&entity.location).await?;
        CsvTable::parse(&bytes)
    }
}

#[async_trait]
impl SourceGateway for FileSourceGateway {
    fn kind(&self) -> &'static str {
        "files"
    }

    async fn list_entities(&self, service: &ServiceDescriptor) -> Result<Vec<SourceArtifact>> {
        let artifacts = self.store.list(&service.source_prefix).await?;
        Ok(artifacts
            .into_iter()
            .filter(|a| a.name.to_ascii_lowercase().ends_with(".csv"))
            .collect())
    }

    async fn get_schema(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<Schema> {
        let table = self.read_table(entity).await?;
        Ok(table.infer_schema(self.inference_rows))
    }

    async fn get_row_count(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<u64> {
        let table = self.read_table(entity).await?;
        Ok(table.rows.len() as u64)
    }

    async fn get_sample(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample> {
        let table = self.read_table(entity).await?;
        let schema = table.infer_schema(self.inference_rows);

        let order: Vec<(usize, &Column)> = order_by
            .iter()
            .filter_map(|name| schema.index_of(name).map(|i| (i, &schema.columns()[i])))
            .collect();

        let mut keyed: Vec<(Vec<CellValue>, Vec<Option<String>>)> = table
            .rows
            .into_iter()
            .map(|row| {
                let key = order
                    .iter()
                    .map(|(i, col)| CellValue::parse(row[*i].as_deref(), &col.data_type))
                    .collect();
                (key, row)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| compare_cells(x, y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let rows = keyed.into_iter().take(n).map(|(_, row)| row).collect();
        Ok(Sample::new(table.columns, rows))
    }

    async fn load_source(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<LoadSource> {
        self.store.load_source(&entity.location).await
    }
}
