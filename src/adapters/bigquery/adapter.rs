//! BigQuery implementation of the warehouse gateway
//!
//! Table-level operations are expressed as load jobs and standard SQL
//! statements on top of [`BigQueryClient`].

use super::client::BigQueryClient;
use crate::adapters::warehouse::{LoadSource, WarehouseGateway};
use crate::domain::{DatasetId, GatewayError, Result, Sample, Schema, TableId, TabliftError};
use async_trait::async_trait;
use std::sync::Arc;

/// BigQuery-backed [`WarehouseGateway`]
pub struct BigQueryWarehouse {
    client: Arc<BigQueryClient>,
}

impl BigQueryWarehouse {
    pub fn new(client: BigQueryClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    fn table_path(&self, dataset: &DatasetId, table: &TableId) -> String {
        table_path(self.client.project_id(), dataset.as_str(), table.as_str())
    }
}

/// Backtick-quotes an identifier
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

fn table_path(project: &str, dataset: &str, table: &str) -> String {
    quote_ident(&format!("{project}.{dataset}.{table}"))
}

/// Builds the MERGE from a staging table into its target
///
/// Staging rows are de-duplicated per key first; keys compare with
/// `IS NOT DISTINCT FROM` so NULL keys match themselves.
fn merge_sql(target: &str, staging: &str, columns: &[String], keys: &[String]) -> String {
    let key_list = keys.iter().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ");
    let on = keys
        .iter()
        .map(|k| {
            let col = quote_ident(k);
            format!("T.{col} IS NOT DISTINCT FROM S.{col}")
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    let updates = columns
        .iter()
        .filter(|c| !keys.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .map(|c| {
            let col = quote_ident(c);
            format!("T.{col} = S.{col}")
        })
        .collect::<Vec<_>>();
    let insert_cols = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>();
    let insert_vals = columns
        .iter()
        .map(|c| format!("S.{}", quote_ident(c)))
        .collect::<Vec<_>>();

    let mut sql = format!(
        "MERGE {target} AS T\nUSING (SELECT * FROM {staging} WHERE TRUE QUALIFY ROW_NUMBER() OVER (PARTITION BY {key_list}) = 1) AS S\nON {on}\n"
    );
    if !updates.is_empty() {
        sql.push_str(&format!(
            "WHEN MATCHED THEN UPDATE SET {}\n",
            updates.join(", ")
        ));
    }
    sql.push_str(&format!(
        "WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        insert_cols.join(", "),
        insert_vals.join(", ")
    ));
    sql
}

fn sample_sql(table: &str, order_by: &[String], n: usize) -> String {
    let mut sql = format!("SELECT * FROM {table}");
    if !order_by.is_empty() {
        let order = order_by
            .iter()
            .map(|c| format!("{} ASC NULLS FIRST", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    sql.push_str(&format!(" LIMIT {n}"));
    sql
}

#[async_trait]
impl WarehouseGateway for BigQueryWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool> {
        Ok(self.client.get_dataset(dataset).await?.is_some())
    }

    async fn create_dataset(&self, dataset: &DatasetId, region: &str) -> Result<()> {
        self.client.insert_dataset(dataset, region).await?;
        tracing::info!(dataset = %dataset, region = %region, "Dataset ready");
        Ok(())
    }

    async fn dataset_region(&self, dataset: &DatasetId) -> Result<String> {
        let resource = self.client.get_dataset(dataset).await?.ok_or_else(|| {
            TabliftError::Gateway(GatewayError::NotFound(format!("dataset {dataset}")))
        })?;
        resource.location.ok_or_else(|| {
            GatewayError::InvalidResponse(format!("dataset {dataset} has no location")).into()
        })
    }

    async fn table_exists(&self, dataset: &DatasetId, table: &TableId) -> Result<bool> {
        Ok(self.client.get_table(dataset, table).await?.is_some())
    }

    async fn create_table(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
    ) -> Result<()> {
        self.client.load_csv(dataset, table, source, None).await
    }

    async fn upsert(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
        key_columns: &[String],
    ) -> Result<()> {
        if key_columns.is_empty() {
            return Err(TabliftError::MissingKey(table.to_string()));
        }

        let staging = table.staging();
        self.client.load_csv(dataset, &staging, source, None).await?;

        let merged = async {
            let staging_schema = self.get_schema(dataset, &staging).await?;
            for key in key_columns {
                if staging_schema.index_of(key).is_none() {
                    return Err(TabliftError::Load(format!(
                        "Key column '{key}' not found in data for '{table}'"
                    )));
                }
            }
            let columns: Vec<String> = staging_schema.names().map(str::to_string).collect();
            let sql = merge_sql(
                &self.table_path(dataset, table),
                &self.table_path(dataset, &staging),
                &columns,
                key_columns,
            );
            self.client.query(&sql, None, Some(0)).await.map(|_| ())
        }
        .await;

        let cleanup = self.client.delete_table(dataset, &staging).await;
        if let Err(ref e) = cleanup {
            tracing::warn!(dataset = %dataset, table = %staging, error = %e, "Failed to drop staging table");
        }
        merged
    }

    async fn delete_table(&self, dataset: &DatasetId, table: &TableId) -> Result<()> {
        self.client.delete_table(dataset, table).await
    }

    async fn get_schema(&self, dataset: &DatasetId, table: &TableId) -> Result<Schema> {
        let resource = self.client.get_table(dataset, table).await?.ok_or_else(|| {
            TabliftError::Gateway(GatewayError::NotFound(format!("table {dataset}.{table}")))
        })?;
        Ok(resource.schema.to_schema())
    }

    async fn get_row_count(&self, dataset: &DatasetId, table: &TableId) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_path(dataset, table));
        let result = self.client.query(&sql, None, Some(1)).await?;
        result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_deref())
            .and_then(|count| count.parse::<u64>().ok())
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!("COUNT(*) on {dataset}.{table} returned no value"))
                    .into()
            })
    }

    async fn get_sample(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample> {
        let schema = self.get_schema(dataset, table).await?;
        let order: Vec<String> = order_by
            .iter()
            .filter_map(|c| schema.get(c).map(|col| col.name.clone()))
            .collect();

        let sql = sample_sql(&self.table_path(dataset, table), &order, n);
        let result = self.client.query(&sql, None, Some(n)).await?;
        let columns = if result.schema.fields.is_empty() {
            schema.names().map(str::to_string).collect()
        } else {
            result.schema.fields.iter().map(|f| f.name.clone()).collect()
        };
        Ok(Sample::new(columns, result.rows))
    }
}
