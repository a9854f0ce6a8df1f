//! PostgreSQL-backed source gateway
//!
//! Entities are base tables of the service's schema. Values are fetched as
//! text so both sides of a comparison go through the same parser.

use super::traits::{SourceArtifact, SourceGateway};
use crate::adapters::postgresql::PostgreSQLClient;
use crate::domain::{
    Column, GatewayError, LogicalType, Result, Sample, Schema, ServiceDescriptor, SourceEntity,
};
use async_trait::async_trait;

/// Double-quotes a PostgreSQL identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// `SELECT` returning every column as text, ordered for deterministic sampling
///
/// String columns sort under the `C` collation, i.e. by bytes.
fn sample_sql(table: &str, schema: &Schema, order_by: &[&Column], n: usize) -> String {
    let select = schema
        .columns()
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("SELECT {select} FROM {table}");
    if !order_by.is_empty() {
        let order = order_by
            .iter()
            .map(|c| {
                let collate = if c.data_type == LogicalType::String {
                    " COLLATE \"C\""
                } else {
                    ""
                };
                format!("{}{} ASC NULLS FIRST", quote_ident(&c.name), collate)
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    sql.push_str(&format!(" LIMIT {n}"));
    sql
}

/// [`SourceGateway`] over a PostgreSQL database
pub struct RelationalSourceGateway {
    client: PostgreSQLClient,
}

impl RelationalSourceGateway {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceGateway for RelationalSourceGateway {
    fn kind(&self) -> &'static str {
        "relational"
    }

    async fn list_entities(&self, service: &ServiceDescriptor) -> Result<Vec<SourceArtifact>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[&service.relational_schema],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<SourceArtifact> {
                let name: String = row.try_get(0).map_err(|e| {
                    GatewayError::InvalidResponse(format!("Unexpected table listing row: {e}"))
                })?;
                let location = qualified(&service.relational_schema, &name);
                Ok(SourceArtifact::new(name, location))
            })
            .collect()
    }

    async fn get_schema(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<Schema> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&service.relational_schema, &entity.artifact],
            )
            .await?;

        if rows.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "table {}.{}",
                service.relational_schema, entity.artifact
            ))
            .into());
        }

        rows.iter()
            .map(|row| -> Result<Column> {
                let name: String = row.try_get(0).map_err(|e| {
                    GatewayError::InvalidResponse(format!("Unexpected column row: {e}"))
                })?;
                let data_type: String = row.try_get(1).map_err(|e| {
                    GatewayError::InvalidResponse(format!("Unexpected column row: {e}"))
                })?;
                Ok(Column::new(name, LogicalType::from_engine_type(&data_type)))
            })
            .collect()
    }

    async fn get_row_count(
        &self,
        _service: &ServiceDescriptor,
        entity: &SourceEntity,
    ) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.location);
        let rows = self.client.query(&sql, &[]).await?;
        let count: i64 = rows
            .first()
            .ok_or_else(|| GatewayError::InvalidResponse("COUNT(*) returned no rows".to_string()))?
            .try_get(0)
            .map_err(|e| GatewayError::InvalidResponse(format!("Unexpected COUNT(*) value: {e}")))?;
        Ok(count.max(0) as u64)
    }

    async fn get_sample(
        &self,
        service: &ServiceDescriptor,
        entity: &SourceEntity,
        n: usize,
        order_by: &[String],
    ) -> Result<Sample> {
        let schema = self.get_schema(service, entity).await?;
        let order: Vec<&Column> = order_by.iter().filter_map(|c| schema.get(c)).collect();

        let sql = sample_sql(&entity.location, &schema, &order, n);
        let rows = self.client.query(&sql, &[]).await?;

        let sampled = rows
            .iter()
            .map(|row| {
                (0..schema.len())
                    .map(|i| {
                        row.try_get::<_, Option<String>>(i).map_err(|e| {
                            GatewayError::InvalidResponse(format!("Unexpected sample value: {e}"))
                                .into()
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Sample::new(
            schema.names().map(str::to_string).collect(),
            sampled,
        ))
    }
}
