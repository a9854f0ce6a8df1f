//! BigQuery REST client
//!
//! Thin wrapper over the BigQuery v2 REST API: dataset and table resources,
//! load jobs (from `gs://` URIs or uploaded bytes), and queries. Every
//! transport or API failure is returned as a classified
//! [`GatewayError`](crate::domain::GatewayError); retrying is the caller's job.

use super::models::{
    DatasetReference, DatasetResource, ErrorEnvelope, FormatOptions, JobConfiguration, JobInsert,
    JobReference, JobResource, LoadConfiguration, QueryRequest, QueryResponse, TableReference,
    TableResource, TableSchema,
};
use crate::adapters::warehouse::LoadSource;
use crate::config::{SecretString, WarehouseConfig};
use crate::domain::{DatasetId, GatewayError, Result, TableId, TabliftError};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

/// Longest a single `jobs.query`/`getQueryResults` call waits server-side
const QUERY_WAIT_MS: u64 = 10_000;

/// Rows of a finished query
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub schema: TableSchema,
    pub rows: Vec<Vec<Option<String>>>,
}

/// BigQuery client bound to one project
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: Url,
    project_id: String,
    access_token: SecretString,
    job_timeout: Duration,
    poll_interval: Duration,
}

impl BigQueryClient {
    /// Create a new BigQuery client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            TabliftError::Configuration(format!(
                "Invalid warehouse.api_base_url '{}': {}",
                config.api_base_url, e
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                TabliftError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url,
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
            poll_interval: Duration::from_millis(config.job_poll_interval_ms),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Builds `{base}/{prefix...}/projects/{project}/{segments...}`
    fn url(&self, prefix: &[&str], segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                TabliftError::Configuration("warehouse.api_base_url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(prefix);
            path.push("projects");
            path.push(&self.project_id);
            path.extend(segments);
        }
        Ok(url)
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        self.url(&["bigquery", "v2"], segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(self.access_token.expose_secret().as_ref())
    }

    /// Sends a request and converts transport failures and error statuses
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await.into())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            GatewayError::InvalidResponse(format!("Failed to decode BigQuery response: {e}")).into()
        })
    }

    /// Fetch a dataset, `None` if it does not exist
    pub async fn get_dataset(&self, dataset: &DatasetId) -> Result<Option<DatasetResource>> {
        let url = self.api_url(&["datasets", dataset.as_str()])?;
        match self.send_json(self.request(Method::GET, url)).await {
            Ok(resource) => Ok(Some(resource)),
            Err(TabliftError::Gateway(GatewayError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a dataset; an existing dataset is left untouched
    pub async fn insert_dataset(&self, dataset: &DatasetId, location: &str) -> Result<()> {
        let url = self.api_url(&["datasets"])?;
        let body = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: self.project_id.clone(),
                dataset_id: dataset.as_str().to_string(),
            },
            location: Some(location.to_string()),
        };

        match self.send(self.request(Method::POST, url).json(&body)).await {
            Ok(_) => Ok(()),
            Err(TabliftError::Gateway(GatewayError::Rejected { status: 409, .. })) => {
                tracing::debug!(dataset = %dataset, "Dataset already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch table metadata, `None` if it does not exist
    pub async fn get_table(
        &self,
        dataset: &DatasetId,
        table: &TableId,
    ) -> Result<Option<TableResource>> {
        let url = self.api_url(&["datasets", dataset.as_str(), "tables", table.as_str()])?;
        match self.send_json(self.request(Method::GET, url)).await {
            Ok(resource) => Ok(Some(resource)),
            Err(TabliftError::Gateway(GatewayError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a table; a missing table is not an error
    pub async fn delete_table(&self, dataset: &DatasetId, table: &TableId) -> Result<()> {
        let url = self.api_url(&["datasets", dataset.as_str(), "tables", table.as_str()])?;
        match self.send(self.request(Method::DELETE, url)).await {
            Ok(_) | Err(TabliftError::Gateway(GatewayError::NotFound(_))) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Run a CSV load job into `table` (truncating it) and wait for completion
    pub async fn load_csv(
        &self,
        dataset: &DatasetId,
        table: &TableId,
        source: &LoadSource,
        location: Option<&str>,
    ) -> Result<()> {
        let destination = TableReference {
            project_id: self.project_id.clone(),
            dataset_id: dataset.as_str().to_string(),
            table_id: table.as_str().to_string(),
        };
        let uris = match source {
            LoadSource::Uri(uri) => vec![uri.clone()],
            LoadSource::Bytes(_) => Vec::new(),
        };
        let job = JobInsert {
            job_reference: self.new_job_reference(location),
            configuration: JobConfiguration {
                load: LoadConfiguration::csv_truncate(destination, uris),
            },
        };

        tracing::debug!(
            dataset = %dataset,
            table = %table,
            source = %source.describe(),
            job_id = %job.job_reference.job_id,
            "Submitting load job"
        );

        let inserted: JobResource = match source {
            LoadSource::Uri(_) => {
                let url = self.api_url(&["jobs"])?;
                self.send_json(self.request(Method::POST, url).json(&job))
                    .await?
            }
            LoadSource::Bytes(bytes) => {
                let mut url = self.url(&["upload", "bigquery", "v2"], &["jobs"])?;
                url.query_pairs_mut().append_pair("uploadType", "multipart");
                let (content_type, body) = multipart_related(&job, bytes)?;
                self.send_json(
                    self.request(Method::POST, url)
                        .header(reqwest::header::CONTENT_TYPE, content_type)
                        .body(body),
                )
                .await?
            }
        };

        self.wait_for_job(inserted).await
    }

    fn new_job_reference(&self, location: Option<&str>) -> JobReference {
        JobReference {
            project_id: self.project_id.clone(),
            job_id: format!("tablift_{}", Uuid::new_v4().simple()),
            location: location.map(str::to_string),
        }
    }

    async fn wait_for_job(&self, mut job: JobResource) -> Result<()> {
        let deadline = Instant::now() + self.job_timeout;

        loop {
            if job.status.state == "DONE" {
                return match job.status.error_result {
                    Some(err) if err.is_transient() => Err(GatewayError::ServerError {
                        status: 503,
                        message: err.describe(),
                    }
                    .into()),
                    Some(err) => Err(GatewayError::JobFailed(err.describe()).into()),
                    None => Ok(()),
                };
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!(
                    "job {} did not finish within {}s",
                    job.job_reference.job_id,
                    self.job_timeout.as_secs()
                ))
                .into());
            }

            tokio::time::sleep(self.poll_interval).await;

            let mut url = self.api_url(&["jobs", &job.job_reference.job_id])?;
            if let Some(location) = &job.job_reference.location {
                url.query_pairs_mut().append_pair("location", location);
            }
            job = self.send_json(self.request(Method::GET, url)).await?;
        }
    }

    /// Run a standard SQL query and collect up to `max_rows` rows
    ///
    /// TIMESTAMP cells are returned as RFC 3339 strings.
    pub async fn query(
        &self,
        sql: &str,
        location: Option<&str>,
        max_rows: Option<usize>,
    ) -> Result<QueryResult> {
        let deadline = Instant::now() + self.job_timeout;
        let request = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            timeout_ms: QUERY_WAIT_MS,
            max_results: max_rows.map(|n| n as u64),
            location: location.map(str::to_string),
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        };

        tracing::trace!(sql = %sql, "Running query");
        let url = self.api_url(&["queries"])?;
        let mut response: QueryResponse = self
            .send_json(self.request(Method::POST, url).json(&request))
            .await?;

        let job_ref = response.job_reference.clone();
        while !response.job_complete {
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!(
                    "query did not finish within {}s",
                    self.job_timeout.as_secs()
                ))
                .into());
            }
            let job_ref = job_ref.as_ref().ok_or_else(|| {
                GatewayError::InvalidResponse("incomplete query without job reference".into())
            })?;
            response = self.get_query_results(job_ref, None, max_rows).await?;
        }

        if let Some(err) = response.errors.first() {
            return Err(GatewayError::JobFailed(err.describe()).into());
        }

        let schema = response.schema.clone().unwrap_or_default();
        let mut rows = Vec::new();
        loop {
            for row in response.rows.drain(..) {
                rows.push(convert_row(&schema, row));
                if max_rows.is_some_and(|max| rows.len() >= max) {
                    return Ok(QueryResult { schema, rows });
                }
            }
            let (Some(token), Some(job_ref)) = (response.page_token.take(), job_ref.as_ref())
            else {
                break;
            };
            response = self
                .get_query_results(job_ref, Some(&token), max_rows.map(|m| m - rows.len()))
                .await?;
        }

        Ok(QueryResult { schema, rows })
    }

    async fn get_query_results(
        &self,
        job_ref: &JobReference,
        page_token: Option<&str>,
        max_rows: Option<usize>,
    ) -> Result<QueryResponse> {
        let mut url = self.api_url(&["queries", &job_ref.job_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeoutMs", &QUERY_WAIT_MS.to_string());
            query.append_pair("formatOptions.useInt64Timestamp", "true");
            if let Some(location) = &job_ref.location {
                query.append_pair("location", location);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
            if let Some(max) = max_rows {
                query.append_pair("maxResults", &max.to_string());
            }
        }
        self.send_json(self.request(Method::GET, url)).await
    }
}

fn convert_row(schema: &TableSchema, row: super::models::Row) -> Vec<Option<String>> {
    row.f
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            let is_timestamp = schema
                .fields
                .get(i)
                .is_some_and(|f| f.field_type.eq_ignore_ascii_case("TIMESTAMP"));
            match cell.v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) if is_timestamp => Some(micros_to_rfc3339(&s)),
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }
        })
        .collect()
}

fn micros_to_rfc3339(raw: &str) -> String {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|| raw.to_string())
}

/// Builds a `multipart/related` body of job metadata followed by CSV data
fn multipart_related(job: &JobInsert, data: &[u8]) -> Result<(String, Vec<u8>)> {
    let boundary = format!("tablift_{}", Uuid::new_v4().simple());
    let metadata = serde_json::to_vec(job)?;

    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Ok((format!("multipart/related; boundary={boundary}"), body))
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else {
        GatewayError::ConnectionFailed(err.to_string())
    }
}

/// Classifies a non-success response, looking at BigQuery error reasons
pub(crate) async fn error_from_response(response: Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let message = envelope.error.message.clone();
        if envelope.error.errors.iter().any(|e| e.is_transient()) {
            return if status == StatusCode::TOO_MANY_REQUESTS
                || envelope
                    .error
                    .errors
                    .iter()
                    .any(|e| e.reason.as_deref() == Some("rateLimitExceeded"))
            {
                GatewayError::RateLimited(message)
            } else {
                GatewayError::ServerError {
                    status: status.as_u16(),
                    message,
                }
            };
        }
        return GatewayError::from_status(status.as_u16(), message);
    }

    GatewayError::from_status(status.as_u16(), body)
}
