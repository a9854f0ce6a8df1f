//! Object stores holding exported CSV files
//!
//! [`LocalFileStore`] walks a directory tree; [`GcsFileStore`] talks to the
//! Cloud Storage JSON API with a bearer token.

use super::traits::SourceArtifact;
use crate::adapters::bigquery::client::{error_from_response, map_transport_error};
use crate::adapters::warehouse::LoadSource;
use crate::config::SecretString;
use crate::domain::{GatewayError, Result, TabliftError};
use async_trait::async_trait;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Listing and reading of raw files under a prefix
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Every object below `prefix`, recursively, sorted by location
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix cannot be listed. An existing but
    /// empty prefix yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<SourceArtifact>>;

    /// Full contents of one object
    async fn read(&self, location: &str) -> Result<Vec<u8>>;

    /// How the warehouse should ingest one object
    async fn load_source(&self, location: &str) -> Result<LoadSource>;
}

/// Files on the local filesystem under a base directory
pub struct LocalFileStore {
    base_path: PathBuf,
}

impl LocalFileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, prefix: &str) -> PathBuf {
        let prefix = Path::new(prefix);
        if prefix.is_absolute() {
            prefix.to_path_buf()
        } else {
            self.base_path.join(prefix)
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn list(&self, prefix: &str) -> Result<Vec<SourceArtifact>> {
        let root = self.resolve(prefix);
        let metadata = tokio::fs::metadata(&root).await.map_err(|e| {
            TabliftError::Io(format!("Cannot access {}: {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(TabliftError::Io(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut artifacts = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                artifacts.push(SourceArtifact::new(name, path.to_string_lossy()));
            }
        }

        artifacts.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(artifacts)
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>> {
        tokio::fs::read(location)
            .await
            .map_err(|e| TabliftError::Io(format!("Failed to read {location}: {e}")))
    }

    async fn load_source(&self, location: &str) -> Result<LoadSource> {
        Ok(LoadSource::Bytes(self.read(location).await?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

/// Objects in one Cloud Storage bucket
pub struct GcsFileStore {
    http: reqwest::Client,
    base_url: Url,
    bucket: String,
    access_token: SecretString,
}

impl GcsFileStore {
    /// Create a store for `bucket`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            TabliftError::Configuration(format!("Invalid source.gcs_base_url '{base_url}': {e}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                TabliftError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url,
            bucket: bucket.into(),
            access_token,
        })
    }

    /// Builds `{base}/storage/v1/b/{bucket}/o[/{object}]`
    fn objects_url(&self, object: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                TabliftError::Configuration("source.gcs_base_url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            if let Some(object) = object {
                path.push(object);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let response = self
            .http
            .request(Method::GET, url)
            .bearer_auth(self.access_token.expose_secret().as_ref())
            .send()
            .await
            .map_err(map_transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await.into())
        }
    }
}

#[async_trait]
impl FileStore for GcsFileStore {
    async fn list(&self, prefix: &str) -> Result<Vec<SourceArtifact>> {
        let prefix = prefix.trim_start_matches('/');
        let mut artifacts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(ref token) = page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ObjectList = self.get(url).await?.json().await.map_err(|e| {
                GatewayError::InvalidResponse(format!("Failed to decode object listing: {e}"))
            })?;

            for object in page.items {
                if object.name.ends_with('/') {
                    continue;
                }
                let name = object
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or(object.name.as_str())
                    .to_string();
                artifacts.push(SourceArtifact::new(name, object.name));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(bucket = %self.bucket, prefix = %prefix, count = artifacts.len(), "Listed objects");
        artifacts.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(artifacts)
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>> {
        let mut url = self.objects_url(Some(location))?;
        url.query_pairs_mut().append_pair("alt", "media");
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(map_transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn load_source(&self, location: &str) -> Result<LoadSource> {
        Ok(LoadSource::Uri(format!("gs://{}/{}", self.bucket, location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use mockito::Matcher;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_list_is_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let service = dir.path().join("billing");
        std::fs::create_dir_all(service.join("nested")).unwrap();
        std::fs::write(service.join("b.csv"), "id\n1\n").unwrap();
        std::fs::write(service.join("nested").join("a.csv"), "id\n1\n").unwrap();

        let store = LocalFileStore::new(dir.path());
        let artifacts = store.list("billing").await.unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b.csv", "a.csv"]);
    }

    #[tokio::test]
    async fn test_local_missing_directory_is_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());
        assert!(store.list("absent").await.is_err());
    }

    #[tokio::test]
    async fn test_local_empty_directory_is_empty_list() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let store = LocalFileStore::new(dir.path());
        assert!(store.list("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gcs_list_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/storage/v1/b/exports/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("prefix".into(), "2024-01-01/billing".into()),
                // first page carries no pageToken
                Matcher::Regex("^prefix=[^&]*&fields=[^&]*$".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"items":[{"name":"2024-01-01/billing/users.csv"}],"nextPageToken":"p2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/storage/v1/b/exports/o")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"name":"2024-01-01/billing/invoices.csv"}]}"#)
            .create_async()
            .await;

        let store = GcsFileStore::new(
            &server.url(),
            "exports",
            secret_string("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let artifacts = store.list("/2024-01-01/billing").await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "invoices.csv");
        assert_eq!(artifacts[0].location, "2024-01-01/billing/invoices.csv");

        let source = store.load_source(&artifacts[1].location).await.unwrap();
        assert!(matches!(source, LoadSource::Uri(ref u) if u == "gs://exports/2024-01-01/billing/users.csv"));
    }

    #[tokio::test]
    async fn test_gcs_empty_prefix_is_empty_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/storage/v1/b/exports/o")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let store = GcsFileStore::new(
            &server.url(),
            "exports",
            secret_string("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(store.list("nothing/here").await.unwrap().is_empty());
    }
}
