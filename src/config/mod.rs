//! Configuration management for Tablift.
//!
//! TOML configuration files with `${VAR_NAME}` substitution, `TABLIFT_*`
//! environment overrides, defaults for optional settings, and validation.
//!
//! # Example Configuration
//!
//! ```toml
//! services = ["billing", "auth"]
//!
//! [warehouse]
//! project_id = "acme-analytics"
//! region = "europe-west2"
//! dataset_template = "dev_{service}_service"
//! access_token = "${TABLIFT_WAREHOUSE_TOKEN}"
//!
//! [source]
//! kind = "gcs"
//! bucket = "acme-exports"
//! path_template = "sql-exports/{date}/csvextract/{service}"
//!
//! [load]
//! service_concurrency = 5
//! entity_concurrency = 10
//!
//! [load.key_columns]
//! invoices = ["invoice_id"]
//!
//! [validation]
//! mode = "both"
//! sample_size = 100
//! ```
//!
//! Services are resolved once per run into
//! [`ServiceDescriptor`](crate::domain::ServiceDescriptor) values with
//! [`TabliftConfig::resolve_services`].

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, KeyFallback, LoadConfig, LoggingConfig, RelationalConfig, ReportConfig,
    RetryConfig, SourceConfig, SourceKind, TabliftConfig, ValidationConfig, ValidationMode,
    ValidationSource, WarehouseConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
