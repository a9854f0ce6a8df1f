//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{SourceKind, TabliftConfig, ValidationMode, ValidationSource};
use super::secret::secret_string;
use crate::domain::errors::TabliftError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`TabliftConfig`]
/// 4. Applies environment variable overrides (`TABLIFT_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns a configuration error if the file is missing or unreadable, a
/// referenced variable is unset, parsing fails, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use tablift::config::loader::load_config;
///
/// let config = load_config("tablift.toml").expect("Failed to load config");
/// println!("{} services", config.services.len());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TabliftConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TabliftError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        TabliftError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config = parse_config(&contents)?;

    config.validate().map_err(|e| {
        TabliftError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Parses configuration text without validating it
///
/// Substitution and environment overrides are applied.
pub fn parse_config(contents: &str) -> Result<TabliftConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: TabliftConfig = toml::from_str(&contents)
        .map_err(|e| TabliftError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TabliftError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(TabliftError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.parse().map(Some).map_err(|_| {
            TabliftError::Configuration(format!("Invalid value '{val}' for {name}"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the `TABLIFT_*` prefix
///
/// Variables follow the pattern `TABLIFT_<SECTION>_<KEY>`, for example
/// `TABLIFT_WAREHOUSE_REGION` or `TABLIFT_LOAD_ENTITY_CONCURRENCY`.
fn apply_env_overrides(config: &mut TabliftConfig) -> Result<()> {
    if let Ok(val) = std::env::var("TABLIFT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("TABLIFT_SERVICES") {
        config.services = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Warehouse overrides
    if let Ok(val) = std::env::var("TABLIFT_WAREHOUSE_PROJECT_ID") {
        config.warehouse.project_id = val;
    }
    if let Ok(val) = std::env::var("TABLIFT_WAREHOUSE_REGION") {
        config.warehouse.region = val;
    }
    if let Some(val) = env_parse("TABLIFT_WAREHOUSE_ALLOW_REGION_OVERRIDE")? {
        config.warehouse.allow_region_override = val;
    }
    if let Ok(val) = std::env::var("TABLIFT_WAREHOUSE_ACCESS_TOKEN") {
        config.warehouse.access_token = secret_string(val);
    }
    if let Ok(val) = std::env::var("TABLIFT_WAREHOUSE_API_BASE_URL") {
        config.warehouse.api_base_url = val;
    }

    // Source overrides
    if let Ok(val) = std::env::var("TABLIFT_SOURCE_KIND") {
        config.source.kind = match val.to_ascii_lowercase().as_str() {
            "gcs" => SourceKind::Gcs,
            "local" => SourceKind::Local,
            other => {
                return Err(TabliftError::Configuration(format!(
                    "Invalid TABLIFT_SOURCE_KIND '{other}'. Must be one of: gcs, local"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("TABLIFT_SOURCE_BUCKET") {
        config.source.bucket = Some(val);
    }
    if let Ok(val) = std::env::var("TABLIFT_SOURCE_BASE_PATH") {
        config.source.base_path = val;
    }
    if let Ok(val) = std::env::var("TABLIFT_SOURCE_GCS_ACCESS_TOKEN") {
        config.source.gcs_access_token = Some(secret_string(val));
    }

    // Relational overrides (only if the section is configured)
    if let Some(ref mut relational) = config.relational {
        if let Ok(val) = std::env::var("TABLIFT_RELATIONAL_CONNECTION_STRING") {
            relational.connection_string = secret_string(val);
        }
        if let Some(val) = env_parse("TABLIFT_RELATIONAL_MAX_CONNECTIONS")? {
            relational.max_connections = val;
        }
    }

    // Load overrides
    if let Some(val) = env_parse("TABLIFT_LOAD_SERVICE_CONCURRENCY")? {
        config.load.service_concurrency = val;
    }
    if let Some(val) = env_parse("TABLIFT_LOAD_ENTITY_CONCURRENCY")? {
        config.load.entity_concurrency = val;
    }
    if let Some(val) = env_parse("TABLIFT_LOAD_MAX_RETRIES")? {
        config.load.retry.max_retries = val;
    }

    // Validation overrides
    if let Ok(val) = std::env::var("TABLIFT_VALIDATION_MODE") {
        config.validation.mode = val
            .parse::<ValidationMode>()
            .map_err(TabliftError::Configuration)?;
    }
    if let Ok(val) = std::env::var("TABLIFT_VALIDATION_SOURCE") {
        config.validation.source = val
            .parse::<ValidationSource>()
            .map_err(TabliftError::Configuration)?;
    }
    if let Some(val) = env_parse("TABLIFT_VALIDATION_SAMPLE_SIZE")? {
        config.validation.sample_size = val;
    }

    // Logging overrides
    if let Some(val) = env_parse("TABLIFT_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("TABLIFT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
