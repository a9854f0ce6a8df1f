//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Tablift configuration file.

use crate::adapters::postgresql::redact_connection_string;
use crate::config::{load_config, SourceKind};
use crate::core::report::exit_code;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Date used to preview resolved datasets and source paths
    #[arg(long)]
    pub date: Option<String>,
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let date = self
            .date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
        let services = match config.resolve_services(&date, None) {
            Ok(services) => services,
            Err(e) => {
                println!("❌ Failed to resolve services");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Warehouse Project: {}", config.warehouse.project_id);
        println!("  Warehouse Region: {}", config.warehouse.region);
        match config.source.kind {
            SourceKind::Gcs => println!(
                "  Source: gs://{}",
                config.source.bucket.as_deref().unwrap_or_default()
            ),
            SourceKind::Local => println!("  Source: {}", config.source.base_path),
        }
        if let Some(ref relational) = config.relational {
            println!(
                "  Relational Source: {}",
                redact_connection_string(relational.connection_string.expose_secret().as_ref())
            );
        }
        println!(
            "  Concurrency: {} services x {} entities",
            config.load.service_concurrency, config.load.entity_concurrency
        );
        println!(
            "  Validation: {} against {} (sample size {})",
            config.validation.mode, config.validation.source, config.validation.sample_size
        );
        println!("  Report: {}", config.report.path_for(&date));
        println!();
        println!("Services ({date}):");
        for service in &services {
            println!(
                "  {} -> {} (source: {})",
                service.name, service.dataset, service.source_prefix
            );
        }
        println!();
        Ok(exit_code::SUCCESS)
    }
}
