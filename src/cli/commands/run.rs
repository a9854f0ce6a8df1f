//! Run command implementation
//!
//! This module implements the `run` command: load, validate, report.

use crate::config::{load_config, ValidationMode, ValidationSource};
use crate::core::report::exit_code;
use crate::core::runner::{RunCoordinator, RunOptions};
use crate::domain::TabliftError;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only process this service
    #[arg(long)]
    pub service: Option<String>,

    /// Only process this table (requires --service)
    #[arg(long, requires = "service")]
    pub table: Option<String>,

    /// Run date substituted into templates (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub date: Option<String>,

    /// Reprocess even when tables are already populated (requires --service)
    #[arg(long, requires = "service")]
    pub rerun: bool,

    /// Skip the load phase
    #[arg(long)]
    pub validate_only: bool,

    /// Checks to run (completeness, correctness, both)
    #[arg(long, value_name = "TYPE")]
    pub validation_type: Option<String>,

    /// Source to validate against (files, relational)
    #[arg(long, value_name = "SOURCE")]
    pub validate_source: Option<String>,

    /// Rows sampled per table for correctness checks
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Report file (defaults to the configured report path)
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

impl RunArgs {
    /// Builds run options from the flags
    pub fn options(&self) -> Result<RunOptions, TabliftError> {
        let date = match &self.date {
            Some(date) => {
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                    TabliftError::Configuration(format!("Invalid --date '{date}': {e}"))
                })?;
                date.clone()
            }
            None => chrono::Local::now().format("%Y-%m-%d").to_string(),
        };
        let validation_mode = self
            .validation_type
            .as_deref()
            .map(str::parse::<ValidationMode>)
            .transpose()
            .map_err(TabliftError::Configuration)?;
        let validation_source = self
            .validate_source
            .as_deref()
            .map(str::parse::<ValidationSource>)
            .transpose()
            .map_err(TabliftError::Configuration)?;

        let options = RunOptions {
            date,
            service: self.service.clone(),
            table: self.table.clone(),
            rerun: self.rerun,
            validate_only: self.validate_only,
            validation_mode,
            validation_source,
            sample_size: self.sample_size,
            output_file: self.output_file.clone(),
        };
        options.validate()?;
        Ok(options)
    }

    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting run command");

        let options = match self.options() {
            Ok(options) => options,
            Err(e) => {
                tracing::error!(error = %e, "Invalid arguments");
                eprintln!("{e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let mut config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        if let Some(source) = options.validation_source {
            tracing::info!(source = %source, "Overriding validation source from CLI");
            config.validation.source = source;
        }
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(exit_code::CONFIGURATION);
        }

        let coordinator =
            match RunCoordinator::from_config(config, &options, shutdown_signal).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to initialize run");
                    eprintln!("Failed to initialize run: {e}");
                    return Ok(code_for(&e));
                }
            };

        println!("🚀 Starting run for {}...", options.date);
        println!();

        let report = match coordinator.execute(&options).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                eprintln!("Run failed: {e}");
                return Ok(code_for(&e));
            }
        };

        print!("{}", report.format_text());
        println!(
            "📄 Report written to {}",
            coordinator.report_path(&options).display()
        );
        if report.interrupted {
            println!("⚠️  Run interrupted. Rerun to process the remaining work.");
        }

        Ok(report.exit_code)
    }
}

fn code_for(error: &TabliftError) -> i32 {
    match error {
        TabliftError::Configuration(_) => exit_code::CONFIGURATION,
        _ => exit_code::FATAL,
    }
}
