// Tablift - CSV to BigQuery Loader and Validator
// Copyright (c) 2025 Tablift Contributors
// Licensed under the MIT License

//! # Tablift - CSV to BigQuery loading and validation
//!
//! Tablift loads per-service CSV exports (from Google Cloud Storage or a local
//! directory) into BigQuery, then checks that the warehouse agrees with the
//! source.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Discovering** CSV files per service and mapping them to canonical table names
//! - **Loading** them into BigQuery, creating new tables or merging into existing ones
//! - **Validating** completeness (row counts) and correctness (schema order, sampled values)
//!   against the files or a PostgreSQL system of record
//! - **Reporting** per-entity and per-service results with a documented exit code
//!
//! ## Architecture
//!
//! Tablift follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Run logic (catalog, load, validation, report, worker pools)
//! - [`adapters`] - External integrations (BigQuery, GCS, local files, PostgreSQL)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablift::config::load_config;
//! use tablift::core::runner::{RunCoordinator, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("tablift.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let options = RunOptions {
//!         date: "2025-01-15".to_string(),
//!         service: Some("billing".to_string()),
//!         ..Default::default()
//!     };
//!     let coordinator = RunCoordinator::from_config(config, &options, shutdown_rx).await?;
//!     let report = coordinator.execute(&options).await?;
//!
//!     println!("{} (exit code {})", report.status, report.exit_code);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Tablift uses the [`domain::TabliftError`] type for all errors. Transient
//! gateway failures are retried inside the task that hit them; anything else
//! fails the narrowest unit (entity, then service) and lands in the report.
//!
//! ```rust,no_run
//! use tablift::domain::TabliftError;
//!
//! fn example() -> Result<(), TabliftError> {
//!     let config = tablift::config::load_config("tablift.toml")?;
//!     let services = config.resolve_services("2025-01-15", None)?;
//!     println!("{} services", services.len());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
