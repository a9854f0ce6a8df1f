//! Core run logic for Tablift.
//!
//! # Modules
//!
//! - [`catalog`] - Discovers source entities and derives canonical table names
//! - [`load`] - Create-or-upsert load orchestration
//! - [`validation`] - Completeness and correctness checks
//! - [`report`] - Result aggregation, exit codes, and the JSON report
//! - [`pool`] - Bounded worker pools with panic isolation and shutdown
//! - [`retry`] - Exponential backoff for transient gateway failures
//! - [`runner`] - Wires the phases together for one run
//!
//! # Run Workflow
//!
//! 1. **Resolve**: Render dataset and source templates into service descriptors
//! 2. **Discover**: List each service's CSV files and map them to tables
//! 3. **Load**: Create missing tables, merge into existing ones
//! 4. **Validate**: Compare row counts, schemas and ordered samples
//! 5. **Report**: Aggregate per service and write the JSON report
//!
//! # Example
//!
//! ```rust,no_run
//! use tablift::config::load_config;
//! use tablift::core::runner::{RunCoordinator, RunOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tablift.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let options = RunOptions {
//!     date: "2025-01-15".to_string(),
//!     ..Default::default()
//! };
//! let coordinator = RunCoordinator::from_config(config, &options, shutdown_rx).await?;
//! let report = coordinator.execute(&options).await?;
//! println!("Exit code: {}", report.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod load;
pub mod pool;
pub mod report;
pub mod retry;
pub mod runner;
pub mod validation;
