//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Tablift using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tablift - CSV to BigQuery loader and validator
#[derive(Parser, Debug)]
#[command(name = "tablift")]
#[command(version, about, long_about = None)]
#[command(author = "Tablift Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tablift.toml", env = "TABLIFT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TABLIFT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load source files into the warehouse and validate the result
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["tablift", "run"]);
        assert_eq!(cli.config, "tablift.toml");
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["tablift", "--config", "custom.toml", "run"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["tablift", "--log-level", "debug", "run"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["tablift", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::parse_from([
            "tablift",
            "run",
            "--service",
            "billing",
            "--table",
            "users",
            "--rerun",
            "--date",
            "2025-01-15",
            "--validation-type",
            "completeness",
            "--validate-source",
            "relational",
            "--sample-size",
            "25",
            "--output-file",
            "out.json",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.service.as_deref(), Some("billing"));
        assert_eq!(args.table.as_deref(), Some("users"));
        assert!(args.rerun);
        assert_eq!(args.sample_size, Some(25));
        assert_eq!(args.validation_type.as_deref(), Some("completeness"));
    }

    #[test]
    fn test_cli_table_requires_service() {
        assert!(Cli::try_parse_from(["tablift", "run", "--table", "users"]).is_err());
        assert!(Cli::try_parse_from(["tablift", "run", "--rerun"]).is_err());
    }
}
