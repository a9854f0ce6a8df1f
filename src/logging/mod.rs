//! Logging and observability
//!
//! Structured logging through `tracing`, with helper macros that keep field
//! names consistent across the load and validation phases.
//!
//! # Example
//!
//! ```no_run
//! use tablift::logging::init_logging;
//! use tablift::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(service = "billing", "Loading service");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a retry attempt of a gateway operation
///
/// # Example
///
/// ```no_run
/// use tablift::log_retry_attempt;
///
/// log_retry_attempt!("get_row_count", 2, 3, 2000u64, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($operation:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            operation = $operation,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

/// Log the outcome of one entity in a phase
///
/// # Example
///
/// ```no_run
/// use tablift::log_entity_outcome;
///
/// log_entity_outcome!("load", "billing", "invoices", "created");
/// ```
#[macro_export]
macro_rules! log_entity_outcome {
    ($phase:expr, $service:expr, $table:expr, $outcome:expr) => {
        tracing::info!(
            phase = $phase,
            service = %$service,
            table = %$table,
            outcome = %$outcome,
            "Entity processed"
        );
    };
}
