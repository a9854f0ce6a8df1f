//! PostgreSQL integration
//!
//! Relational source used to validate warehouse tables against the
//! system of record.

pub mod client;

pub use client::{redact_connection_string, PostgreSQLClient};
