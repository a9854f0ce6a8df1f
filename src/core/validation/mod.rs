//! Validation phase
//!
//! Completeness compares row counts; correctness compares ordered schemas and
//! a deterministic leading sample of rows.

pub mod compare;
pub mod engine;
pub mod result;

pub use engine::{ValidationEngine, ValidationSettings};
pub use result::{
    ColumnMismatch, CompletenessResult, CorrectnessResult, SampleMismatch,
    ServiceValidationReport, ValidationResult, ValidationStatus,
};
