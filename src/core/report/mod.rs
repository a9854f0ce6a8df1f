//! Run report aggregation and persistence
//!
//! Load and validation results are joined per entity, rolled up per service
//! with the precedence `failed > warning > success`, and written as JSON.

pub mod aggregator;
pub mod model;

pub use aggregator::{merge_rerun, merge_service_rerun, recompute, ReportAggregator};
pub use model::{exit_code, EntityReport, RunReport, ServiceReport, ServiceSummary, Status};
