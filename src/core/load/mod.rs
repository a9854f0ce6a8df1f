//! Load phase
//!
//! Create-or-upsert of every discovered entity, with bounded concurrency at
//! both the service and the entity level.

pub mod keys;
pub mod orchestrator;
pub mod result;

pub use keys::KeyPolicy;
pub use orchestrator::{LoadOrchestrator, LoadRequest};
pub use result::{LoadOutcome, LoadResult, ServiceLoadReport, ServiceLoadStatus};
