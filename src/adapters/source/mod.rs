//! Source data access
//!
//! CSV exports are read through a [`FileStore`] (local directory or Cloud
//! Storage bucket); a PostgreSQL database can stand in as the validation
//! source.

pub mod files;
pub mod relational;
pub mod store;
pub mod traits;

pub use files::FileSourceGateway;
pub use relational::RelationalSourceGateway;
pub use store::{FileStore, GcsFileStore, LocalFileStore};
pub use traits::{SourceArtifact, SourceGateway};
