//! Destination warehouse abstraction

pub mod traits;

pub use traits::{LoadSource, WarehouseGateway};
