//! The cumulative catalog: persistence and source-level operations.

pub mod manager;
pub mod store;

pub use manager::{CatalogManager, IngestReport};
pub use store::{CatalogStore, JsonStore};
