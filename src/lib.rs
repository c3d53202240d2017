//! Pezzottify Harvester Library
//!
//! Harvests tracks from a music catalog, enriches them with audio features
//! and artist data, and exports the result as JSON and CSV.

pub mod catalog;
pub mod config;
pub mod export;
pub mod harvest;
pub mod sink;

// Re-export commonly used types for convenience
pub use catalog::{CatalogApi, WebCatalogClient};
pub use harvest::{HarvestContext, HarvestOrchestrator, HarvestReport, RunAborted};
pub use sink::{JsonFileSink, ResultSink};
