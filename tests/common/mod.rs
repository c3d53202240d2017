//! Common test infrastructure
//!
//! Harvest tests run against [`FakeCatalog`], an in-memory catalog that
//! records every call so tests can assert on request counts and batch sizes.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{harvest, items, playlist_sources, settings, FakeCatalog};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_single_playlist() {
//!     let catalog = Arc::new(FakeCatalog::new().with_playlist("p1", items(1, 3, 1)));
//!     let report = harvest(catalog, settings(playlist_sources(&["p1"]))).await.unwrap();
//!     assert_eq!(report.output.tracks.len(), 3);
//! }
//! ```

#![allow(dead_code)]

mod fake_catalog;
mod fixtures;

pub use fake_catalog::{Call, FakeCatalog};
pub use fixtures::*;
