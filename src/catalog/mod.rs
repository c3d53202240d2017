//! Boundary to the external music catalog.
//!
//! The harvest pipeline only talks to the catalog through the [`CatalogApi`]
//! trait. [`WebCatalogClient`] is the HTTP implementation used by the
//! binaries; tests use in-memory doubles.

mod error;
mod models;
mod trait_def;
mod web_client;

pub use error::ApiError;
pub use models::{
    Cursor, DetailRecord, LookupKind, Page, PlaylistItem, RawAlbum, RawArtist, RawArtistRef,
    RawAudioFeatures, RawTrack,
};
#[cfg(feature = "mock")]
pub use trait_def::MockCatalogApi;
pub use trait_def::CatalogApi;
pub use web_client::WebCatalogClient;
