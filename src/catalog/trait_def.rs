//! CatalogApi trait definition.

use super::error::ApiError;
use super::models::{Cursor, DetailRecord, LookupKind, Page, PlaylistItem};
use async_trait::async_trait;

/// Typed interface to the external catalog.
///
/// Implementations issue exactly one request per call. Batching, pacing and
/// retries live in the harvest batch client, not here.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Search playlists matching `query`. Single page, at most `limit` ids.
    async fn search_playlists(&self, query: &str, limit: usize) -> Result<Vec<String>, ApiError>;

    /// Fetch one page of a playlist's tracks. `cursor == None` fetches the
    /// first page.
    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<PlaylistItem>, ApiError>;

    /// Look up details for `ids`.
    ///
    /// The result is parallel to `ids`: same length, same order, `None` where
    /// the catalog has no data for that id.
    async fn batch_lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
    ) -> Result<Vec<Option<DetailRecord>>, ApiError>;
}
