//! HTTP client for a Spotify-compatible catalog Web API.
//!
//! Provides playlist search, paginated playlist track listing and batched
//! detail lookups. Authentication is a bearer token handed in by the caller.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::error::ApiError;
use super::models::{
    Cursor, DetailRecord, LookupKind, Page, PlaylistItem, RawArtist, RawArtistRef,
    RawAudioFeatures,
};
use super::trait_def::CatalogApi;

/// Page size requested for playlist track listings (API maximum).
const PLAYLIST_PAGE_LIMIT: usize = 100;

/// Client for the catalog Web API.
#[derive(Clone)]
pub struct WebCatalogClient {
    client: Client,
    base_url: String,
    access_token: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    playlists: Option<PlaylistSearchContainer>,
}

#[derive(Deserialize)]
struct PlaylistSearchContainer {
    #[serde(default)]
    items: Vec<Option<PlaylistSummary>>,
}

#[derive(Deserialize)]
struct PlaylistSummary {
    id: String,
}

#[derive(Deserialize)]
struct PlaylistTracksResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct AudioFeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<RawAudioFeatures>>,
}

#[derive(Deserialize)]
struct ArtistsResponse {
    #[serde(default)]
    artists: Vec<Option<RawArtist>>,
}

#[derive(Deserialize)]
struct RelatedArtistsResponse {
    #[serde(default)]
    artists: Vec<RawArtistRef>,
}

impl WebCatalogClient {
    /// Create a new WebCatalogClient.
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://api.spotify.com/v1")
    /// * `access_token` - Bearer token sent with every request
    /// * `timeout` - Per-request timeout enforced by reqwest
    pub fn new(base_url: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    /// Get the base URL of the catalog API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token))
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let response = Self::check_status(response).await?;
        response.json::<T>().await.map_err(ApiError::from_reqwest)
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        Err(ApiError::from_status(status.as_u16(), body, retry_after))
    }

    /// Check that a response list is parallel to the requested ids.
    fn align<T>(records: Vec<Option<T>>, expected: usize) -> Result<Vec<Option<T>>, ApiError> {
        if records.len() != expected {
            return Err(ApiError::Parse(format!(
                "expected {} entries in lookup response, got {}",
                expected,
                records.len()
            )));
        }
        Ok(records)
    }

    async fn lookup_audio_features(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<DetailRecord>>, ApiError> {
        let url = format!("{}/audio-features", self.base_url);
        let body: AudioFeaturesResponse = self.get_json(&url, &[("ids", ids.join(","))]).await?;
        let records = body
            .audio_features
            .into_iter()
            .map(|f| f.map(DetailRecord::AudioFeatures))
            .collect();
        Self::align(records, ids.len())
    }

    async fn lookup_artists(&self, ids: &[String]) -> Result<Vec<Option<DetailRecord>>, ApiError> {
        let url = format!("{}/artists", self.base_url);
        let body: ArtistsResponse = self.get_json(&url, &[("ids", ids.join(","))]).await?;
        let records = body
            .artists
            .into_iter()
            .map(|a| a.map(DetailRecord::Artist))
            .collect();
        Self::align(records, ids.len())
    }

    async fn lookup_related_artists(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<DetailRecord>>, ApiError> {
        let [artist_id] = ids else {
            return Err(ApiError::InvalidRequest(format!(
                "related artists lookup takes exactly one id, got {}",
                ids.len()
            )));
        };

        let url = format!(
            "{}/artists/{}/related-artists",
            self.base_url,
            urlencoding::encode(artist_id)
        );
        match self.get_json::<RelatedArtistsResponse>(&url, &[]).await {
            Ok(body) => Ok(vec![Some(DetailRecord::RelatedArtists(body.artists))]),
            Err(ApiError::NotFound(_)) => Ok(vec![None]),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CatalogApi for WebCatalogClient {
    async fn search_playlists(&self, query: &str, limit: usize) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/search", self.base_url);
        let body: SearchResponse = self
            .get_json(
                &url,
                &[
                    ("q", query.to_string()),
                    ("type", "playlist".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(body
            .playlists
            .map(|p| p.items.into_iter().flatten().map(|s| s.id).collect())
            .unwrap_or_default())
    }

    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        // The cursor is the absolute `next` URL handed out by the previous page
        let body: PlaylistTracksResponse = match cursor {
            Some(cursor) => self.get_json(cursor.as_str(), &[]).await?,
            None => {
                let url = format!(
                    "{}/playlists/{}/tracks",
                    self.base_url,
                    urlencoding::encode(playlist_id)
                );
                self.get_json(&url, &[("limit", PLAYLIST_PAGE_LIMIT.to_string())])
                    .await?
            }
        };

        Ok(Page::new(body.items, body.next.map(Cursor)))
    }

    async fn batch_lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
    ) -> Result<Vec<Option<DetailRecord>>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > kind.api_max_batch_size() {
            return Err(ApiError::InvalidRequest(format!(
                "{} lookup of {} ids exceeds the maximum of {}",
                kind,
                ids.len(),
                kind.api_max_batch_size()
            )));
        }

        match kind {
            LookupKind::AudioFeatures => self.lookup_audio_features(ids).await,
            LookupKind::ArtistDetail => self.lookup_artists(ids).await,
            LookupKind::RelatedArtists => self.lookup_related_artists(ids).await,
        }
    }
}
