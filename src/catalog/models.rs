//! Wire models for the catalog API.
//!
//! These types match the JSON returned by a Spotify-compatible Web API.
//! They are converted into harvest model types once enrichment is complete.

use serde::{Deserialize, Serialize};

// =============================================================================
// Pagination
// =============================================================================

/// Opaque token identifying the next page of a paginated collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a paginated collection.
///
/// `next == None` is the end-of-collection sentinel. An empty `items` list
/// with a `next` cursor is a legitimate page and does not end the walk.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<Cursor>) -> Self {
        Self { items, next }
    }

    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

// =============================================================================
// Tracks
// =============================================================================

/// Artist reference embedded in a track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArtistRef {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// Album reference embedded in a track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAlbum {
    pub id: Option<String>,
    pub name: String,
    pub release_date: Option<String>,
    pub album_type: Option<String>,
}

/// Track as listed in a playlist.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    /// Missing for local files.
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub popularity: u8,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub album: RawAlbum,
    #[serde(default)]
    pub artists: Vec<RawArtistRef>,
}

/// Playlist entry. `track` is null for removed or unavailable tracks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<RawTrack>,
}

impl PlaylistItem {
    pub fn of(track: RawTrack) -> Self {
        Self { track: Some(track) }
    }
}

// =============================================================================
// Detail lookups
// =============================================================================

/// Audio analysis fields for one track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAudioFeatures {
    pub id: String,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i32>,
}

/// Full artist object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArtist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub popularity: Option<u8>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Kind of batched detail lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    AudioFeatures,
    ArtistDetail,
    RelatedArtists,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::AudioFeatures => "audio_features",
            LookupKind::ArtistDetail => "artist_detail",
            LookupKind::RelatedArtists => "related_artists",
        }
    }

    /// Maximum number of ids the API accepts in one request of this kind.
    pub fn api_max_batch_size(&self) -> usize {
        match self {
            LookupKind::AudioFeatures => 100,
            LookupKind::ArtistDetail => 50,
            LookupKind::RelatedArtists => 1,
        }
    }
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a batched lookup response.
#[derive(Clone, Debug, PartialEq)]
pub enum DetailRecord {
    AudioFeatures(RawAudioFeatures),
    Artist(RawArtist),
    RelatedArtists(Vec<RawArtistRef>),
}
