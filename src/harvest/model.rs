//! Harvested entities.
//!
//! A [`Track`] is built once all of its enrichment lookups have returned and
//! is never mutated afterwards. Artists are shared by id in
//! [`HarvestOutput::artists`]; every track keeps a lightweight [`ArtistRef`]
//! carrying the merged genres and popularity.

use crate::catalog::{RawAlbum, RawArtist, RawArtistRef, RawAudioFeatures, RawTrack};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Album data denormalized onto a track at harvest time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: Option<String>,
    pub name: String,
    pub release_date: Option<String>,
    pub album_type: Option<String>,
}

impl From<RawAlbum> for AlbumRef {
    fn from(album: RawAlbum) -> Self {
        Self {
            id: album.id,
            name: album.name,
            release_date: album.release_date,
            album_type: album.album_type,
        }
    }
}

/// Artist reference embedded in a track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
    pub popularity: Option<u8>,
    pub genres: Vec<String>,
    /// The artist's lookups failed earlier in the run; popularity and genres
    /// are unknown rather than empty.
    #[serde(default)]
    pub enrichment_failed: bool,
}

impl ArtistRef {
    /// Reference with no enrichment data.
    pub fn bare(raw: RawArtistRef) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            popularity: None,
            genres: Vec::new(),
            enrichment_failed: false,
        }
    }

    /// Reference carrying the enrichment of `artist`.
    pub fn enriched(raw: RawArtistRef, artist: &Artist) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            popularity: artist.popularity,
            genres: artist.genres.iter().cloned().collect(),
            enrichment_failed: artist.enrichment_failed,
        }
    }
}

/// Audio analysis of a track. Every field is absent when the catalog had no
/// data for the track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
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

impl AudioFeatures {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::default()
    }
}

impl From<RawAudioFeatures> for AudioFeatures {
    fn from(raw: RawAudioFeatures) -> Self {
        Self {
            danceability: raw.danceability,
            energy: raw.energy,
            key: raw.key,
            loudness: raw.loudness,
            mode: raw.mode,
            speechiness: raw.speechiness,
            acousticness: raw.acousticness,
            instrumentalness: raw.instrumentalness,
            liveness: raw.liveness,
            valence: raw.valence,
            tempo: raw.tempo,
            time_signature: raw.time_signature,
        }
    }
}

/// A finalized, fully enriched track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub popularity: u8,
    pub duration_ms: u64,
    pub explicit: bool,
    pub album: AlbumRef,
    pub artists: Vec<ArtistRef>,
    pub audio_features: AudioFeatures,
}

impl Track {
    /// Build a track from its raw listing and enrichment results.
    ///
    /// Returns None for tracks without an id (local files).
    pub fn from_raw(
        raw: RawTrack,
        audio_features: AudioFeatures,
        artist_lookup: impl Fn(&str) -> Option<Artist>,
    ) -> Option<Self> {
        let id = raw.id?;
        let artists = raw
            .artists
            .into_iter()
            .map(|a| match a.id.as_deref().and_then(&artist_lookup) {
                Some(artist) => ArtistRef::enriched(a, &artist),
                None => ArtistRef::bare(a),
            })
            .collect();

        Some(Self {
            id,
            name: raw.name,
            popularity: raw.popularity,
            duration_ms: raw.duration_ms,
            explicit: raw.explicit,
            album: raw.album.into(),
            artists,
            audio_features,
        })
    }

    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.iter().map(|a| a.name.as_str()).collect()
    }
}

/// A deduplicated artist.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub popularity: Option<u8>,
    pub genres: BTreeSet<String>,
    /// None when related artists were not looked up for this run.
    pub related_artist_ids: Option<Vec<String>>,
    /// Detail or related-artist lookups for this artist failed. The artist
    /// is not looked up again within the run.
    #[serde(default)]
    pub enrichment_failed: bool,
}

impl Artist {
    /// Artist known only from a track reference.
    pub fn unenriched(id: String, name: String) -> Self {
        Self {
            id,
            name,
            ..Default::default()
        }
    }

    /// Artist whose lookups did not complete.
    pub fn lookup_failed(id: String, name: String) -> Self {
        Self {
            enrichment_failed: true,
            ..Self::unenriched(id, name)
        }
    }

    /// Merge a detail lookup result into this artist.
    pub fn apply_detail(&mut self, detail: RawArtist) {
        if !detail.name.is_empty() {
            self.name = detail.name;
        }
        self.popularity = detail.popularity;
        self.genres.extend(detail.genres);
    }

    pub fn edges(&self) -> Vec<RelatedArtistEdge> {
        self.related_artist_ids
            .iter()
            .flatten()
            .map(|related| RelatedArtistEdge {
                artist_id: self.id.clone(),
                related_artist_id: related.clone(),
            })
            .collect()
    }
}

/// Directed related-artist relation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelatedArtistEdge {
    pub artist_id: String,
    pub related_artist_id: String,
}

/// Finalized result of a harvest run, handed to the result sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestOutput {
    pub tracks: Vec<Track>,
    pub artists: BTreeMap<String, Artist>,
    pub related_artist_edges: Vec<RelatedArtistEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_track(id: Option<&str>) -> RawTrack {
        RawTrack {
            id: id.map(str::to_string),
            name: "Song".to_string(),
            popularity: 42,
            duration_ms: 180_000,
            explicit: true,
            album: RawAlbum {
                id: Some("al1".to_string()),
                name: "Record".to_string(),
                release_date: Some("2001".to_string()),
                album_type: Some("album".to_string()),
            },
            artists: vec![
                RawArtistRef {
                    id: Some("a1".to_string()),
                    name: "Band".to_string(),
                },
                RawArtistRef {
                    id: Some("a2".to_string()),
                    name: "Guest".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_from_raw_merges_known_artists_only() {
        let mut band = Artist::unenriched("a1".to_string(), "Band".to_string());
        band.apply_detail(RawArtist {
            id: "a1".to_string(),
            name: "Band".to_string(),
            popularity: Some(70),
            genres: vec!["rock".to_string(), "indie".to_string()],
        });

        let track = Track::from_raw(raw_track(Some("t1")), AudioFeatures::absent(), |id| {
            (id == "a1").then(|| band.clone())
        })
        .unwrap();

        assert_eq!(track.id, "t1");
        assert_eq!(track.album.name, "Record");
        assert_eq!(track.artists[0].popularity, Some(70));
        assert_eq!(track.artists[0].genres, vec!["indie", "rock"]);
        assert_eq!(track.artists[1].popularity, None);
        assert!(track.artists[1].genres.is_empty());
        assert_eq!(track.artist_names(), vec!["Band", "Guest"]);
    }

    #[test]
    fn test_from_raw_without_id_is_none() {
        assert!(Track::from_raw(raw_track(None), AudioFeatures::absent(), |_| None).is_none());
    }

    #[test]
    fn test_absent_audio_features() {
        assert!(AudioFeatures::absent().is_absent());
        let features = AudioFeatures::from(RawAudioFeatures {
            id: "t1".to_string(),
            tempo: Some(120.0),
            ..Default::default()
        });
        assert!(!features.is_absent());
        assert_eq!(features.tempo, Some(120.0));
    }

    #[test]
    fn test_artist_edges() {
        let mut artist = Artist::unenriched("a1".to_string(), "Band".to_string());
        assert!(artist.edges().is_empty());

        artist.related_artist_ids = Some(vec!["a2".to_string(), "a3".to_string()]);
        assert_eq!(
            artist.edges(),
            vec![
                RelatedArtistEdge {
                    artist_id: "a1".to_string(),
                    related_artist_id: "a2".to_string()
                },
                RelatedArtistEdge {
                    artist_id: "a1".to_string(),
                    related_artist_id: "a3".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_apply_detail_keeps_name_when_missing() {
        let mut artist = Artist::unenriched("a1".to_string(), "Band".to_string());
        artist.apply_detail(RawArtist {
            id: "a1".to_string(),
            name: String::new(),
            popularity: None,
            genres: vec!["rock".to_string(), "rock".to_string()],
        });
        assert_eq!(artist.name, "Band");
        assert_eq!(artist.genres.len(), 1);
    }
}
