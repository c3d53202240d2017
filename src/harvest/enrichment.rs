//! Secondary lookups for a batch of newly seen tracks.
//!
//! Audio features are requested for every track of the batch. Artists are
//! claimed in the deduplicator before any lookup is issued, so detail and
//! related-artist lookups happen at most once per artist id within a run,
//! whichever source first references the artist. When those lookups fail,
//! the claimed artists come back marked as failed so the accumulator can
//! record them even though the batch itself is discarded.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use super::batch_client::BatchClient;
use super::dedup::{EntityDeduplicator, EntityKind};
use super::error::HarvestError;
use super::model::{Artist, AudioFeatures, Track};
use crate::catalog::{RawAudioFeatures, RawTrack};
use crate::config::EnrichmentScope;

/// Tracks finalized by one fanout, plus the artists first seen in it.
#[derive(Debug, Default)]
pub struct EnrichedBatch {
    pub tracks: Vec<Track>,
    pub artists: Vec<Artist>,
    /// Track ids whose audio features were looked up. Claimed on acceptance.
    pub feature_ids: Vec<String>,
}

/// A fanout that did not complete.
#[derive(Debug)]
pub struct EnrichmentFailure {
    pub error: HarvestError,
    /// Artists claimed by the fanout: enriched when their own lookups
    /// completed, marked failed otherwise.
    pub artists: Vec<Artist>,
}

pub struct EnrichmentFanout<'a> {
    client: &'a BatchClient,
    dedup: &'a EntityDeduplicator,
    scope: EnrichmentScope,
}

impl<'a> EnrichmentFanout<'a> {
    pub fn new(
        client: &'a BatchClient,
        dedup: &'a EntityDeduplicator,
        scope: EnrichmentScope,
    ) -> Self {
        Self {
            client,
            dedup,
            scope,
        }
    }

    /// Enrich `raw_tracks` and build their finalized [`Track`]s.
    ///
    /// `known_artists` holds artists recorded by earlier fanouts of the run;
    /// their data is merged onto the new tracks without new lookups.
    /// Tracks without an id are dropped. No track is returned unless every
    /// lookup of the batch completed.
    pub async fn enrich(
        &self,
        raw_tracks: Vec<RawTrack>,
        known_artists: &BTreeMap<String, Artist>,
    ) -> Result<EnrichedBatch, EnrichmentFailure> {
        let track_ids: Vec<String> = raw_tracks.iter().filter_map(|t| t.id.clone()).collect();

        // Both sides run to completion: every claimed artist comes back
        // enriched or marked failed
        let (features, new_artists) = tokio::join!(
            self.fetch_audio_features(&track_ids),
            self.enrich_new_artists(&raw_tracks)
        );
        let new_artists = new_artists?;
        let (feature_ids, features) = match features {
            Ok(found) => found,
            Err(error) => {
                return Err(EnrichmentFailure {
                    error,
                    artists: new_artists,
                })
            }
        };

        let new_by_id: HashMap<&str, &Artist> =
            new_artists.iter().map(|a| (a.id.as_str(), a)).collect();
        let lookup_artist = |id: &str| {
            new_by_id
                .get(id)
                .copied()
                .or_else(|| known_artists.get(id))
                .cloned()
        };

        let tracks: Vec<Track> = raw_tracks
            .into_iter()
            .filter_map(|raw| {
                let audio_features = raw
                    .id
                    .as_deref()
                    .and_then(|id| features.get(id))
                    .cloned()
                    .map(AudioFeatures::from)
                    .unwrap_or_else(AudioFeatures::absent);
                Track::from_raw(raw, audio_features, &lookup_artist)
            })
            .collect();

        debug!(
            "Enriched {} tracks, {} new artists",
            tracks.len(),
            new_artists.len()
        );

        Ok(EnrichedBatch {
            tracks,
            artists: new_artists,
            feature_ids,
        })
    }

    /// Look up features for the ids not already covered this run.
    ///
    /// Returns the ids looked up alongside the features found.
    async fn fetch_audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<(Vec<String>, HashMap<String, RawAudioFeatures>), HarvestError> {
        if !self.scope.audio_features {
            return Ok((Vec::new(), HashMap::new()));
        }

        let pending: Vec<String> = track_ids
            .iter()
            .filter(|id| !self.dedup.contains(EntityKind::AudioFeatures, id))
            .cloned()
            .collect();
        let features = self.client.audio_features(&pending).await?;
        Ok((pending, features))
    }

    /// Claim the artists of `raw_tracks` not seen before and look them up.
    async fn enrich_new_artists(
        &self,
        raw_tracks: &[RawTrack],
    ) -> Result<Vec<Artist>, EnrichmentFailure> {
        // First name seen for each artist id, in track order
        let mut names: Vec<(&str, &str)> = Vec::new();
        let mut listed = HashSet::new();
        for artist in raw_tracks.iter().flat_map(|t| &t.artists) {
            if let Some(id) = artist.id.as_deref() {
                if listed.insert(id) {
                    names.push((id, artist.name.as_str()));
                }
            }
        }

        let claimed = self
            .dedup
            .claim_new(EntityKind::Artist, names.iter().map(|(id, _)| *id));
        if claimed.is_empty() {
            return Ok(Vec::new());
        }
        let names: HashMap<&str, &str> = names.into_iter().collect();
        let name_of = |id: &str| names.get(id).copied().unwrap_or_default().to_string();

        let details = async {
            if self.scope.artist_details {
                self.client.artists(&claimed).await
            } else {
                Ok(HashMap::new())
            }
        };
        let related = async {
            if self.scope.related_artists {
                self.client.related_artists(&claimed).await
            } else {
                Ok(HashMap::new())
            }
        };
        let (mut details, mut related) = match tokio::try_join!(details, related) {
            Ok(found) => found,
            Err(error) => {
                warn!(
                    "Artist lookups failed for {} artists, they will not be retried: {}",
                    claimed.len(),
                    error
                );
                let artists = claimed
                    .iter()
                    .map(|id| Artist::lookup_failed(id.clone(), name_of(id.as_str())))
                    .collect();
                return Err(EnrichmentFailure { error, artists });
            }
        };

        let artists = claimed
            .iter()
            .map(|id| {
                let mut artist = Artist::unenriched(id.clone(), name_of(id.as_str()));
                if let Some(detail) = details.remove(id) {
                    artist.apply_detail(detail);
                }
                if self.scope.related_artists {
                    // No data is an empty edge list, not a missing one
                    let related_ids = related
                        .remove(id)
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|r| r.id)
                        .collect();
                    artist.related_artist_ids = Some(related_ids);
                }
                artist
            })
            .collect();

        Ok(artists)
    }
}
