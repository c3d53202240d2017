//! Run-scoped result accumulation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::dedup::{EntityDeduplicator, EntityKind};
use super::enrichment::EnrichedBatch;
use super::model::{Artist, HarvestOutput, Track};

/// Counts for one accepted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptStats {
    pub accepted: usize,
    pub duplicates: usize,
}

/// Growing result of a harvest run.
///
/// Only finalized tracks enter the accumulator, one whole batch at a time,
/// so its contents are consistent at every point a run can stop.
pub struct HarvestAccumulator {
    dedup: Arc<EntityDeduplicator>,
    tracks: Vec<Track>,
    artists: BTreeMap<String, Artist>,
}

impl HarvestAccumulator {
    pub fn new(dedup: Arc<EntityDeduplicator>) -> Self {
        Self {
            dedup,
            tracks: Vec::new(),
            artists: BTreeMap::new(),
        }
    }

    /// True when no track with this id has been accepted yet.
    pub fn is_new_track(&self, track_id: &str) -> bool {
        !self.dedup.contains(EntityKind::Track, track_id)
    }

    /// Artists recorded so far, keyed by id.
    pub fn known_artists(&self) -> &BTreeMap<String, Artist> {
        &self.artists
    }

    /// Append an enriched batch. Tracks already accepted are dropped.
    pub fn accept(&mut self, batch: EnrichedBatch) -> AcceptStats {
        self.dedup.claim_new(
            EntityKind::AudioFeatures,
            batch.feature_ids.iter().map(String::as_str),
        );
        self.record_artists(batch.artists);

        let mut stats = AcceptStats::default();
        for track in batch.tracks {
            if self.dedup.insert_if_absent(EntityKind::Track, &track.id) {
                stats.duplicates += 1;
            } else {
                self.tracks.push(track);
                stats.accepted += 1;
            }
        }
        stats
    }

    /// Keep artists claimed by a fanout, including ones whose batch was
    /// discarded, so later tracks referencing them see their data or their
    /// failure marker.
    pub fn record_artists(&mut self, artists: Vec<Artist>) {
        for artist in artists {
            self.artists.entry(artist.id.clone()).or_insert(artist);
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn artist_count(&self) -> usize {
        self.artists.len()
    }

    /// Freeze the accumulated state into the output handed to the sink.
    pub fn finalize(self) -> HarvestOutput {
        let related_artist_edges = self.artists.values().flat_map(Artist::edges).collect();
        HarvestOutput {
            tracks: self.tracks,
            artists: self.artists,
            related_artist_edges,
        }
    }
}
