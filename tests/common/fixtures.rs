//! Builders for tracks, settings and harvest runs.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pezzottify_harvester::catalog::{PlaylistItem, RawAlbum, RawArtistRef, RawTrack};
use pezzottify_harvester::config::{BatchSettings, EnrichmentScope, HarvestSettings};
use pezzottify_harvester::harvest::{
    BatchClient, HarvestContext, HarvestOrchestrator, HarvestReport, HarvestSource, NoOpPacer,
    RetryPolicy, RunAborted,
};

use super::FakeCatalog;

/// Playlist item for track `track_id` by the given artists.
pub fn item(track_id: &str, artist_ids: &[&str]) -> PlaylistItem {
    PlaylistItem::of(RawTrack {
        id: Some(track_id.to_string()),
        name: format!("Track {}", track_id),
        popularity: 30,
        duration_ms: 210_000,
        explicit: false,
        album: RawAlbum {
            id: Some(format!("album-{}", track_id)),
            name: format!("Album {}", track_id),
            release_date: Some("2001-05-01".to_string()),
            album_type: Some("album".to_string()),
        },
        artists: artist_ids
            .iter()
            .map(|a| RawArtistRef {
                id: Some(a.to_string()),
                name: format!("Artist {}", a),
            })
            .collect(),
    })
}

/// Items `t{from}..=t{to}`, each by one of `artist_count` rotating artists.
pub fn items(from: usize, to: usize, artist_count: usize) -> Vec<PlaylistItem> {
    (from..=to)
        .map(|i| {
            let artist = format!("a{}", i % artist_count);
            item(&format!("t{}", i), &[artist.as_str()])
        })
        .collect()
}

pub fn playlist_sources(ids: &[&str]) -> Vec<HarvestSource> {
    ids.iter()
        .map(|id| HarvestSource::Playlist(id.to_string()))
        .collect()
}

pub fn settings(sources: Vec<HarvestSource>) -> HarvestSettings {
    HarvestSettings {
        sources,
        playlists_per_year: 5,
        continue_on_source_failure: false,
        enrichment: EnrichmentScope::default(),
    }
}

pub fn batch_client(catalog: Arc<FakeCatalog>) -> BatchClient {
    BatchClient::new(
        catalog,
        Box::new(NoOpPacer),
        RetryPolicy {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
        },
        BatchSettings {
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
}

pub fn orchestrator(
    catalog: Arc<FakeCatalog>,
    settings: HarvestSettings,
    token: CancellationToken,
) -> HarvestOrchestrator {
    let ctx = HarvestContext::new(Arc::new(batch_client(catalog)), token);
    HarvestOrchestrator::new(ctx, settings).expect("valid settings")
}

/// Run a harvest over `catalog` with a fresh cancellation token.
pub async fn harvest(
    catalog: Arc<FakeCatalog>,
    settings: HarvestSettings,
) -> Result<HarvestReport, RunAborted> {
    orchestrator(catalog, settings, CancellationToken::new())
        .run()
        .await
}

pub fn track_ids(report: &HarvestReport) -> Vec<String> {
    report.output.tracks.iter().map(|t| t.id.clone()).collect()
}
