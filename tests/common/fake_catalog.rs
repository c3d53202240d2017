//! In-memory catalog recording every call it receives.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use pezzottify_harvester::catalog::{
    ApiError, CatalogApi, Cursor, DetailRecord, LookupKind, Page, PlaylistItem, RawArtist,
    RawArtistRef, RawAudioFeatures,
};

/// One call received by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search { query: String, limit: usize },
    Page { playlist_id: String, cursor: Option<String> },
    Lookup { kind: LookupKind, ids: Vec<String> },
}

#[derive(Default)]
struct Failures {
    /// Every page fetch of the playlist fails.
    playlists: HashMap<String, ApiError>,
    /// Any lookup of this kind containing the id fails, for the given
    /// number of calls.
    lookups: HashMap<(LookupKind, String), (ApiError, usize)>,
}

pub struct FakeCatalog {
    page_size: usize,
    searches: HashMap<String, Vec<String>>,
    playlists: HashMap<String, Vec<PlaylistItem>>,
    audio_features: HashMap<String, RawAudioFeatures>,
    artists: HashMap<String, RawArtist>,
    related: HashMap<String, Vec<String>>,
    failures: Mutex<Failures>,
    cancel_on_playlist: Mutex<Option<(String, CancellationToken)>>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            searches: HashMap::new(),
            playlists: HashMap::new(),
            audio_features: HashMap::new(),
            artists: HashMap::new(),
            related: HashMap::new(),
            failures: Mutex::new(Failures::default()),
            cancel_on_playlist: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_search(mut self, query: &str, playlist_ids: &[&str]) -> Self {
        self.searches.insert(
            query.to_string(),
            playlist_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_playlist(mut self, playlist_id: &str, items: Vec<PlaylistItem>) -> Self {
        self.playlists.insert(playlist_id.to_string(), items);
        self
    }

    pub fn with_audio_features(mut self, track_id: &str, tempo: f64) -> Self {
        self.audio_features.insert(
            track_id.to_string(),
            RawAudioFeatures {
                id: track_id.to_string(),
                danceability: Some(0.5),
                energy: Some(0.7),
                tempo: Some(tempo),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_artist(mut self, artist_id: &str, popularity: u8, genres: &[&str]) -> Self {
        self.artists.insert(
            artist_id.to_string(),
            RawArtist {
                id: artist_id.to_string(),
                name: format!("Artist {}", artist_id),
                popularity: Some(popularity),
                genres: genres.iter().map(|g| g.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_related(mut self, artist_id: &str, related: &[&str]) -> Self {
        self.related.insert(
            artist_id.to_string(),
            related.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn fail_playlist(&self, playlist_id: &str, error: ApiError) {
        self.failures
            .lock()
            .unwrap()
            .playlists
            .insert(playlist_id.to_string(), error);
    }

    pub fn fail_lookup(&self, kind: LookupKind, id: &str, error: ApiError) {
        self.fail_lookup_times(kind, id, error, usize::MAX);
    }

    /// Fail the next `times` lookups of `kind` containing `id`.
    pub fn fail_lookup_times(&self, kind: LookupKind, id: &str, error: ApiError, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .lookups
            .insert((kind, id.to_string()), (error, times));
    }

    /// Cancel `token` when the first page of `playlist_id` is requested.
    pub fn cancel_on_playlist(&self, playlist_id: &str, token: CancellationToken) {
        *self.cancel_on_playlist.lock().unwrap() = Some((playlist_id.to_string(), token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Id lists of every lookup of `kind`, in call order.
    pub fn lookup_batches(&self, kind: LookupKind) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Lookup { kind: k, ids } if k == kind => Some(ids),
                _ => None,
            })
            .collect()
    }

    /// Every id looked up for `kind`, with repeats.
    pub fn looked_up_ids(&self, kind: LookupKind) -> Vec<String> {
        self.lookup_batches(kind).into_iter().flatten().collect()
    }

    pub fn page_requests(&self, playlist_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Page { playlist_id: p, .. } if p == playlist_id))
            .count()
    }

    pub fn searches(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Search { query, limit } => Some((query, limit)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn detail(&self, kind: LookupKind, id: &str) -> Option<DetailRecord> {
        match kind {
            LookupKind::AudioFeatures => self
                .audio_features
                .get(id)
                .cloned()
                .map(DetailRecord::AudioFeatures),
            LookupKind::ArtistDetail => self.artists.get(id).cloned().map(DetailRecord::Artist),
            LookupKind::RelatedArtists => self.related.get(id).map(|related| {
                DetailRecord::RelatedArtists(
                    related
                        .iter()
                        .map(|r| RawArtistRef {
                            id: Some(r.clone()),
                            name: format!("Artist {}", r),
                        })
                        .collect(),
                )
            }),
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn search_playlists(&self, query: &str, limit: usize) -> Result<Vec<String>, ApiError> {
        self.record(Call::Search {
            query: query.to_string(),
            limit,
        });
        Ok(self
            .searches
            .get(query)
            .map(|ids| ids.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        self.record(Call::Page {
            playlist_id: playlist_id.to_string(),
            cursor: cursor.as_ref().map(|c| c.0.clone()),
        });

        if cursor.is_none() {
            if let Some((id, token)) = self.cancel_on_playlist.lock().unwrap().as_ref() {
                if id == playlist_id {
                    token.cancel();
                }
            }
        }
        if let Some(error) = self.failures.lock().unwrap().playlists.get(playlist_id) {
            return Err(error.clone());
        }

        let items = self
            .playlists
            .get(playlist_id)
            .ok_or_else(|| ApiError::NotFound(format!("playlist {}", playlist_id)))?;
        let offset = match &cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(items.len());
        let next = (end < items.len()).then(|| Cursor(end.to_string()));
        Ok(Page::new(items[offset..end].to_vec(), next))
    }

    async fn batch_lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
    ) -> Result<Vec<Option<DetailRecord>>, ApiError> {
        self.record(Call::Lookup {
            kind,
            ids: ids.to_vec(),
        });

        if ids.len() > kind.api_max_batch_size() {
            return Err(ApiError::InvalidRequest(format!(
                "{} ids exceed the {} limit of {}",
                ids.len(),
                kind,
                kind.api_max_batch_size()
            )));
        }
        {
            let mut failures = self.failures.lock().unwrap();
            let failing = ids
                .iter()
                .map(|id| (kind, id.clone()))
                .find(|key| failures.lookups.contains_key(key));
            if let Some(key) = failing {
                if let Some((error, remaining)) = failures.lookups.get_mut(&key) {
                    let error = error.clone();
                    *remaining -= 1;
                    if *remaining == 0 {
                        failures.lookups.remove(&key);
                    }
                    return Err(error);
                }
            }
        }

        Ok(ids.iter().map(|id| self.detail(kind, id)).collect())
    }
}
