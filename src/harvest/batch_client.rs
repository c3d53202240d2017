//! Rate-limited, retrying wrapper around the catalog API.
//!
//! All pacing and backoff for a harvest run lives here. Callers see either
//! the result of a call or a [`HarvestError`] carrying the identifiers that
//! could not be resolved once retries were exhausted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use super::error::HarvestError;
use super::pacer::{PacerStats, RequestPacer};
use super::retry_policy::RetryPolicy;
use crate::catalog::{
    ApiError, CatalogApi, Cursor, DetailRecord, LookupKind, Page, PlaylistItem, RawArtist,
    RawArtistRef, RawAudioFeatures,
};
use crate::config::BatchSettings;

/// A call that failed for good.
#[derive(Debug)]
struct CallFailure {
    error: ApiError,
    attempts: u32,
}

/// Batch client shared by every stage of a harvest run.
pub struct BatchClient {
    api: Arc<dyn CatalogApi>,
    pacer: Box<dyn RequestPacer>,
    retry: RetryPolicy,
    settings: BatchSettings,
}

impl BatchClient {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        pacer: Box<dyn RequestPacer>,
        retry: RetryPolicy,
        settings: BatchSettings,
    ) -> Self {
        Self {
            api,
            pacer,
            retry,
            settings,
        }
    }

    pub async fn pacer_stats(&self) -> PacerStats {
        self.pacer.get_stats().await
    }

    /// Issue one boundary call with pacing, timeout and retries.
    async fn call_with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let timeout = self.settings.request_timeout;
        let mut retries = 0u32;

        loop {
            self.pacer.acquire().await;

            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Transient(format!(
                    "request timed out after {:?}",
                    timeout
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if self.retry.should_retry(&error, retries) => {
                    let delay = self.retry.delay_for(&error, retries);
                    warn!(
                        attempt = retries + 1,
                        "{} failed: {}. Retrying in {:?}", what, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(error) => {
                    return Err(CallFailure {
                        error,
                        attempts: retries + 1,
                    })
                }
            }
        }
    }

    /// Search playlists matching `query`. Single page only.
    pub async fn search_playlists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, HarvestError> {
        let api = self.api.as_ref();
        self.call_with_retry("playlist search", move || api.search_playlists(query, limit))
            .await
            .map_err(|failure| HarvestError::SearchFailed {
                query: query.to_string(),
                attempts: failure.attempts,
                reason: failure.error,
            })
    }

    /// Fetch one page of a playlist's track listing.
    pub async fn fetch_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<PlaylistItem>, HarvestError> {
        let api = self.api.as_ref();
        let requested = cursor.clone();
        self.call_with_retry("playlist page fetch", move || {
            api.playlist_tracks_page(playlist_id, cursor.clone())
        })
        .await
        .map_err(|failure| HarvestError::PageFetchFailed {
            playlist_id: playlist_id.to_string(),
            cursor: requested,
            attempts: failure.attempts,
            reason: failure.error.to_string(),
        })
    }

    /// Batched detail lookup.
    ///
    /// `ids` is split into chunks no larger than the configured batch size
    /// for `kind`. Identifiers the API returned no data for are absent from
    /// the result map.
    pub async fn lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
    ) -> Result<HashMap<String, DetailRecord>, HarvestError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let chunk_size = self
            .settings
            .batch_size(kind)
            .clamp(1, kind.api_max_batch_size());
        let chunks: Vec<&[String]> = ids.chunks(chunk_size).collect();
        debug!(
            "{} lookup of {} ids in {} chunks",
            kind,
            ids.len(),
            chunks.len()
        );

        let api = self.api.as_ref();
        let what = format!("{} lookup", kind);
        let what = what.as_str();

        let resolved: Vec<Vec<(String, DetailRecord)>> = stream::iter(chunks)
            .map(move |chunk| async move {
                let records = self
                    .call_with_retry(what, move || async move {
                        let records = api.batch_lookup(kind, chunk).await?;
                        if records.len() != chunk.len() {
                            return Err(ApiError::Parse(format!(
                                "{} entries returned for {} ids",
                                records.len(),
                                chunk.len()
                            )));
                        }
                        Ok(records)
                    })
                    .await
                    .map_err(|failure| HarvestError::LookupFailed {
                        kind,
                        batch: chunk.to_vec(),
                        attempts: failure.attempts,
                        reason: failure.error,
                    })?;

                // Null placeholders mean "no data" for that id
                Ok::<_, HarvestError>(
                    chunk
                        .iter()
                        .zip(records)
                        .filter_map(|(id, record)| record.map(|r| (id.clone(), r)))
                        .collect(),
                )
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .try_collect()
            .await?;

        Ok(resolved.into_iter().flatten().collect())
    }

    pub async fn audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<HashMap<String, RawAudioFeatures>, HarvestError> {
        let records = self.lookup(LookupKind::AudioFeatures, track_ids).await?;
        Ok(records
            .into_iter()
            .filter_map(|(id, record)| match record {
                DetailRecord::AudioFeatures(features) => Some((id, features)),
                _ => None,
            })
            .collect())
    }

    pub async fn artists(
        &self,
        artist_ids: &[String],
    ) -> Result<HashMap<String, RawArtist>, HarvestError> {
        let records = self.lookup(LookupKind::ArtistDetail, artist_ids).await?;
        Ok(records
            .into_iter()
            .filter_map(|(id, record)| match record {
                DetailRecord::Artist(artist) => Some((id, artist)),
                _ => None,
            })
            .collect())
    }

    pub async fn related_artists(
        &self,
        artist_ids: &[String],
    ) -> Result<HashMap<String, Vec<RawArtistRef>>, HarvestError> {
        let records = self.lookup(LookupKind::RelatedArtists, artist_ids).await?;
        Ok(records
            .into_iter()
            .filter_map(|(id, record)| match record {
                DetailRecord::RelatedArtists(related) => Some((id, related)),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::pacer::{NoOpPacer, PacerConfig, SlidingWindowPacer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Catalog double failing the first `failures` calls with `error`.
    struct FlakyCatalog {
        failures: u32,
        error: ApiError,
        calls: AtomicU32,
        batches: Mutex<Vec<usize>>,
        delay: Option<Duration>,
        /// Entries dropped from the end of every lookup response.
        short_by: usize,
    }

    impl FlakyCatalog {
        fn new(failures: u32, error: ApiError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                batches: Mutex::new(Vec::new()),
                delay: None,
                short_by: 0,
            }
        }

        fn fail(&self) -> Result<(), ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CatalogApi for FlakyCatalog {
        async fn search_playlists(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<String>, ApiError> {
            self.fail()?;
            Ok(vec!["p1".to_string()])
        }

        async fn playlist_tracks_page(
            &self,
            _playlist_id: &str,
            _cursor: Option<Cursor>,
        ) -> Result<Page<PlaylistItem>, ApiError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.fail()?;
            Ok(Page::last(vec![]))
        }

        async fn batch_lookup(
            &self,
            _kind: LookupKind,
            ids: &[String],
        ) -> Result<Vec<Option<DetailRecord>>, ApiError> {
            self.fail()?;
            self.batches.lock().unwrap().push(ids.len());
            Ok(ids[..ids.len().saturating_sub(self.short_by)]
                .iter()
                .map(|id| {
                    // ids ending in "x" have no data
                    (!id.ends_with('x')).then(|| {
                        DetailRecord::AudioFeatures(RawAudioFeatures {
                            id: id.clone(),
                            energy: Some(0.5),
                            ..Default::default()
                        })
                    })
                })
                .collect())
        }
    }

    fn client(api: Arc<FlakyCatalog>, settings: BatchSettings) -> BatchClient {
        BatchClient::new(api, Box::new(NoOpPacer), RetryPolicy::default(), settings)
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[tokio::test]
    async fn test_lookup_chunks_by_batch_size() {
        let api = Arc::new(FlakyCatalog::new(0, ApiError::Transient(String::new())));
        let settings = BatchSettings {
            audio_features_batch_size: 40,
            ..Default::default()
        };
        let client = client(api.clone(), settings);

        let result = client.audio_features(&ids(100)).await.unwrap();

        assert_eq!(result.len(), 100);
        assert_eq!(*api.batches.lock().unwrap(), vec![40, 40, 20]);
    }

    #[tokio::test]
    async fn test_lookup_omits_null_placeholders() {
        let api = Arc::new(FlakyCatalog::new(0, ApiError::Transient(String::new())));
        let client = client(api, BatchSettings::default());

        let ids = vec!["t1".to_string(), "t2x".to_string(), "t3".to_string()];
        let result = client.audio_features(&ids).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.contains_key("t1"));
        assert!(!result.contains_key("t2x"));
    }

    #[tokio::test]
    async fn test_misaligned_response_fails_the_batch() {
        let mut catalog = FlakyCatalog::new(0, ApiError::Transient(String::new()));
        catalog.short_by = 1;
        let api = Arc::new(catalog);
        let client = BatchClient::new(
            api,
            Box::new(NoOpPacer),
            RetryPolicy::no_retries(),
            BatchSettings::default(),
        );

        let err = client.audio_features(&ids(3)).await.unwrap_err();

        match err {
            HarvestError::LookupFailed { batch, reason, .. } => {
                assert_eq!(batch, ids(3));
                assert!(matches!(reason, ApiError::Parse(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_lookup_issues_no_calls() {
        let api = Arc::new(FlakyCatalog::new(0, ApiError::Transient(String::new())));
        let client = client(api.clone(), BatchSettings::default());

        assert!(client.artists(&[]).await.unwrap().is_empty());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let api = Arc::new(FlakyCatalog::new(
            2,
            ApiError::Transient("reset".to_string()),
        ));
        let client = client(api.clone(), BatchSettings::default());
        let start = Instant::now();

        let result = client.audio_features(&ids(3)).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_yield_lookup_failed_with_batch() {
        let api = Arc::new(FlakyCatalog::new(
            u32::MAX,
            ApiError::Transient("down".to_string()),
        ));
        let client = client(api.clone(), BatchSettings::default());

        let err = client.audio_features(&ids(2)).await.unwrap_err();

        match err {
            HarvestError::LookupFailed {
                kind,
                batch,
                attempts,
                ..
            } => {
                assert_eq!(kind, LookupKind::AudioFeatures);
                assert_eq!(batch, ids(2));
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(api.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let api = Arc::new(FlakyCatalog::new(
            1,
            ApiError::Rejected {
                status: 401,
                message: "expired".to_string(),
            },
        ));
        let client = client(api.clone(), BatchSettings::default());

        let err = client.search_playlists("year:2001", 5).await.unwrap_err();

        assert!(matches!(
            err,
            HarvestError::SearchFailed { attempts: 1, .. }
        ));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_for_retry_after() {
        let api = Arc::new(FlakyCatalog::new(
            1,
            ApiError::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            },
        ));
        let client = client(api, BatchSettings::default());
        let start = Instant::now();

        client.search_playlists("year:2001", 5).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_treated_as_transient() {
        let mut catalog = FlakyCatalog::new(0, ApiError::Transient(String::new()));
        catalog.delay = Some(Duration::from_secs(60));
        let api = Arc::new(catalog);
        let client = BatchClient::new(
            api,
            Box::new(NoOpPacer),
            RetryPolicy::no_retries(),
            BatchSettings::default(),
        );

        let err = client.fetch_page("p1", None).await.unwrap_err();

        match err {
            HarvestError::PageFetchFailed {
                playlist_id,
                reason,
                ..
            } => {
                assert_eq!(playlist_id, "p1");
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_paced() {
        let api = Arc::new(FlakyCatalog::new(0, ApiError::Transient(String::new())));
        let pacer = SlidingWindowPacer::new(PacerConfig {
            min_interval: Duration::from_millis(200),
            max_requests_per_window: 1_000,
            window: Duration::from_secs(30),
        });
        let settings = BatchSettings {
            audio_features_batch_size: 10,
            max_concurrent_requests: 4,
            ..Default::default()
        };
        let client = BatchClient::new(api, Box::new(pacer), RetryPolicy::default(), settings);
        let start = Instant::now();

        client.audio_features(&ids(40)).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(600));
        assert_eq!(client.pacer_stats().await.total_requests, 4);
    }
}
