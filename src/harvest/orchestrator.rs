//! Harvest orchestrator.
//!
//! Drives every configured source through the same pipeline:
//!
//! ```text
//! Resolving → Walking → Enriching → Accumulating → (next source | Done)
//! ```
//!
//! A year source is resolved to playlists with a catalog search; a playlist
//! source resolves to itself. Playlists and tracks already consumed by an
//! earlier source are skipped. Tracks enter the accumulator only after their
//! whole batch has been enriched, so a failed or cancelled source never
//! leaves a half-enriched track behind.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::accumulator::HarvestAccumulator;
use super::batch_client::BatchClient;
use super::dedup::{EntityDeduplicator, EntityKind};
use super::enrichment::EnrichmentFanout;
use super::error::{HarvestError, RunAborted};
use super::model::HarvestOutput;
use super::pacer::pacer_from_settings;
use super::pagination::playlist_items;
use super::retry_policy::RetryPolicy;
use crate::catalog::{CatalogApi, PlaylistItem, RawTrack};
use crate::config::{AppConfig, HarvestSettings};

/// A configured harvest source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestSource {
    /// Playlists found by searching for the year.
    Year(u16),
    /// One playlist by id.
    Playlist(String),
}

impl HarvestSource {
    pub fn label(&self) -> String {
        match self {
            HarvestSource::Year(year) => format!("year_{}", year),
            HarvestSource::Playlist(id) => format!("playlist_{}", id),
        }
    }
}

impl std::fmt::Display for HarvestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarvestSource::Year(year) => write!(f, "year {}", year),
            HarvestSource::Playlist(id) => write!(f, "playlist {}", id),
        }
    }
}

/// Pipeline stage of the source being harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStage {
    Resolving,
    Walking,
    Enriching,
    Accumulating,
}

impl std::fmt::Display for HarvestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HarvestStage::Resolving => "Resolving",
            HarvestStage::Walking => "Walking",
            HarvestStage::Enriching => "Enriching",
            HarvestStage::Accumulating => "Accumulating",
        };
        f.write_str(name)
    }
}

/// How a source ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// New tracks were accumulated.
    Completed,
    /// Nothing new: no playlists, no tracks, or only already-seen tracks.
    Empty,
    Failed(String),
    /// Stopped by cancellation; nothing from this source was accumulated.
    Cancelled,
    /// Never started because the run ended first.
    Skipped,
}

/// Per-source counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub label: String,
    pub playlists_resolved: usize,
    pub playlists_new: usize,
    pub raw_items: usize,
    /// Null tracks and local files.
    pub skipped_items: usize,
    pub duplicate_tracks: usize,
    pub new_tracks: usize,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    fn new(source: &HarvestSource) -> Self {
        Self {
            label: source.label(),
            playlists_resolved: 0,
            playlists_new: 0,
            raw_items: 0,
            skipped_items: 0,
            duplicate_tracks: 0,
            new_tracks: 0,
            outcome: SourceOutcome::Skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    /// A source failed with `continue_on_source_failure` off.
    Aborted,
}

/// Result of a harvest run, complete or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub status: RunStatus,
    pub sources: Vec<SourceReport>,
    #[serde(flatten)]
    pub output: HarvestOutput,
}

impl HarvestReport {
    pub fn is_partial(&self) -> bool {
        self.status != RunStatus::Completed
            || self
                .sources
                .iter()
                .any(|s| matches!(s.outcome, SourceOutcome::Failed(_)))
    }

    pub fn failed_sources(&self) -> Vec<&SourceReport> {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::Failed(_)))
            .collect()
    }
}

/// Resources shared by one harvest run.
#[derive(Clone)]
pub struct HarvestContext {
    /// Token to check for cancellation requests.
    pub cancellation_token: CancellationToken,

    /// Paced, retrying access to the catalog.
    pub client: Arc<BatchClient>,

    /// Identifiers seen during this run.
    pub dedup: Arc<EntityDeduplicator>,
}

impl HarvestContext {
    /// Create a context with a fresh deduplicator.
    pub fn new(client: Arc<BatchClient>, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            client,
            dedup: Arc::new(EntityDeduplicator::new()),
        }
    }

    /// Wire a batch client over `api` as described by `config`.
    pub fn from_config(
        config: &AppConfig,
        api: Arc<dyn CatalogApi>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let client = BatchClient::new(
            api,
            pacer_from_settings(&config.rate_limit),
            RetryPolicy::new(&config.retry),
            config.batch.clone(),
        );
        Self::new(Arc::new(client), cancellation_token)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), HarvestError> {
        if self.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct HarvestOrchestrator {
    ctx: HarvestContext,
    settings: HarvestSettings,
}

impl HarvestOrchestrator {
    /// Fails with [`HarvestError::Configuration`] before any network activity
    /// when the settings are unusable.
    pub fn new(ctx: HarvestContext, settings: HarvestSettings) -> Result<Self, HarvestError> {
        settings.validate()?;
        Ok(Self { ctx, settings })
    }

    /// Harvest every configured source in order.
    ///
    /// Returns the report with status `Cancelled` when the token fires.
    /// When a source fails and `continue_on_source_failure` is off, returns
    /// [`RunAborted`] carrying everything accumulated before that source.
    pub async fn run(&self) -> Result<HarvestReport, RunAborted> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now().timestamp();
        info!(
            "Starting harvest run {} over {} sources",
            run_id,
            self.settings.sources.len()
        );

        let mut acc = HarvestAccumulator::new(Arc::clone(&self.ctx.dedup));
        let mut reports = Vec::with_capacity(self.settings.sources.len());
        let mut status = RunStatus::Completed;
        let mut abort: Option<(String, HarvestError)> = None;

        for source in &self.settings.sources {
            let mut report = SourceReport::new(source);
            if status != RunStatus::Completed {
                reports.push(report);
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = self.ctx.cancellation_token.cancelled() => Err(HarvestError::Cancelled),
                result = self.harvest_source(source, &mut acc, &mut report) => result,
            };

            match result {
                Ok(()) => {
                    report.outcome = if report.new_tracks > 0 {
                        SourceOutcome::Completed
                    } else {
                        SourceOutcome::Empty
                    };
                    info!(
                        "[{}] Done: {} new tracks, {} duplicates, {} skipped items ({} tracks, {} artists so far)",
                        report.label,
                        report.new_tracks,
                        report.duplicate_tracks,
                        report.skipped_items,
                        acc.track_count(),
                        acc.artist_count()
                    );
                }
                Err(HarvestError::Cancelled) => {
                    warn!("[{}] Cancelled, discarding unfinished work", report.label);
                    report.outcome = SourceOutcome::Cancelled;
                    status = RunStatus::Cancelled;
                }
                Err(e) => {
                    report.outcome = SourceOutcome::Failed(e.to_string());
                    if self.settings.continue_on_source_failure {
                        warn!("[{}] Source failed, continuing: {}", report.label, e);
                    } else {
                        error!("[{}] Source failed, aborting run: {}", report.label, e);
                        status = RunStatus::Aborted;
                        abort = Some((report.label.clone(), e));
                    }
                }
            }
            reports.push(report);
        }

        let report = HarvestReport {
            run_id,
            started_at,
            finished_at: Utc::now().timestamp(),
            status,
            sources: reports,
            output: acc.finalize(),
        };
        info!(
            "Harvest run {} finished ({:?}): {} tracks, {} artists",
            report.run_id,
            report.status,
            report.output.tracks.len(),
            report.output.artists.len()
        );
        let pacing = self.ctx.client.pacer_stats().await;
        info!(
            "Issued {} catalog requests, {:?} spent pacing",
            pacing.total_requests, pacing.total_wait
        );

        match abort {
            Some((source_label, error)) => Err(RunAborted {
                source_label,
                error,
                partial: Box::new(report),
            }),
            None => Ok(report),
        }
    }

    async fn harvest_source(
        &self,
        source: &HarvestSource,
        acc: &mut HarvestAccumulator,
        report: &mut SourceReport,
    ) -> Result<(), HarvestError> {
        let label = source.label();

        info!("[{}] {}", label, HarvestStage::Resolving);
        let playlists = self.resolve(source, report).await?;
        if playlists.is_empty() {
            info!("[{}] No new playlists for {}", label, source);
            return Ok(());
        }

        self.ctx.check_cancelled()?;
        info!(
            "[{}] {} {} playlists",
            label,
            HarvestStage::Walking,
            playlists.len()
        );
        let raw_tracks = self.walk(&label, &playlists, acc, report).await?;
        if raw_tracks.is_empty() {
            info!("[{}] No new tracks", label);
            self.consume_playlists(&playlists);
            return Ok(());
        }

        self.ctx.check_cancelled()?;
        info!(
            "[{}] {} {} new tracks",
            label,
            HarvestStage::Enriching,
            raw_tracks.len()
        );
        let fanout = EnrichmentFanout::new(
            &self.ctx.client,
            &self.ctx.dedup,
            self.settings.enrichment,
        );
        let batch = match fanout.enrich(raw_tracks, acc.known_artists()).await {
            Ok(batch) => batch,
            Err(failure) => {
                acc.record_artists(failure.artists);
                return Err(failure.error);
            }
        };

        self.ctx.check_cancelled()?;
        info!("[{}] {}", label, HarvestStage::Accumulating);
        let stats = acc.accept(batch);
        self.consume_playlists(&playlists);
        report.new_tracks = stats.accepted;
        report.duplicate_tracks += stats.duplicates;
        Ok(())
    }

    /// Mark playlists as consumed once their tracks are in the accumulator.
    fn consume_playlists(&self, playlists: &[String]) {
        self.ctx
            .dedup
            .claim_new(EntityKind::Playlist, playlists.iter().map(String::as_str));
    }

    /// Playlist ids of `source` not consumed by an earlier source.
    ///
    /// Nothing is claimed here: a playlist counts as consumed only after the
    /// source that walked it was accepted.
    async fn resolve(
        &self,
        source: &HarvestSource,
        report: &mut SourceReport,
    ) -> Result<Vec<String>, HarvestError> {
        let candidates = match source {
            HarvestSource::Year(year) => {
                self.ctx
                    .client
                    .search_playlists(&year.to_string(), self.settings.playlists_per_year)
                    .await?
            }
            HarvestSource::Playlist(id) => vec![id.clone()],
        };
        report.playlists_resolved = candidates.len();

        let mut listed: HashSet<&String> = HashSet::new();
        let playlists: Vec<String> = candidates
            .iter()
            .filter(|id| !self.ctx.dedup.contains(EntityKind::Playlist, id))
            .filter(|id| listed.insert(*id))
            .cloned()
            .collect();
        report.playlists_new = playlists.len();
        info!(
            "Resolved {} to {} playlists ({} new)",
            source,
            candidates.len(),
            playlists.len()
        );
        Ok(playlists)
    }

    /// Raw tracks of `playlists` not accumulated yet, each listed once.
    async fn walk(
        &self,
        label: &str,
        playlists: &[String],
        acc: &HarvestAccumulator,
        report: &mut SourceReport,
    ) -> Result<Vec<RawTrack>, HarvestError> {
        let mut listed = HashSet::new();
        let mut raw_tracks = Vec::new();

        for playlist_id in playlists {
            self.ctx.check_cancelled()?;

            let items: Vec<PlaylistItem> = playlist_items(&self.ctx.client, playlist_id)
                .try_collect()
                .await?;
            if items.is_empty() {
                info!("[{}] Playlist {} has no tracks", label, playlist_id);
            }
            report.raw_items += items.len();

            for item in items {
                let Some(track) = item.track else {
                    report.skipped_items += 1;
                    continue;
                };
                let Some(id) = track.id.clone() else {
                    report.skipped_items += 1;
                    continue;
                };
                if !acc.is_new_track(&id) || !listed.insert(id) {
                    report.duplicate_tracks += 1;
                    continue;
                }
                raw_tracks.push(track);
            }
        }

        Ok(raw_tracks)
    }
}
