mod file_config;

pub use file_config::{
    EnrichmentConfig, FileConfig, HarvestConfig, OutputConfig, RateLimitConfig, RetryConfig,
};

use crate::catalog::LookupKind;
use crate::harvest::{HarvestError, HarvestSource};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub request_timeout_sec: u64,
    pub years: Vec<u16>,
    pub year_start: Option<u16>,
    pub year_end: Option<u16>,
    pub playlists: Vec<String>,
    pub playlists_per_year: usize,
    pub continue_on_source_failure: bool,
    pub skip_related_artists: bool,
    pub output_dir: PathBuf,
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub api_base_url: String,
    pub access_token: String,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    pub export_dir: Option<PathBuf>,

    // Feature configs (with defaults)
    pub harvest: HarvestSettings,
    pub batch: BatchSettings,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
}

/// Which secondary lookups a harvest performs.
///
/// Narrower pipelines (e.g. no related artists) are subsets of the full one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentScope {
    pub audio_features: bool,
    pub artist_details: bool,
    pub related_artists: bool,
}

impl Default for EnrichmentScope {
    fn default() -> Self {
        Self {
            audio_features: true,
            artist_details: true,
            related_artists: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub sources: Vec<HarvestSource>,
    pub playlists_per_year: usize,
    pub continue_on_source_failure: bool,
    pub enrichment: EnrichmentScope,
}

impl HarvestSettings {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.sources.is_empty() {
            return Err(HarvestError::Configuration(
                "at least one year or playlist source must be configured".to_string(),
            ));
        }
        if self.playlists_per_year == 0 {
            return Err(HarvestError::Configuration(
                "playlists_per_year must be greater than zero".to_string(),
            ));
        }
        if self
            .sources
            .iter()
            .any(|s| matches!(s, HarvestSource::Playlist(id) if id.trim().is_empty()))
        {
            return Err(HarvestError::Configuration(
                "playlist ids must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub audio_features_batch_size: usize,
    pub artist_batch_size: usize,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            audio_features_batch_size: LookupKind::AudioFeatures.api_max_batch_size(),
            artist_batch_size: LookupKind::ArtistDetail.api_max_batch_size(),
            max_concurrent_requests: 1,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl BatchSettings {
    /// Number of ids sent per request for the given lookup kind.
    pub fn batch_size(&self, kind: LookupKind) -> usize {
        match kind {
            LookupKind::AudioFeatures => self.audio_features_batch_size,
            LookupKind::ArtistDetail => self.artist_batch_size,
            LookupKind::RelatedArtists => 1,
        }
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        for kind in [LookupKind::AudioFeatures, LookupKind::ArtistDetail] {
            let size = self.batch_size(kind);
            if size == 0 || size > kind.api_max_batch_size() {
                return Err(HarvestError::Configuration(format!(
                    "{} batch size must be between 1 and {}, got {}",
                    kind,
                    kind.api_max_batch_size(),
                    size
                )));
            }
        }
        if self.max_concurrent_requests == 0 {
            return Err(HarvestError::Configuration(
                "max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(HarvestError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub min_interval_ms: u64,
    pub max_requests_per_window: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 100,
            max_requests_per_window: 150,
            window_secs: 30,
        }
    }
}

impl RateLimitSettings {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.enabled && (self.max_requests_per_window == 0 || self.window_secs == 0) {
            return Err(HarvestError::Configuration(
                "rate limit window and request cap must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(HarvestError::Configuration(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let api_base_url = file
            .api_base_url
            .unwrap_or_else(|| cli.api_base_url.clone());

        let access_token = file
            .access_token
            .or_else(|| cli.access_token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("access_token must be specified via --access-token or in config file")
            })?;

        let request_timeout =
            Duration::from_secs(file.request_timeout_sec.unwrap_or(cli.request_timeout_sec));

        // Sources: years first, then explicit playlists
        let harvest_file = file.harvest.unwrap_or_default();
        let years = harvest_file
            .years
            .or_else(|| year_range(harvest_file.year_start, harvest_file.year_end))
            .unwrap_or_else(|| {
                let mut years = cli.years.clone();
                years.extend(year_range(cli.year_start, cli.year_end).unwrap_or_default());
                years
            });
        let playlists = harvest_file
            .playlists
            .unwrap_or_else(|| cli.playlists.clone());

        let mut sources: Vec<HarvestSource> =
            years.into_iter().map(HarvestSource::Year).collect();
        sources.extend(playlists.into_iter().map(HarvestSource::Playlist));

        let enrichment_file = file.enrichment.unwrap_or_default();
        let enrichment = EnrichmentScope {
            audio_features: enrichment_file.audio_features.unwrap_or(true),
            artist_details: enrichment_file.artist_details.unwrap_or(true),
            related_artists: enrichment_file
                .related_artists
                .unwrap_or(!cli.skip_related_artists),
        };

        let harvest = HarvestSettings {
            sources,
            playlists_per_year: harvest_file
                .playlists_per_year
                .unwrap_or(cli.playlists_per_year),
            continue_on_source_failure: harvest_file
                .continue_on_source_failure
                .unwrap_or(cli.continue_on_source_failure),
            enrichment,
        };
        harvest.validate()?;

        let batch_defaults = BatchSettings::default();
        let batch = BatchSettings {
            audio_features_batch_size: enrichment_file
                .audio_features_batch_size
                .unwrap_or(batch_defaults.audio_features_batch_size),
            artist_batch_size: enrichment_file
                .artist_batch_size
                .unwrap_or(batch_defaults.artist_batch_size),
            max_concurrent_requests: enrichment_file
                .max_concurrent_requests
                .unwrap_or(batch_defaults.max_concurrent_requests),
            request_timeout,
        };
        batch.validate()?;

        let rl_file = file.rate_limit.unwrap_or_default();
        let rl_defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            enabled: rl_file.enabled.unwrap_or(rl_defaults.enabled),
            min_interval_ms: rl_file.min_interval_ms.unwrap_or(rl_defaults.min_interval_ms),
            max_requests_per_window: rl_file
                .max_requests_per_window
                .unwrap_or(rl_defaults.max_requests_per_window),
            window_secs: rl_file.window_secs.unwrap_or(rl_defaults.window_secs),
        };
        rate_limit.validate()?;

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_retries: retry_file.max_retries.unwrap_or(retry_defaults.max_retries),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(retry_defaults.initial_backoff_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_defaults.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(retry_defaults.backoff_multiplier),
        };
        retry.validate()?;

        let output_file = file.output.unwrap_or_default();
        let output_dir = output_file
            .output_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.output_dir.clone());
        let export_dir = output_file
            .export_dir
            .map(PathBuf::from)
            .or_else(|| cli.export_dir.clone());

        Ok(Self {
            api_base_url,
            access_token,
            request_timeout,
            output_dir,
            export_dir,
            harvest,
            batch,
            rate_limit,
            retry,
        })
    }
}

fn year_range(start: Option<u16>, end: Option<u16>) -> Option<Vec<u16>> {
    match (start, end) {
        (Some(start), Some(end)) => Some((start..=end).collect()),
        (Some(start), None) => Some(vec![start]),
        _ => None,
    }
}
