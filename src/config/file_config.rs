use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub api_base_url: Option<String>,
    pub access_token: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub harvest: Option<HarvestConfig>,
    pub enrichment: Option<EnrichmentConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: Option<RetryConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HarvestConfig {
    pub years: Option<Vec<u16>>,
    pub year_start: Option<u16>,
    pub year_end: Option<u16>,
    pub playlists: Option<Vec<String>>,
    pub playlists_per_year: Option<usize>,
    pub continue_on_source_failure: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub audio_features: Option<bool>,
    pub artist_details: Option<bool>,
    pub related_artists: Option<bool>,
    pub audio_features_batch_size: Option<usize>,
    pub artist_batch_size: Option<usize>,
    pub max_concurrent_requests: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: Option<bool>,
    pub min_interval_ms: Option<u64>,
    pub max_requests_per_window: Option<u32>,
    pub window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: Option<String>,
    pub export_dir: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
