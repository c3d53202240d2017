//! Error types for the harvest pipeline.

use super::orchestrator::HarvestReport;
use crate::catalog::{ApiError, Cursor, LookupKind};
use thiserror::Error;

/// Errors that can occur while harvesting.
///
/// Transient API failures never surface here directly: the batch client
/// retries them and only reports the batch once retries are exhausted.
#[derive(Debug, Clone, Error)]
pub enum HarvestError {
    /// A detail lookup batch could not be resolved.
    #[error(
        "{} lookup failed for {} ids after {} attempts: {}",
        .kind, .batch.len(), .attempts, .reason
    )]
    LookupFailed {
        kind: LookupKind,
        batch: Vec<String>,
        attempts: u32,
        reason: ApiError,
    },

    /// A page of a playlist could not be fetched, or the cursor stopped advancing.
    #[error("Failed to fetch page of playlist {playlist_id} after {attempts} attempts: {reason}")]
    PageFetchFailed {
        playlist_id: String,
        cursor: Option<Cursor>,
        attempts: u32,
        reason: String,
    },

    /// A playlist search could not be completed.
    #[error("Playlist search for {query:?} failed after {attempts} attempts: {reason}")]
    SearchFailed {
        query: String,
        attempts: u32,
        reason: ApiError,
    },

    /// Invalid run configuration, detected before any network activity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled.
    #[error("Harvest was cancelled")]
    Cancelled,
}

impl HarvestError {
    /// The identifiers this error is about, if any.
    pub fn offending_ids(&self) -> &[String] {
        match self {
            HarvestError::LookupFailed { batch, .. } => batch,
            HarvestError::PageFetchFailed { playlist_id, .. } => std::slice::from_ref(playlist_id),
            _ => &[],
        }
    }
}

/// A source failed while `continue_on_source_failure` was off.
///
/// Everything accumulated before the failing source is kept in `partial`.
#[derive(Debug, Error)]
#[error("Harvest aborted at {source_label}: {error}")]
pub struct RunAborted {
    pub source_label: String,
    #[source]
    pub error: HarvestError,
    pub partial: Box<HarvestReport>,
}
