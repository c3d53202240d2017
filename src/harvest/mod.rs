//! Harvesting and enrichment pipeline.
//!
//! [`HarvestOrchestrator`] walks the configured sources through the
//! [`BatchClient`], deduplicates entities with the run's
//! [`EntityDeduplicator`] and accumulates enriched tracks into a
//! [`HarvestReport`].

mod accumulator;
mod batch_client;
mod dedup;
mod enrichment;
mod error;
mod model;
mod orchestrator;
mod pacer;
mod pagination;
mod retry_policy;

pub use accumulator::{AcceptStats, HarvestAccumulator};
pub use batch_client::BatchClient;
pub use dedup::{EntityDeduplicator, EntityKind};
pub use enrichment::{EnrichedBatch, EnrichmentFailure, EnrichmentFanout};
pub use error::{HarvestError, RunAborted};
pub use model::{
    AlbumRef, Artist, ArtistRef, AudioFeatures, HarvestOutput, RelatedArtistEdge, Track,
};
pub use orchestrator::{
    HarvestContext, HarvestOrchestrator, HarvestReport, HarvestSource, HarvestStage, RunStatus,
    SourceOutcome, SourceReport,
};
pub use pacer::{
    pacer_from_settings, NoOpPacer, PacerConfig, PacerStats, RequestPacer, SlidingWindowPacer,
};
pub use pagination::{playlist_items, walk_pages};
pub use retry_policy::RetryPolicy;
