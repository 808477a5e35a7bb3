//! The discovery pipeline: dedupe, filter, score, rank, archive, persist.

pub mod archive;
pub mod config;
pub mod dedupe;
pub mod enrich;
pub mod orchestrator;
pub mod quality;
pub mod rank;
pub mod recency;
pub mod score;

pub use archive::{
    ArchiveManager, ArchiveQuery, ArchiveStats, GroupedHits, StoredArchive, ARCHIVE_KEY,
};
pub use config::{load_registry, PipelineConfig, ScoringConfig};
pub use dedupe::dedupe;
pub use enrich::{CitationProvider, NoEnrichment, SemanticScholarClient};
pub use orchestrator::{
    build_scheduler, Orchestrator, RunError, RunSummary, LATEST_KEY, LEDGER_KEY,
};
pub use quality::QualityScorer;
pub use rank::Ranker;
pub use recency::filter_recently_shown;
pub use score::RelevanceScorer;
