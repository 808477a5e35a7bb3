//! One discovery cycle, end to end.
//!
//! The orchestrator owns the two display keys (`latest_papers` and
//! `recently_shown_papers`); the archive manager owns `papers_archive`.
//! Several worker profiles may share one KV namespace, so the latest set
//! is merged with what is already stored rather than replaced. Concurrent
//! runs can still race on that read-modify-write; with daily and weekly
//! cadences the overlap window is accepted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paperfeed_adapters::FeedAdapter;
use paperfeed_core::{
    RecentlyShownLedger, ScoredPaper, ShownPaper, StoredLatestSet,
};
use paperfeed_storage::{read_json, write_json, HttpFetcher, KvStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::archive::ArchiveManager;
use crate::config::ScoringConfig;
use crate::dedupe::dedupe;
use crate::enrich::{enrich_papers, CitationProvider};
use crate::quality::QualityScorer;
use crate::rank::Ranker;
use crate::recency::filter_recently_shown;
use crate::score::RelevanceScorer;

pub const LATEST_KEY: &str = "latest_papers";
pub const LEDGER_KEY: &str = "recently_shown_papers";

const LATEST_CAP: usize = 30;
const LEDGER_CAP: usize = 100;
const LATEST_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const LEDGER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub fetched: usize,
    pub deduplicated: usize,
    pub fresh: usize,
    /// Papers newly scored and ranked this cycle. Zero when every fetched
    /// paper was shown recently.
    pub papers_stored: usize,
    pub latest_total: usize,
}

pub struct Orchestrator {
    store: Arc<dyn KvStore>,
    http: Arc<HttpFetcher>,
    adapters: Vec<Box<dyn FeedAdapter>>,
    scorer: RelevanceScorer,
    quality: QualityScorer,
    ranker: Ranker,
    archive: ArchiveManager,
    enricher: Arc<dyn CitationProvider>,
    lookback_days: i64,
    enrich_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn KvStore>,
        http: Arc<HttpFetcher>,
        adapters: Vec<Box<dyn FeedAdapter>>,
        scoring: &ScoringConfig,
        enricher: Arc<dyn CitationProvider>,
        lookback_days: i64,
        enrich_delay: Duration,
    ) -> Self {
        Self {
            archive: ArchiveManager::new(store.clone()),
            store,
            http,
            adapters,
            scorer: RelevanceScorer::new(scoring),
            quality: QualityScorer::new(scoring.quality.clone()),
            ranker: Ranker::new(scoring),
            enricher,
            lookback_days,
            enrich_delay,
        }
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let date_after =
            (self.lookback_days > 0).then(|| now - chrono::Duration::days(self.lookback_days));
        info!(%run_id, lookback_days = self.lookback_days, "run started");

        // 1. Fetch every source; a broken adapter contributes nothing.
        let mut fetched = Vec::new();
        for adapter in &self.adapters {
            let batch = adapter.fetch(self.http.as_ref(), date_after).await;
            info!(%run_id, source = adapter.source(), count = batch.len(), "source fetched");
            fetched.extend(batch);
        }
        let fetched_count = fetched.len();

        // 2.–3. Dedupe, then drop anything shown in the last day.
        let deduped = dedupe(fetched);
        let deduplicated = deduped.len();
        let ledger: Option<RecentlyShownLedger> =
            read_json(self.store.as_ref(), LEDGER_KEY).await;
        let mut fresh = filter_recently_shown(deduped, ledger.as_ref());
        let fresh_count = fresh.len();

        if fresh.is_empty() {
            let latest: StoredLatestSet = read_json(self.store.as_ref(), LATEST_KEY)
                .await
                .unwrap_or_default();
            info!(%run_id, fetched = fetched_count, "no fresh papers, stored state untouched");
            return Ok(RunSummary {
                run_id,
                timestamp: now,
                fetched: fetched_count,
                deduplicated,
                fresh: 0,
                papers_stored: 0,
                latest_total: latest.papers.len(),
            });
        }

        // 4.–6. Enrich, score, rank.
        enrich_papers(self.enricher.as_ref(), &mut fresh, self.enrich_delay).await;
        let scored: Vec<ScoredPaper> = fresh
            .iter()
            .map(|paper| {
                let mut scored = self.scorer.score(paper);
                scored.quality_score = Some(self.quality.score(paper));
                scored
            })
            .collect();
        let ranked = self.ranker.rank(scored, now);
        let papers_stored = ranked.len();

        // 7. Archive everything ranked, then merge into the latest set.
        self.archive.record(&ranked, now).await?;
        let latest = self.merge_latest(&ranked, now).await?;

        // 8. Remember what is actually on display: the stored set, not the
        // whole ranked batch. Papers that missed the display cap stay
        // eligible for the next run.
        self.extend_ledger(&latest.papers, ledger, now).await?;

        info!(
            %run_id,
            fetched = fetched_count,
            fresh = fresh_count,
            papers_stored,
            latest_total = latest.papers.len(),
            "run finished"
        );
        Ok(RunSummary {
            run_id,
            timestamp: now,
            fetched: fetched_count,
            deduplicated,
            fresh: fresh_count,
            papers_stored,
            latest_total: latest.papers.len(),
        })
    }

    /// Merge the new batch with whatever is currently displayed, re-rank
    /// the union, and keep the top of it. Existing papers survive unless
    /// the new batch carries the same url or title.
    async fn merge_latest(
        &self,
        ranked: &[ScoredPaper],
        now: DateTime<Utc>,
    ) -> Result<StoredLatestSet, RunError> {
        let existing: StoredLatestSet = read_json(self.store.as_ref(), LATEST_KEY)
            .await
            .unwrap_or_default();

        let new_urls: HashSet<&str> = ranked.iter().map(|p| p.paper.url.as_str()).collect();
        let new_keys: HashSet<String> = ranked.iter().map(|p| p.paper.title_key()).collect();

        let mut merged: Vec<ScoredPaper> = ranked.to_vec();
        merged.extend(existing.papers.into_iter().filter(|old| {
            !new_urls.contains(old.paper.url.as_str()) && !new_keys.contains(&old.paper.title_key())
        }));

        let merged = self.ranker.rank(merged, now);
        let count = merged.len();
        let mut papers = merged;
        papers.truncate(LATEST_CAP);

        let latest = StoredLatestSet {
            papers,
            updated: Some(now),
            count,
        };
        write_json(self.store.as_ref(), LATEST_KEY, &latest, Some(LATEST_TTL)).await?;
        Ok(latest)
    }

    /// Prepend the displayed set to the ledger. Survivors from earlier
    /// runs move back to the front, refreshing their anti-repeat window.
    async fn extend_ledger(
        &self,
        displayed: &[ScoredPaper],
        previous: Option<RecentlyShownLedger>,
        now: DateTime<Utc>,
    ) -> Result<(), RunError> {
        let mut papers: Vec<ShownPaper> = displayed
            .iter()
            .map(|p| ShownPaper {
                url: p.paper.url.clone(),
                title: p.paper.title.clone(),
            })
            .collect();
        if let Some(previous) = previous {
            let shown: HashSet<String> = papers.iter().map(|p| p.url.clone()).collect();
            papers.extend(
                previous
                    .papers
                    .into_iter()
                    .filter(|p| !shown.contains(&p.url)),
            );
        }
        papers.truncate(LEDGER_CAP);
        let ledger = RecentlyShownLedger {
            papers,
            updated: Some(now),
        };
        write_json(self.store.as_ref(), LEDGER_KEY, &ledger, Some(LEDGER_TTL)).await?;
        Ok(())
    }
}

/// Start a cron-driven loop over [`Orchestrator::run_once`].
pub async fn build_scheduler(
    orchestrator: Arc<Orchestrator>,
    cron: &str,
) -> anyhow::Result<JobScheduler> {
    use anyhow::Context;

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            match orchestrator.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    papers_stored = summary.papers_stored,
                    "scheduled run finished"
                ),
                Err(err) => error!(%err, "scheduled run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;
    Ok(sched)
}
