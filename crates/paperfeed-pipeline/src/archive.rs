//! Permanent paper archive: upsert on every run, never delete.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use paperfeed_core::{
    extract_arxiv_id, extract_doi, simplified_title, ArchiveEntry, ScoredPaper,
};
use paperfeed_storage::{read_json, write_json, KvStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const ARCHIVE_KEY: &str = "papers_archive";
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredArchive {
    pub papers: Vec<ArchiveEntry>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveQuery {
    pub q: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub min_relevance: Option<f64>,
    pub only_golden: bool,
    pub limit: Option<usize>,
}

/// Display groupings derived from a search result: the golden subset and
/// the hits bucketed by matched category. A paper in several categories
/// appears in each of its buckets.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedHits {
    pub golden: Vec<ArchiveEntry>,
    pub by_category: BTreeMap<String, Vec<ArchiveEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub total: usize,
    pub golden_count: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub avg_relevance: f64,
}

pub struct ArchiveManager {
    store: Arc<dyn KvStore>,
}

impl ArchiveManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> StoredArchive {
        read_json(self.store.as_ref(), ARCHIVE_KEY)
            .await
            .unwrap_or_default()
    }

    /// Merge a ranked batch into the archive. A paper already present (by
    /// url) keeps its `first_seen` and has `times_seen` bumped; all other
    /// metadata reflects the latest sighting.
    pub async fn record(
        &self,
        papers: &[ScoredPaper],
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut archive = self.load().await;
        let mut added = 0;
        for scored in papers {
            match archive
                .papers
                .iter_mut()
                .find(|entry| entry.url == scored.paper.url)
            {
                Some(entry) => {
                    let first_seen = entry.first_seen;
                    let times_seen = entry.times_seen + 1;
                    *entry = entry_from(scored, now);
                    entry.first_seen = first_seen;
                    entry.times_seen = times_seen;
                }
                None => {
                    archive.papers.push(entry_from(scored, now));
                    added += 1;
                }
            }
        }
        archive.papers.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(b.last_seen.cmp(&a.last_seen))
        });
        archive.updated = Some(now);
        write_json(self.store.as_ref(), ARCHIVE_KEY, &archive, None).await?;
        info!(added, total = archive.papers.len(), "archive updated");
        Ok(added)
    }

    pub fn search(archive: &StoredArchive, query: &ArchiveQuery) -> Vec<ArchiveEntry> {
        let needle = query.q.as_ref().map(|q| q.to_lowercase());
        let mut hits: Vec<ArchiveEntry> = archive
            .papers
            .iter()
            .filter(|entry| {
                if let Some(needle) = &needle {
                    if !entry_matches_text(entry, needle) {
                        return false;
                    }
                }
                if let Some(tag) = &query.tag {
                    if !entry.tags.iter().any(|t| t == tag) {
                        return false;
                    }
                }
                if let Some(category) = &query.category {
                    if !entry.matched_categories.iter().any(|c| c == category) {
                        return false;
                    }
                }
                if let Some(min) = query.min_relevance {
                    if entry.relevance_score < min {
                        return false;
                    }
                }
                if query.only_golden && !entry.is_golden {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        hits
    }

    pub fn group(hits: &[ArchiveEntry]) -> GroupedHits {
        let mut by_category: BTreeMap<String, Vec<ArchiveEntry>> = BTreeMap::new();
        for entry in hits {
            for category in &entry.matched_categories {
                by_category
                    .entry(category.clone())
                    .or_default()
                    .push(entry.clone());
            }
        }
        GroupedHits {
            golden: hits.iter().filter(|e| e.is_golden).cloned().collect(),
            by_category,
        }
    }

    pub fn stats(archive: &StoredArchive) -> ArchiveStats {
        let mut by_source = BTreeMap::new();
        let mut by_tag = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut relevance_sum = 0.0;
        for entry in &archive.papers {
            *by_source.entry(entry.source.clone()).or_insert(0) += 1;
            for tag in &entry.tags {
                *by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
            for category in &entry.matched_categories {
                *by_category.entry(category.clone()).or_insert(0) += 1;
            }
            relevance_sum += entry.relevance_score;
        }
        let total = archive.papers.len();
        ArchiveStats {
            total,
            golden_count: archive.papers.iter().filter(|e| e.is_golden).count(),
            by_source,
            by_tag,
            by_category,
            oldest: archive.papers.iter().map(|e| e.first_seen).min(),
            newest: archive.papers.iter().map(|e| e.first_seen).max(),
            avg_relevance: if total == 0 {
                0.0
            } else {
                relevance_sum / total as f64
            },
        }
    }
}

fn entry_matches_text(entry: &ArchiveEntry, needle: &str) -> bool {
    entry.title.to_lowercase().contains(needle)
        || entry.simplified_title.to_lowercase().contains(needle)
        || entry.abstract_preview.to_lowercase().contains(needle)
        || entry
            .authors
            .iter()
            .any(|a| a.to_lowercase().contains(needle))
        || entry.doi.as_deref().is_some_and(|d| d.contains(needle))
        || entry
            .arxiv_id
            .as_deref()
            .is_some_and(|id| id.contains(needle))
}

fn entry_from(scored: &ScoredPaper, now: DateTime<Utc>) -> ArchiveEntry {
    let paper = &scored.paper;
    ArchiveEntry {
        id: paper.url.clone(),
        doi: extract_doi(&paper.url),
        arxiv_id: extract_arxiv_id(&paper.url),
        title: paper.title.clone(),
        simplified_title: simplified_title(&paper.title),
        authors: paper.authors.clone(),
        published: paper.published,
        source: paper.source.clone(),
        tags: scored.tags.clone(),
        matched_categories: scored.matched_categories.clone(),
        url: paper.url.clone(),
        pdf_url: paper.pdf_url.clone(),
        abstract_preview: paper.abstract_text.chars().take(PREVIEW_CHARS).collect(),
        first_seen: now,
        last_seen: now,
        times_seen: 1,
        relevance_score: scored.score,
        is_golden: scored.is_golden,
    }
}
