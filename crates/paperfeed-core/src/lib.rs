//! Core domain model for the paper discovery pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "paperfeed-core";

/// Citation metadata attached by the enrichment step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationData {
    pub citation_count: u64,
    pub influential_citation_count: u64,
    #[serde(default)]
    pub venue: String,
}

/// A just-fetched, unscored candidate record from one source.
///
/// `url` is the stable identity: two papers with the same url, or whose
/// normalized-title keys collide, are the same logical paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPaper {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub published: DateTime<Utc>,
    pub url: String,
    pub pdf_url: String,
    pub source: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<CitationData>,
}

impl RawPaper {
    /// Lowercased title+abstract, the text every scorer matches against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text).to_lowercase()
    }

    pub fn title_key(&self) -> String {
        title_key(&self.title)
    }
}

/// A [`RawPaper`] plus relevance/quality/rank metadata for one run.
///
/// `is_golden` is a property of the ranked batch the paper appeared in,
/// not an intrinsic trait; it is recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPaper {
    #[serde(flatten)]
    pub paper: RawPaper,
    pub score: f64,
    pub base_score: f64,
    pub multiplier: f64,
    pub matched_categories: Vec<String>,
    pub category_count: usize,
    pub tags: Vec<String>,
    #[serde(default)]
    pub matched_keywords: BTreeMap<String, Vec<String>>,
    pub is_golden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

/// Permanent, cumulative record of a paper across every run it was seen in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub id: String,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub simplified_title: String,
    pub authors: Vec<String>,
    pub published: DateTime<Utc>,
    pub source: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub matched_categories: Vec<String>,
    pub url: String,
    pub pdf_url: String,
    pub abstract_preview: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub times_seen: u64,
    pub relevance_score: f64,
    pub is_golden: bool,
}

/// The rank-ordered display set, fully replaced on every orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredLatestSet {
    pub papers: Vec<ScoredPaper>,
    pub updated: Option<DateTime<Utc>>,
    /// Total candidates before truncation to the display cap.
    pub count: usize,
}

/// One identity in the anti-repeat ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShownPaper {
    pub url: String,
    pub title: String,
}

/// Rolling "recently shown" ledger; expires from the store after 24 hours,
/// which is what makes the anti-repeat window self-heal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentlyShownLedger {
    pub papers: Vec<ShownPaper>,
    pub updated: Option<DateTime<Utc>>,
}

/// Strip markup, decode the five common named entities, and collapse
/// whitespace runs. Applied to every title and abstract before anything
/// downstream sees them.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    let decoded = out
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deduplication key: lowercase title truncated to its first 50 characters.
/// Titles are distinctive enough in that prefix; full-url identity is
/// layered on top in the archive.
pub fn title_key(title: &str) -> String {
    title.to_lowercase().chars().take(50).collect()
}

/// Length-capped title with special characters removed, used for archive
/// display and text search.
pub fn simplified_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .take(150)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Pull a DOI out of a paper url when one is embedded (doi.org links and
/// bioRxiv content paths carry them; arXiv papers have none).
pub fn extract_doi(url: &str) -> Option<String> {
    if let Some(rest) = url.split("doi.org/").nth(1) {
        let doi: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || "./()-_".contains(*c))
            .collect();
        if !doi.is_empty() {
            return Some(doi);
        }
    }
    // bioRxiv-style: .../content/10.1101/2024.01.02.573912v1
    let idx = url.find("/10.")?;
    let tail = &url[idx + 1..];
    let doi: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '/')
        .collect();
    let doi = doi.trim_end_matches(['.', '/']);
    if doi.contains('/') {
        Some(doi.to_string())
    } else {
        None
    }
}

/// Extract the numeric arXiv id from an abs/pdf url, without any version
/// suffix.
pub fn extract_arxiv_id(url: &str) -> Option<String> {
    let rest = url
        .split("arxiv.org/abs/")
        .nth(1)
        .or_else(|| url.split("arxiv.org/pdf/").nth(1))?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let id = id.trim_end_matches('.');
    if id.contains('.') {
        Some(id.to_string())
    } else {
        None
    }
}
