//! OSF preprints adapter (chemRxiv, PsyArXiv, and any other OSF provider).
//!
//! OSF exposes a JSON listing per provider. These feeds are broad, so each
//! adapter carries a keyword allowlist and only papers mentioning at least
//! one allowlisted term pass through.

use chrono::{DateTime, Utc};
use paperfeed_core::{normalize_text, RawPaper};
use paperfeed_storage::HttpFetcher;
use serde_json::Value;
use tracing::{debug, warn};

use crate::FeedAdapter;

pub const DEFAULT_API_URL: &str = "https://api.osf.io/v2/preprints/";

pub struct OsfAdapter {
    source: String,
    provider: String,
    topics: Vec<String>,
    allowlist: Vec<String>,
    page_size: usize,
    api_url: String,
}

impl OsfAdapter {
    pub fn new(
        source: impl Into<String>,
        provider: impl Into<String>,
        topics: Vec<String>,
        allowlist: Vec<String>,
        page_size: usize,
    ) -> Self {
        Self {
            source: source.into(),
            provider: provider.into(),
            topics,
            allowlist: allowlist.into_iter().map(|t| t.to_lowercase()).collect(),
            page_size,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn listing_url(&self) -> String {
        format!(
            "{}?filter%5Bprovider%5D={}&sort=-date_created&page%5Bsize%5D={}",
            self.api_url, self.provider, self.page_size
        )
    }

    fn passes_allowlist(&self, paper: &RawPaper) -> bool {
        if self.allowlist.is_empty() {
            return true;
        }
        let haystack = paper.search_text();
        self.allowlist.iter().any(|term| haystack.contains(term))
    }
}

#[async_trait::async_trait]
impl FeedAdapter for OsfAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    async fn fetch(&self, http: &HttpFetcher, date_after: Option<DateTime<Utc>>) -> Vec<RawPaper> {
        let url = self.listing_url();
        let body = match http.fetch_text(&self.source, &url).await {
            Ok(body) => body,
            Err(err) => {
                warn!(source = %self.source, %err, "osf listing fetch failed");
                return Vec::new();
            }
        };
        let listing: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => {
                warn!(source = %self.source, %err, "osf listing is not valid json");
                return Vec::new();
            }
        };
        let papers: Vec<RawPaper> = parse_listing(&listing, &self.source, &self.topics)
            .into_iter()
            .filter(|p| date_after.is_none_or(|after| p.published >= after))
            .filter(|p| self.passes_allowlist(p))
            .collect();
        debug!(source = %self.source, count = papers.len(), "osf listing parsed");
        papers
    }
}

/// Pull papers out of an OSF v2 listing document. Records without a title
/// or html link are skipped.
pub fn parse_listing(listing: &Value, source: &str, topics: &[String]) -> Vec<RawPaper> {
    let Some(data) = listing.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|record| parse_record(record, source, topics))
        .collect()
}

fn parse_record(record: &Value, source: &str, topics: &[String]) -> Option<RawPaper> {
    let attrs = record.get("attributes")?;
    let title = normalize_text(attrs.get("title")?.as_str()?);
    if title.is_empty() {
        return None;
    }
    let url = record
        .get("links")
        .and_then(|l| l.get("html"))
        .and_then(Value::as_str)?
        .to_string();
    let abstract_text = attrs
        .get("description")
        .and_then(Value::as_str)
        .map(normalize_text)
        .unwrap_or_default();
    let published = attrs
        .get("date_created")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let pdf_url = record
        .get("links")
        .and_then(|l| l.get("preprint_doi"))
        .and_then(Value::as_str)
        .unwrap_or(&url)
        .to_string();

    Some(RawPaper {
        title,
        abstract_text,
        authors: Vec::new(),
        published,
        url,
        pdf_url,
        source: source.to_string(),
        topics: topics.to_vec(),
        categories: Vec::new(),
        primary_category: None,
        citations: None,
    })
}
