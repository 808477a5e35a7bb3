//! Shared-link adapter: newsletters, lab blogs, and other social feeds
//! that mention papers rather than publish them.
//!
//! Each feed item is scanned for embedded paper urls. arXiv links are
//! hydrated into full records through the id lookup endpoint; bioRxiv
//! links become stub records, since bioRxiv offers no per-paper metadata
//! endpoint we can hit from a feed scan. Everything else is dropped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use paperfeed_core::{extract_arxiv_id, RawPaper};
use paperfeed_storage::HttpFetcher;
use tracing::{debug, warn};

use crate::feedtext::{blocks, scan_paper_urls, tag_text};
use crate::{arxiv, rss, FeedAdapter};

pub const BIORXIV_STUB_TITLE: &str = "Paper from bioRxiv";

pub struct LinkScanAdapter {
    source: String,
    urls: Vec<String>,
    topics: Vec<String>,
    delay: std::time::Duration,
    arxiv_api_url: String,
}

impl LinkScanAdapter {
    pub fn new(
        source: impl Into<String>,
        urls: Vec<String>,
        topics: Vec<String>,
        delay: std::time::Duration,
    ) -> Self {
        Self {
            source: source.into(),
            urls,
            topics,
            delay,
            arxiv_api_url: arxiv::DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_arxiv_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.arxiv_api_url = api_url.into();
        self
    }

    async fn resolve(&self, http: &HttpFetcher, url: &str) -> Option<RawPaper> {
        if let Some(id) = extract_arxiv_id(url) {
            let mut paper = arxiv::lookup_by_id(http, &self.arxiv_api_url, &id).await?;
            paper.source = self.source.clone();
            paper.topics = self.topics.clone();
            paper.topics.push("shared".to_string());
            return Some(paper);
        }
        if url.contains("biorxiv.org/content/") {
            return Some(biorxiv_stub(url, &self.source, &self.topics));
        }
        None
    }
}

#[async_trait::async_trait]
impl FeedAdapter for LinkScanAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    async fn fetch(&self, http: &HttpFetcher, date_after: Option<DateTime<Utc>>) -> Vec<RawPaper> {
        let mut seen_urls = HashSet::new();
        let mut papers = Vec::new();
        for (i, feed_url) in self.urls.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            let xml = match http.fetch_text(&self.source, feed_url).await {
                Ok(xml) => xml,
                Err(err) => {
                    warn!(source = %self.source, feed_url, %err, "feed fetch failed, skipping");
                    continue;
                }
            };
            let links = scan_feed_links(&xml, date_after);
            debug!(source = %self.source, feed_url, count = links.len(), "paper links found");
            for link in links {
                if !seen_urls.insert(link.clone()) {
                    continue;
                }
                if let Some(paper) = self.resolve(http, &link).await {
                    papers.push(paper);
                }
            }
        }
        papers
    }
}

/// Paper urls mentioned by feed items within the date window, in document
/// order.
pub fn scan_feed_links(xml: &str, date_after: Option<DateTime<Utc>>) -> Vec<String> {
    let items = {
        let rss_items = blocks(xml, "item");
        if rss_items.is_empty() {
            blocks(xml, "entry")
        } else {
            rss_items
        }
    };
    let mut links = Vec::new();
    for item in items {
        if let Some(after) = date_after {
            if matches!(rss::parse_item_date(item), Some(ts) if ts < after) {
                continue;
            }
        }
        let title = tag_text(item, "title").unwrap_or_default();
        let body = tag_text(item, "description")
            .or_else(|| tag_text(item, "content"))
            .or_else(|| tag_text(item, "summary"))
            .unwrap_or_default();
        links.extend(scan_paper_urls(&format!("{title} {body}")));
    }
    links
}

fn biorxiv_stub(url: &str, source: &str, topics: &[String]) -> RawPaper {
    RawPaper {
        title: BIORXIV_STUB_TITLE.to_string(),
        abstract_text: String::new(),
        authors: Vec::new(),
        published: Utc::now(),
        url: url.to_string(),
        pdf_url: format!("{url}.full.pdf"),
        source: source.to_string(),
        topics: topics.to_vec(),
        categories: vec!["biorxiv".to_string()],
        primary_category: Some("biorxiv".to_string()),
        citations: None,
    }
}
