//! Generic RSS/Atom adapter for preprint servers and journal feeds.
//!
//! One instance covers one source tag (biorxiv, medrxiv, a journal) and
//! polls that source's feed urls in sequence. Each feed failure is logged
//! and skipped; the other feeds still contribute.

use chrono::{DateTime, Utc};
use paperfeed_core::{normalize_text, RawPaper};
use paperfeed_storage::HttpFetcher;
use tracing::{debug, warn};

use crate::feedtext::{blocks, link_text, tag_text};
use crate::FeedAdapter;

pub struct RssFeedAdapter {
    source: String,
    urls: Vec<String>,
    topics: Vec<String>,
    max_items: usize,
    delay: std::time::Duration,
}

impl RssFeedAdapter {
    pub fn new(
        source: impl Into<String>,
        urls: Vec<String>,
        topics: Vec<String>,
        max_items: usize,
        delay: std::time::Duration,
    ) -> Self {
        Self {
            source: source.into(),
            urls,
            topics,
            max_items,
            delay,
        }
    }
}

#[async_trait::async_trait]
impl FeedAdapter for RssFeedAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    async fn fetch(&self, http: &HttpFetcher, date_after: Option<DateTime<Utc>>) -> Vec<RawPaper> {
        let mut papers = Vec::new();
        for (i, url) in self.urls.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            match http.fetch_text(&self.source, url).await {
                Ok(xml) => {
                    let batch: Vec<RawPaper> = parse_feed(&xml, &self.source, &self.topics)
                        .into_iter()
                        .filter(|p| date_after.is_none_or(|after| p.published >= after))
                        .take(self.max_items)
                        .collect();
                    debug!(source = %self.source, url, count = batch.len(), "feed parsed");
                    papers.extend(batch);
                }
                Err(err) => {
                    warn!(source = %self.source, url, %err, "feed fetch failed, skipping");
                }
            }
        }
        papers
    }
}

/// Parse RSS `<item>` or Atom `<entry>` elements, whichever the document
/// carries. Items without a title or link are skipped.
pub fn parse_feed(xml: &str, source: &str, topics: &[String]) -> Vec<RawPaper> {
    let items = {
        let rss = blocks(xml, "item");
        if rss.is_empty() {
            blocks(xml, "entry")
        } else {
            rss
        }
    };
    items
        .into_iter()
        .filter_map(|item| parse_item(item, source, topics))
        .collect()
}

fn parse_item(item: &str, source: &str, topics: &[String]) -> Option<RawPaper> {
    let title = normalize_text(&tag_text(item, "title")?);
    let url = link_text(item)?;
    if title.is_empty() {
        return None;
    }
    let abstract_text = tag_text(item, "description")
        .or_else(|| tag_text(item, "summary"))
        .or_else(|| tag_text(item, "content"))
        .map(|s| normalize_text(&s))
        .unwrap_or_default();
    let published = parse_item_date(item).unwrap_or_else(Utc::now);
    let authors = tag_text(item, "dc:creator")
        .map(|names| {
            names
                .split([',', ';'])
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(RawPaper {
        title,
        abstract_text,
        authors,
        published,
        pdf_url: url.clone(),
        url,
        source: source.to_string(),
        topics: topics.to_vec(),
        categories: Vec::new(),
        primary_category: None,
        citations: None,
    })
}

pub(crate) fn parse_item_date(item: &str) -> Option<DateTime<Utc>> {
    let raw = tag_text(item, "pubDate")
        .or_else(|| tag_text(item, "published"))
        .or_else(|| tag_text(item, "updated"))
        .or_else(|| tag_text(item, "dc:date"))?;
    DateTime::parse_from_rfc2822(&raw)
        .or_else(|_| DateTime::parse_from_rfc3339(&raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
