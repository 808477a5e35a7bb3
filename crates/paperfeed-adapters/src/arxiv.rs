//! arXiv Atom API adapter.

use chrono::{DateTime, Utc};
use paperfeed_core::{normalize_text, RawPaper};
use paperfeed_storage::HttpFetcher;
use tracing::{debug, warn};

use crate::feedtext::{attr_values, blocks, tag_text, tag_text_all, url_encode};
use crate::{FeedAdapter, TopicQuery};

pub const DEFAULT_API_URL: &str = "https://export.arxiv.org/api/query";

pub struct ArxivAdapter {
    api_url: String,
    queries: Vec<TopicQuery>,
    max_results: usize,
    delay: std::time::Duration,
}

impl ArxivAdapter {
    pub fn new(queries: Vec<TopicQuery>, max_results: usize, delay: std::time::Duration) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            queries,
            max_results,
            delay,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn query_url(&self, query: &str, date_after: Option<DateTime<Utc>>) -> String {
        let search = match date_after {
            Some(after) => format!(
                "all:\"{query}\" AND submittedDate:[{} TO *]",
                after.format("%Y%m%d%H%M")
            ),
            None => format!("all:\"{query}\""),
        };
        format!(
            "{}?search_query={}&sortBy=submittedDate&sortOrder=descending&max_results={}",
            self.api_url,
            url_encode(&search),
            self.max_results
        )
    }
}

#[async_trait::async_trait]
impl FeedAdapter for ArxivAdapter {
    fn source(&self) -> &str {
        "arxiv"
    }

    async fn fetch(&self, http: &HttpFetcher, date_after: Option<DateTime<Utc>>) -> Vec<RawPaper> {
        let mut papers = Vec::new();
        for (i, topic) in self.queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            let url = self.query_url(&topic.query, date_after);
            match http.fetch_text("arxiv", &url).await {
                Ok(xml) => {
                    let mut batch = parse_entries(&xml, &topic.tag);
                    if let Some(after) = date_after {
                        batch.retain(|p| p.published >= after);
                    }
                    debug!(query = %topic.query, count = batch.len(), "arxiv query parsed");
                    papers.append(&mut batch);
                }
                Err(err) => {
                    warn!(query = %topic.query, %err, "arxiv query failed, skipping");
                }
            }
        }
        papers
    }
}

/// Parse the `<entry>` elements of an arXiv Atom response into raw papers
/// tagged with `topic`. Entries missing a title or id are skipped.
pub fn parse_entries(xml: &str, topic: &str) -> Vec<RawPaper> {
    blocks(xml, "entry")
        .into_iter()
        .filter_map(|entry| parse_entry(entry, topic))
        .collect()
}

fn parse_entry(entry: &str, topic: &str) -> Option<RawPaper> {
    let title = normalize_text(&tag_text(entry, "title")?);
    let url = tag_text(entry, "id")?;
    if title.is_empty() || !url.starts_with("http") {
        return None;
    }
    let abstract_text = tag_text(entry, "summary")
        .map(|s| normalize_text(&s))
        .unwrap_or_default();
    let published = tag_text(entry, "published")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let categories = attr_values(entry, "category", "term");
    let primary_category = attr_values(entry, "arxiv:primary_category", "term")
        .into_iter()
        .next()
        .or_else(|| categories.first().cloned());
    let pdf_url = url.replace("/abs/", "/pdf/");

    Some(RawPaper {
        title,
        abstract_text,
        authors: tag_text_all(entry, "name"),
        published,
        url,
        pdf_url,
        source: "arxiv".to_string(),
        topics: vec![topic.to_string()],
        categories,
        primary_category,
        citations: None,
    })
}

/// Resolve one arXiv id into a full record via the id_list endpoint. Used
/// by the link-scanning adapters to hydrate shared arXiv links.
pub async fn lookup_by_id(http: &HttpFetcher, api_url: &str, id: &str) -> Option<RawPaper> {
    let url = format!("{api_url}?id_list={}&max_results=1", url_encode(id));
    match http.fetch_text("arxiv", &url).await {
        Ok(xml) => parse_entries(&xml, "shared").into_iter().next(),
        Err(err) => {
            warn!(id, %err, "arxiv id lookup failed");
            None
        }
    }
}
