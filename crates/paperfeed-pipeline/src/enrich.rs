//! Citation enrichment via the Semantic Scholar graph search.
//!
//! Enrichment is best-effort: a failed or empty lookup leaves the paper
//! without citation data, and the quality scorer treats that as zeros.

use std::time::Duration;

use async_trait::async_trait;
use paperfeed_adapters::feedtext::url_encode;
use paperfeed_core::{CitationData, RawPaper};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

#[async_trait]
pub trait CitationProvider: Send + Sync {
    async fn lookup(&self, title: &str) -> Option<CitationData>;
}

/// Provider used when enrichment is disabled.
pub struct NoEnrichment;

#[async_trait]
impl CitationProvider for NoEnrichment {
    async fn lookup(&self, _title: &str) -> Option<CitationData> {
        None
    }
}

pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .user_agent("paperfeed/0.1")
            .build()?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[async_trait]
impl CitationProvider for SemanticScholarClient {
    async fn lookup(&self, title: &str) -> Option<CitationData> {
        let url = format!(
            "{}?query={}&fields=citationCount,influentialCitationCount,venue&limit=1",
            self.api_url,
            url_encode(title)
        );
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = match request.send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(title, status = %resp.status(), "citation lookup rejected");
                return None;
            }
            Err(err) => {
                warn!(title, %err, "citation lookup failed");
                return None;
            }
        };
        let body: Value = response.json().await.ok()?;
        parse_search_response(&body)
    }
}

/// First hit of a graph search response, if any.
pub fn parse_search_response(body: &Value) -> Option<CitationData> {
    let hit = body.get("data")?.as_array()?.first()?;
    Some(CitationData {
        citation_count: hit.get("citationCount").and_then(Value::as_u64).unwrap_or(0),
        influential_citation_count: hit
            .get("influentialCitationCount")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        venue: hit
            .get("venue")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Enrich each paper in place, pausing between lookups.
pub async fn enrich_papers(
    provider: &dyn CitationProvider,
    papers: &mut [RawPaper],
    delay: Duration,
) {
    for (i, paper) in papers.iter_mut().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        paper.citations = provider.lookup(&paper.title).await;
    }
}
