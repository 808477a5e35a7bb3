//! Feed adapters: every way a paper candidate enters the pipeline.
//!
//! Each adapter owns one source tag and knows how to turn that source's
//! feed format into [`RawPaper`] records. Adapters never fail a run: a
//! broken feed logs a warning and contributes nothing.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperfeed_core::RawPaper;
use paperfeed_storage::HttpFetcher;
use serde::Deserialize;

pub mod arxiv;
pub mod feedtext;
pub mod linkscan;
pub mod osf;
pub mod rss;

pub use arxiv::ArxivAdapter;
pub use linkscan::LinkScanAdapter;
pub use osf::OsfAdapter;
pub use rss::RssFeedAdapter;

/// One source of paper candidates.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Source tag stamped onto every paper this adapter emits.
    fn source(&self) -> &str;

    /// Fetch and normalize the current batch. `date_after` bounds how far
    /// back the adapter looks; `None` means no cutoff. Failures inside one
    /// feed or topic are absorbed so the rest still contribute.
    async fn fetch(&self, http: &HttpFetcher, date_after: Option<DateTime<Utc>>) -> Vec<RawPaper>;
}

/// One arXiv search query and the interest tag its results carry.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicQuery {
    pub query: String,
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArxivSection {
    pub max_results: usize,
    pub queries: Vec<TopicQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RssSection {
    pub source: String,
    pub topics: Vec<String>,
    pub max_items: usize,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsfSection {
    pub source: String,
    pub provider: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default = "default_osf_page_size")]
    pub page_size: usize,
}

fn default_osf_page_size() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterSection {
    pub source: String,
    pub topics: Vec<String>,
    pub urls: Vec<String>,
}

/// One worker profile: which sources it polls and when.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub sources: Vec<String>,
    pub cron: String,
}

/// Deserialized form of the feed registry file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub version: u32,
    #[serde(default)]
    pub arxiv: Option<ArxivSection>,
    #[serde(default)]
    pub rss: Vec<RssSection>,
    #[serde(default)]
    pub osf: Vec<OsfSection>,
    #[serde(default)]
    pub newsletters: Vec<NewsletterSection>,
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl SourceRegistry {
    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.get(name)
    }
}

/// Instantiate the adapters a profile names, in registry order. Unknown
/// source names in the profile are ignored; a registry section the profile
/// does not name is skipped.
pub fn build_adapters(
    registry: &SourceRegistry,
    profile: &ProfileConfig,
    politeness_delay: Duration,
) -> Vec<Box<dyn FeedAdapter>> {
    let wants = |source: &str| profile.sources.iter().any(|s| s == source);

    let mut adapters: Vec<Box<dyn FeedAdapter>> = Vec::new();
    if let Some(section) = &registry.arxiv {
        if wants("arxiv") {
            adapters.push(Box::new(ArxivAdapter::new(
                section.queries.clone(),
                section.max_results,
                politeness_delay,
            )));
        }
    }
    for section in &registry.rss {
        if wants(&section.source) {
            adapters.push(Box::new(RssFeedAdapter::new(
                section.source.clone(),
                section.urls.clone(),
                section.topics.clone(),
                section.max_items,
                politeness_delay,
            )));
        }
    }
    for section in &registry.osf {
        if wants(&section.source) {
            adapters.push(Box::new(OsfAdapter::new(
                section.source.clone(),
                section.provider.clone(),
                section.topics.clone(),
                section.allowlist.clone(),
                section.page_size,
            )));
        }
    }
    for section in &registry.newsletters {
        if wants(&section.source) {
            adapters.push(Box::new(LinkScanAdapter::new(
                section.source.clone(),
                section.urls.clone(),
                section.topics.clone(),
                politeness_delay,
            )));
        }
    }
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry {
            version: 1,
            arxiv: Some(ArxivSection {
                max_results: 3,
                queries: vec![TopicQuery {
                    query: "hyperdimensional computing".to_string(),
                    tag: "hdc".to_string(),
                }],
            }),
            rss: vec![RssSection {
                source: "biorxiv".to_string(),
                topics: vec!["genomics".to_string()],
                max_items: 3,
                urls: vec!["https://example.org/biorxiv.xml".to_string()],
            }],
            osf: vec![OsfSection {
                source: "chemrxiv".to_string(),
                provider: "chemrxiv".to_string(),
                topics: vec!["chemistry".to_string()],
                allowlist: vec!["DNA".to_string()],
                page_size: 20,
            }],
            newsletters: vec![NewsletterSection {
                source: "substack".to_string(),
                topics: vec!["ml-theory".to_string()],
                urls: vec!["https://example.org/feed.xml".to_string()],
            }],
            profiles: BTreeMap::from([
                (
                    "main".to_string(),
                    ProfileConfig {
                        sources: vec!["arxiv".to_string(), "biorxiv".to_string(), "chemrxiv".to_string()],
                        cron: "0 0 9 * * *".to_string(),
                    },
                ),
                (
                    "newsletters".to_string(),
                    ProfileConfig {
                        sources: vec!["substack".to_string()],
                        cron: "0 30 9 * * Mon".to_string(),
                    },
                ),
            ]),
        }
    }

    #[test]
    fn main_profile_builds_its_three_adapters() {
        let registry = registry();
        let profile = registry.profile("main").expect("main profile");
        let adapters = build_adapters(&registry, profile, Duration::ZERO);
        let sources: Vec<_> = adapters.iter().map(|a| a.source().to_string()).collect();
        assert_eq!(sources, vec!["arxiv", "biorxiv", "chemrxiv"]);
    }

    #[test]
    fn newsletter_profile_skips_unlisted_sources() {
        let registry = registry();
        let profile = registry.profile("newsletters").expect("profile");
        let adapters = build_adapters(&registry, profile, Duration::ZERO);
        let sources: Vec<_> = adapters.iter().map(|a| a.source().to_string()).collect();
        assert_eq!(sources, vec!["substack"]);
    }

    #[test]
    fn unknown_profile_is_none() {
        assert!(registry().profile("weekend").is_none());
    }
}
