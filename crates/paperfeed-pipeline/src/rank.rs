//! Combined ranking and golden selection.

use chrono::{DateTime, Utc};
use paperfeed_core::ScoredPaper;

use crate::config::{RecencyTier, ScoringConfig};

pub struct Ranker {
    recency_tiers: Vec<RecencyTier>,
    source_bonuses: Vec<(String, f64)>,
}

impl Ranker {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            recency_tiers: config.recency_tiers.clone(),
            source_bonuses: config
                .source_bonuses
                .iter()
                .map(|(source, bonus)| (source.clone(), *bonus))
                .collect(),
        }
    }

    fn recency_bonus(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - published).num_days();
        self.recency_tiers
            .iter()
            .find(|tier| age_days < tier.max_days)
            .map(|tier| tier.bonus)
            .unwrap_or(0.0)
    }

    fn source_bonus(&self, source: &str) -> f64 {
        self.source_bonuses
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(0.0)
    }

    /// Relevance plus quality plus recency and source bonuses. Computed
    /// from stored fields so a merged batch re-ranks identically.
    pub fn combined_score(&self, paper: &ScoredPaper, now: DateTime<Utc>) -> f64 {
        paper.score
            + paper.quality_score.unwrap_or(0.0)
            + self.recency_bonus(paper.paper.published, now)
            + self.source_bonus(&paper.paper.source)
    }

    /// Stable descending sort by combined score, then golden assignment:
    /// the top `ceil(5% of N)` of the batch.
    pub fn rank(&self, mut papers: Vec<ScoredPaper>, now: DateTime<Utc>) -> Vec<ScoredPaper> {
        papers.sort_by(|a, b| {
            self.combined_score(b, now)
                .total_cmp(&self.combined_score(a, now))
        });
        let golden = golden_count(papers.len());
        for (i, paper) in papers.iter_mut().enumerate() {
            paper.is_golden = i < golden;
        }
        papers
    }
}

pub fn golden_count(batch_size: usize) -> usize {
    (batch_size as f64 * 0.05).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityWeights;
    use chrono::Duration;
    use paperfeed_core::RawPaper;
    use std::collections::BTreeMap;

    fn ranker() -> Ranker {
        Ranker {
            recency_tiers: vec![
                RecencyTier { max_days: 7, bonus: 5.0 },
                RecencyTier { max_days: 30, bonus: 3.0 },
                RecencyTier { max_days: 90, bonus: 1.0 },
            ],
            source_bonuses: vec![("arxiv".to_string(), 1.0)],
        }
    }

    fn scored(title: &str, score: f64, age_days: i64, source: &str) -> ScoredPaper {
        ScoredPaper {
            paper: RawPaper {
                title: title.to_string(),
                abstract_text: String::new(),
                authors: Vec::new(),
                published: Utc::now() - Duration::days(age_days),
                url: format!("https://example.org/{title}"),
                pdf_url: String::new(),
                source: source.to_string(),
                topics: Vec::new(),
                categories: Vec::new(),
                primary_category: None,
                citations: None,
            },
            score,
            base_score: score,
            multiplier: 1.0,
            matched_categories: Vec::new(),
            category_count: 0,
            tags: Vec::new(),
            matched_keywords: BTreeMap::new(),
            is_golden: false,
            quality_score: Some(0.0),
        }
    }

    #[test]
    fn recency_tiers_decay_with_age() {
        let r = ranker();
        let now = Utc::now();
        assert_eq!(r.recency_bonus(now - Duration::days(2), now), 5.0);
        assert_eq!(r.recency_bonus(now - Duration::days(20), now), 3.0);
        assert_eq!(r.recency_bonus(now - Duration::days(60), now), 1.0);
        assert_eq!(r.recency_bonus(now - Duration::days(120), now), 0.0);
    }

    #[test]
    fn fresher_paper_outranks_equal_relevance() {
        let r = ranker();
        let ranked = r.rank(
            vec![
                scored("old", 10.0, 60, "biorxiv"),
                scored("new", 10.0, 2, "biorxiv"),
            ],
            Utc::now(),
        );
        assert_eq!(ranked[0].paper.title, "new");
    }

    #[test]
    fn preferred_source_breaks_ties() {
        let r = ranker();
        let ranked = r.rank(
            vec![
                scored("elsewhere", 10.0, 2, "biorxiv"),
                scored("preferred", 10.0, 2, "arxiv"),
            ],
            Utc::now(),
        );
        assert_eq!(ranked[0].paper.title, "preferred");
    }

    #[test]
    fn golden_is_exactly_the_ceil_five_percent_prefix() {
        assert_eq!(golden_count(0), 0);
        assert_eq!(golden_count(1), 1);
        assert_eq!(golden_count(20), 1);
        assert_eq!(golden_count(21), 2);
        assert_eq!(golden_count(100), 5);

        let r = ranker();
        let batch: Vec<_> = (0..40)
            .map(|i| scored(&format!("p{i}"), i as f64, 2, "biorxiv"))
            .collect();
        let ranked = r.rank(batch, Utc::now());
        let golden: Vec<_> = ranked.iter().filter(|p| p.is_golden).collect();
        assert_eq!(golden.len(), 2);
        assert!(ranked[0].is_golden && ranked[1].is_golden);
        assert!(!ranked[2].is_golden);
    }

    #[test]
    fn sort_is_stable_for_equal_scores() {
        let r = ranker();
        let ranked = r.rank(
            vec![
                scored("first", 5.0, 2, "biorxiv"),
                scored("second", 5.0, 2, "biorxiv"),
            ],
            Utc::now(),
        );
        assert_eq!(ranked[0].paper.title, "first");
        assert_eq!(ranked[1].paper.title, "second");
    }

    #[test]
    fn builds_from_a_scoring_config() {
        let config = ScoringConfig {
            version: 1,
            multipliers: vec![1.0],
            recency_tiers: vec![RecencyTier { max_days: 7, bonus: 5.0 }],
            source_bonuses: BTreeMap::from([("arxiv".to_string(), 1.0)]),
            quality: QualityWeights {
                citation_weight: 2.0,
                citation_cap: 8.0,
                influential_weight: 3.0,
                influential_cap: 6.0,
                prestige_bonus: 2.0,
                social_bonus: 3.0,
                prestige_venues: Vec::new(),
                social_sources: Vec::new(),
            },
            categories: Vec::new(),
        };
        let r = Ranker::new(&config);
        assert_eq!(r.source_bonus("arxiv"), 1.0);
        assert_eq!(r.source_bonus("biorxiv"), 0.0);
    }
}
