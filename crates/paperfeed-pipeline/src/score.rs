//! Multi-category relevance scoring.
//!
//! Every keyword is matched as a case-insensitive substring of title plus
//! abstract. Category subtotals sum matched weights; the final score is
//! the grand total times a multiplier that grows with the number of
//! categories hit, so cross-disciplinary papers outrank single-topic ones.

use std::collections::BTreeMap;

use paperfeed_core::{RawPaper, ScoredPaper};

use crate::config::ScoringConfig;

struct PreparedCategory {
    id: String,
    // (lowercased keyword, weight)
    keywords: Vec<(String, f64)>,
}

pub struct RelevanceScorer {
    multipliers: Vec<f64>,
    categories: Vec<PreparedCategory>,
}

impl RelevanceScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            multipliers: config.multipliers.clone(),
            categories: config
                .categories
                .iter()
                .map(|category| PreparedCategory {
                    id: category.id.clone(),
                    keywords: category
                        .keywords
                        .iter()
                        .map(|(kw, weight)| (kw.to_lowercase(), *weight))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Multiplier for a given active-category count; counts beyond the
    /// schedule saturate at its last entry. An empty schedule (config
    /// validation normally rejects one) falls back to a unit multiplier.
    pub fn multiplier_for(&self, category_count: usize) -> f64 {
        match self.multipliers.len() {
            0 => 1.0,
            len => self.multipliers[category_count.min(len - 1)],
        }
    }

    pub fn score(&self, paper: &RawPaper) -> ScoredPaper {
        let haystack = paper.search_text();

        let mut base_score = 0.0;
        let mut matched_categories = Vec::new();
        let mut matched_keywords = BTreeMap::new();

        for category in &self.categories {
            let mut subtotal = 0.0;
            let mut hits = Vec::new();
            for (keyword, weight) in &category.keywords {
                if haystack.contains(keyword.as_str()) {
                    subtotal += weight;
                    hits.push(keyword.clone());
                }
            }
            if subtotal > 0.0 {
                base_score += subtotal;
                matched_categories.push(category.id.clone());
                matched_keywords.insert(category.id.clone(), hits);
            }
        }

        let category_count = matched_categories.len();
        let multiplier = self.multiplier_for(category_count);

        ScoredPaper {
            score: base_score * multiplier,
            base_score,
            multiplier,
            matched_categories,
            category_count,
            tags: paper.topics.clone(),
            matched_keywords,
            is_golden: false,
            quality_score: None,
            paper: paper.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InterestCategory, QualityWeights, ScoringConfig};
    use chrono::Utc;

    fn paper(title: &str, abstract_text: &str) -> RawPaper {
        RawPaper {
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            authors: Vec::new(),
            published: Utc::now(),
            url: "https://example.org/p".to_string(),
            pdf_url: "https://example.org/p.pdf".to_string(),
            source: "arxiv".to_string(),
            topics: vec!["hdc".to_string()],
            categories: Vec::new(),
            primary_category: None,
            citations: None,
        }
    }

    fn category(id: &str, keywords: &[(&str, f64)]) -> InterestCategory {
        InterestCategory {
            id: id.to_string(),
            name: id.to_string(),
            keywords: keywords
                .iter()
                .map(|(kw, w)| (kw.to_string(), *w))
                .collect(),
        }
    }

    fn config(categories: Vec<InterestCategory>) -> ScoringConfig {
        ScoringConfig {
            version: 1,
            multipliers: vec![1.0, 1.0, 1.5, 2.0, 3.0, 5.0],
            recency_tiers: Vec::new(),
            source_bonuses: Default::default(),
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
            categories,
        }
    }

    #[test]
    fn keyword_matching_is_case_insensitive_over_title_and_abstract() {
        let scorer = RelevanceScorer::new(&config(vec![category(
            "privacy",
            &[("zero knowledge", 5.0), ("homomorphic encryption", 5.0)],
        )]));
        let scored = scorer.score(&paper(
            "Zero Knowledge proofs at scale",
            "We also touch on Homomorphic Encryption.",
        ));
        assert_eq!(scored.base_score, 10.0);
        assert_eq!(scored.matched_categories, vec!["privacy"]);
        assert_eq!(
            scored.matched_keywords["privacy"],
            vec!["homomorphic encryption", "zero knowledge"]
        );
    }

    #[test]
    fn three_active_categories_double_the_base_score() {
        let scorer = RelevanceScorer::new(&config(vec![
            category("a", &[("alpha", 4.0)]),
            category("b", &[("beta", 4.0)]),
            category("c", &[("gamma", 4.0)]),
        ]));
        let scored = scorer.score(&paper("alpha beta gamma", ""));
        assert_eq!(scored.base_score, 12.0);
        assert_eq!(scored.category_count, 3);
        assert_eq!(scored.multiplier, 2.0);
        assert_eq!(scored.score, 24.0);
    }

    #[test]
    fn score_is_monotone_in_category_count() {
        let scorer = RelevanceScorer::new(&config(vec![
            category("a", &[("alpha", 4.0)]),
            category("b", &[("beta", 4.0)]),
            category("c", &[("gamma", 4.0)]),
            category("d", &[("delta", 4.0)]),
        ]));
        let mut text = String::new();
        let mut last = -1.0;
        for word in ["alpha", "beta", "gamma", "delta"] {
            text.push_str(word);
            text.push(' ');
            let scored = scorer.score(&paper(&text, ""));
            assert!(scored.score > last, "score must grow with each category");
            last = scored.score;
        }
    }

    #[test]
    fn category_count_beyond_schedule_saturates() {
        let scorer = RelevanceScorer::new(&config(vec![category("a", &[("x", 1.0)])]));
        assert_eq!(scorer.multiplier_for(99), 5.0);
    }

    #[test]
    fn empty_multiplier_schedule_falls_back_to_unit() {
        let mut cfg = config(vec![category("a", &[("x", 2.0)])]);
        cfg.multipliers = Vec::new();
        let scorer = RelevanceScorer::new(&cfg);
        assert_eq!(scorer.multiplier_for(0), 1.0);
        assert_eq!(scorer.multiplier_for(3), 1.0);
        let scored = scorer.score(&paper("x marks the spot", ""));
        assert_eq!(scored.score, 2.0);
        assert_eq!(scored.multiplier, 1.0);
    }

    #[test]
    fn unmatched_paper_scores_zero_with_unit_multiplier() {
        let scorer = RelevanceScorer::new(&config(vec![category("a", &[("quantum", 3.0)])]));
        let scored = scorer.score(&paper("Unrelated gardening tips", "soil"));
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.multiplier, 1.0);
        assert!(scored.matched_categories.is_empty());
    }

    #[test]
    fn tags_carry_the_source_topics() {
        let scorer = RelevanceScorer::new(&config(vec![category("a", &[("x", 1.0)])]));
        assert_eq!(scorer.score(&paper("x", "")).tags, vec!["hdc"]);
    }
}
