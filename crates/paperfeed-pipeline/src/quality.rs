//! Citation-and-heuristics quality score.
//!
//! Logarithmic citation terms keep runaway-citation papers from swamping
//! the batch; the remaining terms are cheap heuristics over metadata we
//! already have. Missing citation data contributes zero, never an error.

use paperfeed_core::RawPaper;

use crate::config::QualityWeights;

pub struct QualityScorer {
    weights: QualityWeights,
}

impl QualityScorer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, paper: &RawPaper) -> f64 {
        let w = &self.weights;
        let (citations, influential, venue) = match &paper.citations {
            Some(data) => (
                data.citation_count,
                data.influential_citation_count,
                data.venue.as_str(),
            ),
            None => (0, 0, ""),
        };

        let mut score = (((citations + 1) as f64).log10() * w.citation_weight).min(w.citation_cap);
        score +=
            (((influential + 1) as f64).log10() * w.influential_weight).min(w.influential_cap);

        score += match paper.authors.len() {
            3..=8 => 3.0,
            9..=15 => 2.0,
            n if n >= 2 => 1.0,
            _ => 0.0,
        };

        let abstract_len = paper.abstract_text.len();
        if (800..=3000).contains(&abstract_len) {
            score += 2.0;
        } else if abstract_len > 400 {
            score += 1.0;
        }

        let venue_lower = venue.to_lowercase();
        if !venue_lower.is_empty()
            && w.prestige_venues
                .iter()
                .any(|v| venue_lower.contains(&v.to_lowercase()))
        {
            score += w.prestige_bonus;
        }

        if w.social_sources.iter().any(|s| s == &paper.source) {
            score += w.social_bonus;
        }

        score
    }
}
