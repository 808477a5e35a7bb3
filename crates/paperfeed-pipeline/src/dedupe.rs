//! Title-key deduplication.

use std::collections::HashSet;

use paperfeed_core::RawPaper;

/// Drop papers whose title key was already seen, keeping the first
/// occurrence. Order is otherwise preserved, so adapter priority (the
/// order sources are polled in) decides which copy survives.
pub fn dedupe(papers: Vec<RawPaper>) -> Vec<RawPaper> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|paper| seen.insert(paper.title_key()))
        .collect()
}
