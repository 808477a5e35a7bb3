//! Anti-repeat filter against the recently-shown ledger.

use std::collections::HashSet;

use paperfeed_core::{title_key, RawPaper, RecentlyShownLedger};

/// Remove papers already shown in the last day, matched by exact url or by
/// title key. A missing ledger (first run, or past its TTL) filters
/// nothing.
pub fn filter_recently_shown(
    papers: Vec<RawPaper>,
    ledger: Option<&RecentlyShownLedger>,
) -> Vec<RawPaper> {
    let Some(ledger) = ledger else {
        return papers;
    };
    let urls: HashSet<&str> = ledger.papers.iter().map(|p| p.url.as_str()).collect();
    let keys: HashSet<String> = ledger.papers.iter().map(|p| title_key(&p.title)).collect();
    papers
        .into_iter()
        .filter(|paper| {
            !urls.contains(paper.url.as_str()) && !keys.contains(&paper.title_key())
        })
        .collect()
}
