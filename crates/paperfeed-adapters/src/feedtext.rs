//! Tolerant pattern extraction over feed documents.
//!
//! Preprint feeds are inconsistent XML at best: bioRxiv wraps titles in
//! CDATA, lab blogs emit Atom, some journals ship RSS with namespaced
//! creator tags. Rather than a strict parser that rejects half the feeds,
//! these helpers scan for the shapes we actually need and skip anything
//! malformed. A bad item costs us one paper, never the run.

/// Every `<tag>...</tag>` body in the document, attributes on the opening
/// tag tolerated.
pub fn blocks<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open_exact = format!("<{tag}>");
    let open_attrs = format!("<{tag} ");
    let close = format!("</{tag}>");

    let mut out = Vec::new();
    let mut from = 0;
    while from < text.len() {
        let rest = &text[from..];
        let hit = match (rest.find(&open_exact), rest.find(&open_attrs)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let Some(start) = hit else { break };
        let abs = from + start;
        let Some(body_offset) = text[abs..].find('>') else { break };
        let body_start = abs + body_offset + 1;
        let Some(end) = text[body_start..].find(&close) else { break };
        out.push(&text[body_start..body_start + end]);
        from = body_start + end + close.len();
    }
    out
}

/// First `<tag>` body inside a block, preferring the CDATA form when both
/// shapes exist. Returns raw inner text; callers normalize.
pub fn tag_text(block: &str, tag: &str) -> Option<String> {
    let cdata_open = format!("<{tag}><![CDATA[");
    if let Some(start) = block.find(&cdata_open) {
        let body = &block[start + cdata_open.len()..];
        if let Some(end) = body.find("]]>") {
            return Some(body[..end].trim().to_string());
        }
    }
    let inner = blocks(block, tag).into_iter().next()?;
    let inner = inner
        .trim()
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(inner);
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// All `<tag>` bodies inside a block, e.g. the `<name>` elements of an
/// arXiv entry's authors.
pub fn tag_text_all(block: &str, tag: &str) -> Vec<String> {
    blocks(block, tag)
        .into_iter()
        .map(|inner| inner.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The link of a feed item: RSS puts it in element text, Atom in an href
/// attribute.
pub fn link_text(block: &str) -> Option<String> {
    if let Some(text) = tag_text(block, "link") {
        if text.starts_with("http") {
            return Some(text);
        }
    }
    attr_values(block, "link", "href").into_iter().next()
}

/// Every value of `attr` across all `<elem ...>` opening tags in the block.
pub fn attr_values(block: &str, elem: &str, attr: &str) -> Vec<String> {
    let open = format!("<{elem} ");
    let needle = format!("{attr}=\"");

    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = block[from..].find(&open) {
        let tag_start = from + pos;
        let Some(tag_len) = block[tag_start..].find('>') else { break };
        let tag = &block[tag_start..tag_start + tag_len];
        if let Some(vstart) = tag.find(&needle) {
            let value = &tag[vstart + needle.len()..];
            if let Some(vend) = value.find('"') {
                out.push(value[..vend].to_string());
            }
        }
        from = tag_start + tag_len + 1;
    }
    out
}

/// Percent-encode a query value for embedding in a fetch url.
pub fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// Recognized paper-link hosts and the character set each id continues with.
const URL_PATTERNS: &[&str] = &[
    "arxiv.org/abs/",
    "arxiv.org/pdf/",
    "biorxiv.org/content/",
    "doi.org/",
    "semanticscholar.org/paper/",
];

fn id_char(pattern: &str, c: char) -> bool {
    match pattern {
        "arxiv.org/abs/" | "arxiv.org/pdf/" => c.is_ascii_digit() || c == '.' || c == 'v',
        "semanticscholar.org/paper/" => c.is_ascii_alphanumeric() || c == '-' || c == '_',
        _ => c.is_ascii_alphanumeric() || "./-_()".contains(c),
    }
}

fn host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "./-:".contains(c)
}

/// Scan free text (newsletter bodies, shared-link posts) for embedded
/// paper urls. Order of first occurrence is kept; duplicates are dropped.
pub fn scan_paper_urls(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for pattern in URL_PATTERNS {
        let mut from = 0;
        while let Some(pos) = text[from..].find(pattern) {
            let abs = from + pos;
            let tail_start = abs + pattern.len();
            let tail: String = text[tail_start..]
                .chars()
                .take_while(|c| id_char(pattern, *c))
                .collect();
            let tail = tail.trim_end_matches(['.', ',']).to_string();
            from = tail_start;
            if tail.is_empty() {
                continue;
            }
            // Walk back over scheme and subdomain so www. prefixes survive.
            let mut start = abs;
            while let Some(prev) = text[..start].chars().next_back() {
                if host_char(prev) {
                    start -= prev.len_utf8();
                } else {
                    break;
                }
            }
            let prefix = &text[start..abs];
            let url = if prefix.contains("http") {
                format!("{prefix}{pattern}{tail}")
            } else {
                format!("https://{prefix}{pattern}{tail}")
            };
            found.push((abs, url));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = std::collections::HashSet::new();
    found
        .into_iter()
        .filter(|(_, url)| seen.insert(url.clone()))
        .map(|(_, url)| url)
        .collect()
}
