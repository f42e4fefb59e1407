//! Similarity Engine — pure functions behind the deduplication core.
//!
//! No external state, no error conditions: malformed input degrades to the
//! minimum similarity instead of failing.

use url::Url;

/// Query parameters that carry tracking noise rather than job identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm", "fbclid", "gclid", "msclkid", "ref", "referrer", "source", "src", "trk", "mc_cid",
    "mc_eid", "igshid",
];

/// Legal-entity suffixes stripped before comparing company names.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "llp",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "ag",
    "plc",
    "sa",
    "srl",
    "bv",
    "pty",
    "pvt",
    "pte",
];

/// Reduces a URL to its canonical form: protocol and case differences are
/// ignored, default ports and trailing slashes dropped, tracking query
/// parameters removed. Two URLs are exact duplicates iff their canonical
/// forms are equal.
///
/// Unparseable input falls back to a lowercase, slash-trimmed comparison
/// rather than failing.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let parsed = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_lowercase().trim_end_matches('/').to_string(),
    };

    let mut canonical = parsed.host_str().unwrap_or_default().to_lowercase();
    if let Some(port) = parsed.port() {
        // Url::port() is None for the scheme default, so this only keeps
        // genuinely non-standard ports.
        canonical.push_str(&format!(":{port}"));
    }
    canonical.push_str(parsed.path().trim_end_matches('/'));

    let kept: Vec<String> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| {
            if value.is_empty() {
                key.into_owned()
            } else {
                format!("{key}={value}")
            }
        })
        .collect();

    if !kept.is_empty() {
        canonical.push('?');
        canonical.push_str(&kept.join("&"));
    }

    canonical
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalized edit-distance similarity over lower-cased, whitespace-collapsed
/// text. Returns a score in [0, 1]; empty input scores 0.0.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = collapse(a);
    let b = collapse(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}

/// Case/whitespace-insensitive company equality after removing legal-entity
/// suffixes. Empty input never matches.
pub fn company_match(a: &str, b: &str) -> bool {
    let a = normalize_company(a);
    let b = normalize_company(b);
    !a.is_empty() && a == b
}

fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_company(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if tokens.len() > 1 && LEGAL_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join(" ")
}
