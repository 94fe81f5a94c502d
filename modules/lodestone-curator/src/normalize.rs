//! URL canonicalization and content fingerprinting.
//!
//! Pure functions producing the grouping keys the duplicate detector works
//! with. Normalized URLs and fingerprints are never written back to
//! records.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that vary per click, not per document.
const TRACKING_PARAMS: &[&str] = &["ref", "source", "fbclid", "gclid", "msclkid", "_ga"];

static RE_ARXIV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"arxiv\.org/(?:abs|pdf)/(\d+\.\d+)").unwrap());

/// Minimum content length worth fingerprinting; anything shorter produces
/// too many accidental collisions.
const MIN_FINGERPRINT_CHARS: usize = 50;

const MIN_TITLE_FINGERPRINT_CHARS: usize = 5;

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Word characters (ASCII alphanumerics and underscore) plus CJK ideographs.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Canonicalize a URL into a duplicate-grouping key.
///
/// Strips tracking query parameters, forces https, drops a single trailing
/// slash, and lowercases. arXiv abs/pdf URLs collapse to
/// `https://arxiv.org/abs/<id>`; GitHub URLs (outside `/blob/` paths)
/// collapse to the `owner/repo` root. Unparseable input falls back to the
/// lowercased raw string — this function never fails.
pub fn normalize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_lowercase();
    };

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    let _ = parsed.set_scheme("https");

    let mut normalized = parsed.to_string();
    if normalized.ends_with('/') {
        normalized.pop();
    }
    let normalized = normalized.to_lowercase();

    let host = parsed.host_str().unwrap_or("").to_lowercase();

    if host.contains("arxiv.org") {
        if let Some(caps) = RE_ARXIV_ID.captures(&normalized) {
            return format!("https://arxiv.org/abs/{}", &caps[1]);
        }
    }

    if host.contains("github.com") && !parsed.path().contains("/blob/") {
        let segments: Vec<&str> = parsed
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() >= 2 {
            return format!(
                "https://github.com/{}/{}",
                segments[0].to_lowercase(),
                segments[1].to_lowercase()
            );
        }
    }

    normalized
}

/// Order-independent content fingerprint: lowercase, keep word/CJK tokens
/// longer than 2 chars, sort, cap at 100 tokens, SHA-256, first 32 hex
/// chars. Content under 50 chars returns `""` (too unreliable to
/// fingerprint).
pub fn compute_fingerprint(content: &str) -> String {
    if content.chars().count() < MIN_FINGERPRINT_CHARS {
        return String::new();
    }

    let lowered = content.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if is_token_char(c) || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .collect();
    tokens.sort_unstable();

    let normalized = tokens
        .into_iter()
        .take(100)
        .collect::<Vec<_>>()
        .join(" ");

    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Exact-title fingerprint: cleaned title, SHA-256, first 16 hex chars.
/// Titles under 5 chars return `""`.
pub fn compute_title_fingerprint(title: &str) -> String {
    if title.chars().count() < MIN_TITLE_FINGERPRINT_CHARS {
        return String::new();
    }
    let normalized = clean_title(title);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Lowercase a title and drop everything that is not a word char,
/// whitespace, or CJK. Shared pre-clean for the title fingerprint and
/// title similarity.
pub fn clean_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|&c| is_token_char(c) || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
