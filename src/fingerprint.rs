//! Fingerprinting: derive a stable identity for a news item regardless of
//! which source reported it (spec.md §3).
//!
//! SHA-1 is used purely as a fast, well-distributed content hash (not for
//! anything security-sensitive), the same role `sha2`/`hmac` play in the
//! teacher's signing code — `sha1` is the sibling crate in that family.

use sha1::{Digest, Sha1};

use crate::models::{Fingerprint, NewsItem};

/// Lowercases, strips punctuation runs to single spaces, and trims.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

/// Drops everything from the first `?` onward, so tracking params don't
/// split an otherwise-identical URL into two fingerprints.
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// spec.md §3: `sha1(source, source_id)` when `source_id` is non-empty,
/// else `sha1(normalize(title), canonical_url_without_query, accession_number_if_sec)`.
pub fn compute(item: &NewsItem) -> Fingerprint {
    let mut hasher = Sha1::new();

    if !item.source_id.is_empty() {
        hasher.update(item.source.as_bytes());
        hasher.update(b"|");
        hasher.update(item.source_id.as_bytes());
        return finish(hasher);
    }

    hasher.update(normalize(&item.title).as_bytes());
    hasher.update(b"|");
    hasher.update(strip_query(&item.canonical_url).as_bytes());
    if let Some(accession) = item.accession_number() {
        hasher.update(b"|");
        hasher.update(accession.as_bytes());
    }
    finish(hasher)
}

fn finish(hasher: Sha1) -> Fingerprint {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

/// Token set used by the fuzzy-similarity pass in `dedup` (spec.md §4.3).
pub fn token_set(text: &str) -> std::collections::HashSet<String> {
    normalize(text)
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}
