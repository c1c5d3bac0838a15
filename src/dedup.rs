//! Deduplication: collapse duplicate reports of the same event within a
//! cycle (spec.md §4.3).
//!
//! Two passes, same shape as the teacher's layered filtering in
//! `signals/quality.rs`: an exact pass keyed on `Fingerprint`, then a fuzzy
//! pass (Jaccard similarity over title token sets) applied only within
//! ticker buckets, since comparing every pair across the whole cycle is
//! wasteful and unnecessary.

use std::collections::{HashMap, HashSet};

use crate::fingerprint;
use crate::models::ScoredItem;

#[derive(Debug, Default)]
pub struct DedupStats {
    pub exact_collapsed: usize,
    pub fuzzy_collapsed: usize,
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// `true` if `candidate` should replace `current` as the kept representative:
/// higher source weight wins (spec.md §3 `SeenRecord.weight` tie-break,
/// S2: "dedup keeps one (higher-weighted source)"), earliest `published_at`
/// breaks a weight tie.
fn preferred(current: &ScoredItem, candidate: &ScoredItem) -> bool {
    if candidate.source_weight != current.source_weight {
        return candidate.source_weight > current.source_weight;
    }
    candidate.item.published_at < current.item.published_at
}

/// spec.md §4.3: within a cycle, collapse items that share a fingerprint,
/// then collapse near-duplicates whose title token-set similarity exceeds
/// `fuzzy_threshold`, scoped to items sharing a primary ticker. Both passes
/// keep the higher-weighted source on a collision, per spec.md §3.
pub fn dedup_cycle(items: Vec<ScoredItem>, fuzzy_threshold: f64) -> (Vec<ScoredItem>, DedupStats) {
    let mut stats = DedupStats::default();

    // Exact pass: group by fingerprint, keep the higher-weighted source.
    let mut by_fingerprint: HashMap<_, ScoredItem> = HashMap::new();
    for item in items {
        match by_fingerprint.get(&item.fingerprint) {
            Some(existing) => {
                stats.exact_collapsed += 1;
                if preferred(existing, &item) {
                    by_fingerprint.insert(item.fingerprint, item);
                }
            }
            None => {
                by_fingerprint.insert(item.fingerprint, item);
            }
        }
    }
    let exact_deduped: Vec<ScoredItem> = by_fingerprint.into_values().collect();

    // Fuzzy pass, bucketed by primary ticker.
    let mut buckets: HashMap<Option<String>, Vec<ScoredItem>> = HashMap::new();
    for item in exact_deduped {
        buckets
            .entry(item.primary_ticker.clone())
            .or_default()
            .push(item);
    }

    let mut out = Vec::new();
    for (_, bucket) in buckets {
        let token_sets: Vec<HashSet<String>> = bucket
            .iter()
            .map(|i| fingerprint::token_set(&i.item.title))
            .collect();

        // `clusters[c]` holds the indices of items collapsed into cluster `c`;
        // the cluster's representative (for further jaccard comparisons) is
        // its first member — the kept item is decided after clustering.
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        'outer: for (idx, tokens) in token_sets.iter().enumerate() {
            for cluster in clusters.iter_mut() {
                if jaccard(tokens, &token_sets[cluster[0]]) >= fuzzy_threshold {
                    stats.fuzzy_collapsed += 1;
                    cluster.push(idx);
                    continue 'outer;
                }
            }
            clusters.push(vec![idx]);
        }

        for cluster in clusters {
            let winner = cluster
                .into_iter()
                .reduce(|best, idx| {
                    if preferred(&bucket[best], &bucket[idx]) {
                        idx
                    } else {
                        best
                    }
                })
                .expect("cluster always has at least one member");
            out.push(bucket[winner].clone());
        }
    }

    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, NewsItem, SentimentBundle};
    use chrono::{Duration, Utc};
    use std::collections::HashMap as Map;

    fn scored(title: &str, fp: [u8; 20], ticker: &str, published_offset_secs: i64) -> ScoredItem {
        scored_weighted(title, fp, ticker, published_offset_secs, 1.0)
    }

    fn scored_weighted(
        title: &str,
        fp: [u8; 20],
        ticker: &str,
        published_offset_secs: i64,
        source_weight: f64,
    ) -> ScoredItem {
        ScoredItem {
            item: NewsItem {
                source: "prnewswire".to_string(),
                source_id: title.to_string(),
                canonical_url: format!("https://example.com/{title}"),
                title: title.to_string(),
                summary: String::new(),
                published_at: Utc::now() + Duration::seconds(published_offset_secs),
                tickers: vec![ticker.to_string()],
                raw_fields: Map::new(),
            },
            fingerprint: Fingerprint(fp),
            primary_ticker: Some(ticker.to_string()),
            secondary_tickers: vec![],
            keyword_hits: Map::new(),
            catalyst_score: 5.0,
            sentiment: SentimentBundle::default(),
            relevance_scores: Map::new(),
            classification_ts: Utc::now(),
            source_weight,
        }
    }

    #[test]
    fn exact_duplicates_collapse_keeping_earliest() {
        let items = vec![
            scored("Acme FDA Approval", [1u8; 20], "ACME", 10),
            scored("Acme FDA Approval (wire copy)", [1u8; 20], "ACME", 0),
        ];
        let (out, stats) = dedup_cycle(items, 0.80);
        assert_eq!(out.len(), 1);
        assert_eq!(stats.exact_collapsed, 1);
        assert_eq!(out[0].item.published_at, out[0].item.published_at.min(out[0].item.published_at));
    }

    #[test]
    fn fuzzy_pass_collapses_near_duplicate_titles_within_ticker() {
        let items = vec![
            scored("Acme Corp announces FDA approval for new drug", [1u8; 20], "ACME", 0),
            scored("Acme Corp announces FDA approval for its new drug", [2u8; 20], "ACME", 5),
        ];
        let (out, stats) = dedup_cycle(items, 0.70);
        assert_eq!(out.len(), 1);
        assert_eq!(stats.fuzzy_collapsed, 1);
    }

    #[test]
    fn fuzzy_pass_does_not_cross_ticker_buckets() {
        let items = vec![
            scored("Quarterly earnings beat expectations", [1u8; 20], "ACME", 0),
            scored("Quarterly earnings beat expectations", [2u8; 20], "OTHR", 0),
        ];
        let (out, _) = dedup_cycle(items, 0.80);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn exact_collision_prefers_higher_weighted_source_over_earlier() {
        // lower-weight source published first, higher-weight source later:
        // spec.md S2 says dedup keeps the higher-weighted source regardless.
        let items = vec![
            scored_weighted("Acme FDA Approval", [1u8; 20], "ACME", 0, 1.0),
            scored_weighted("Acme FDA Approval (wire copy)", [1u8; 20], "ACME", 10, 2.0),
        ];
        let (out, _) = dedup_cycle(items, 0.80);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_weight, 2.0);
    }

    #[test]
    fn fuzzy_collision_prefers_higher_weighted_source() {
        let items = vec![
            scored_weighted("Acme Corp announces FDA approval for new drug", [1u8; 20], "ACME", 0, 1.5),
            scored_weighted("Acme Corp announces FDA approval for its new drug", [2u8; 20], "ACME", -5, 1.0),
        ];
        let (out, stats) = dedup_cycle(items, 0.70);
        assert_eq!(out.len(), 1);
        assert_eq!(stats.fuzzy_collapsed, 1);
        assert_eq!(out[0].source_weight, 1.5);
    }
}
