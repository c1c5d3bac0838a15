//! Core data model: spec.md §3, as plain serde structs.
//!
//! Follows the teacher's `models.rs` convention (plain structs +
//! `Serialize`/`Deserialize`, small helper methods) rather than anything
//! fancier — these types cross task boundaries and get persisted as JSON,
//! so they stay flat and cheap to clone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw field value from a feed source's wire format (spec.md §9:
/// "model dynamic-typed payload bags as a typed map of string -> variant").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawFieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

pub type RawFields = HashMap<String, RawFieldValue>;

/// Produced by a Feed Fetcher. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub source: String,
    pub source_id: String,
    pub canonical_url: String,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub tickers: Vec<String>,
    pub raw_fields: RawFields,
}

impl NewsItem {
    /// spec.md §3 invariant: at least one of `source_id`/`canonical_url` non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.source_id.is_empty() || !self.canonical_url.is_empty()
    }

    pub fn is_sec(&self) -> bool {
        self.source.starts_with("sec_")
    }

    pub fn accession_number(&self) -> Option<&str> {
        match self.raw_fields.get("accession_number") {
            Some(RawFieldValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Stable hash identifying a logical event regardless of source (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    pub fn to_hex(self) -> String {
        let mut s = String::with_capacity(40);
        for b in self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Persisted record of an already-alerted fingerprint (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenRecord {
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub source: String,
    pub weight: i32,
}

/// Per-source sentiment component, always in [-1, 1] with confidence in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SentimentScore {
    pub value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentBundle {
    pub local: Option<SentimentScore>,
    pub ml: Option<SentimentScore>,
    pub external: Option<SentimentScore>,
    pub premarket: Option<SentimentScore>,
    pub aggregate: Option<SentimentScore>,
}

/// Output of the Classifier + Sentiment Aggregator + Ticker Resolver for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: NewsItem,
    pub fingerprint: Fingerprint,
    pub primary_ticker: Option<String>,
    pub secondary_tickers: Vec<String>,
    pub keyword_hits: HashMap<String, f64>,
    pub catalyst_score: f64,
    pub sentiment: SentimentBundle,
    pub relevance_scores: HashMap<String, f64>,
    pub classification_ts: DateTime<Utc>,
    /// Source trust weight (spec.md §3 `SeenRecord.weight`); used to break
    /// dedup ties in favor of the higher-weighted feed.
    pub source_weight: f64,
}

impl ScoredItem {
    /// spec.md §3 invariant: score is clamp(sum(hits * weights), 0, 10).
    pub fn recompute_score(&mut self, dynamic_weights: &HashMap<String, f64>, default_weight: f64) {
        let sum: f64 = self
            .keyword_hits
            .keys()
            .map(|cat| dynamic_weights.get(cat).copied().unwrap_or(default_weight))
            .sum();
        self.catalyst_score = sum.clamp(0.0, 10.0);
    }
}

/// Per-ticker, per-cycle market-data snapshot (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub ticker: String,
    pub last_price: Option<f64>,
    pub change_pct: Option<f64>,
    pub avg_volume: Option<f64>,
    pub rvol_multiplier: Option<f64>,
    pub float_shares: Option<f64>,
    pub vwap: Option<f64>,
    pub as_of: Option<DateTime<Utc>>,
    pub sources_used: Vec<String>,
}

impl EnrichmentRecord {
    pub fn empty(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }
}

/// A rendered chat-platform embed field, matching the teacher's
/// `SignalDetails` style of explicit, stable-order fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub url: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Produced by the Formatter; `idempotency_key` is the fingerprint hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub ticker: String,
    pub title: String,
    pub link: String,
    pub content_text: String,
    pub embed: Embed,
    pub components: Option<serde_json::Value>,
    pub idempotency_key: String,
}

/// Read-only category -> weight map, reloaded at cycle start (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicWeights {
    pub weights: HashMap<String, f64>,
    pub default_weight: f64,
}

impl DynamicWeights {
    pub fn get(&self, category: &str) -> f64 {
        self.weights.get(category).copied().unwrap_or(self.default_weight)
    }
}

/// Per-cycle counters, reset at cycle start (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycle_id: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub fetched: u64,
    pub deduped: u64,
    pub skipped: HashMap<String, u64>,
    pub classified: u64,
    pub enriched: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub dropped_error: u64,
    pub cycle_duration_ms: u64,
}

impl CycleStats {
    pub fn new(cycle_id: u64) -> Self {
        Self {
            cycle_id,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn skip(&mut self, reason: &str) {
        *self.skipped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn is_empty_cycle(&self) -> bool {
        self.fetched == 0
    }

    /// spec.md §8 P6: fetched = alerts_sent + alerts_failed + sum(skipped) + dropped_error
    pub fn accounting_balances(&self) -> bool {
        let skipped_total: u64 = self.skipped.values().sum();
        self.fetched == self.alerts_sent + self.alerts_failed + skipped_total + self.dropped_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> NewsItem {
        NewsItem {
            source: "prnewswire".to_string(),
            source_id: "pr-123".to_string(),
            canonical_url: "https://example.com/a".to_string(),
            title: "Acme Corp Announces FDA Approval".to_string(),
            summary: "summary".to_string(),
            published_at: Utc::now(),
            tickers: vec!["ACME".to_string()],
            raw_fields: HashMap::new(),
        }
    }

    #[test]
    fn news_item_well_formed() {
        let mut item = sample_item();
        assert!(item.is_well_formed());
        item.source_id.clear();
        item.canonical_url.clear();
        assert!(!item.is_well_formed());
    }

    #[test]
    fn sec_source_detection() {
        let mut item = sample_item();
        item.source = "sec_8k".to_string();
        assert!(item.is_sec());
    }

    #[test]
    fn score_clamped_to_bounds() {
        let mut item = ScoredItem {
            item: sample_item(),
            fingerprint: Fingerprint([0u8; 20]),
            primary_ticker: Some("ACME".to_string()),
            secondary_tickers: vec![],
            keyword_hits: [("fda".to_string(), 1.0), ("m_and_a".to_string(), 1.0)]
                .into_iter()
                .collect(),
            catalyst_score: 0.0,
            sentiment: SentimentBundle::default(),
            relevance_scores: HashMap::new(),
            classification_ts: Utc::now(),
            source_weight: 1.0,
        };
        let weights: HashMap<String, f64> =
            [("fda".to_string(), 8.0), ("m_and_a".to_string(), 8.0)]
                .into_iter()
                .collect();
        item.recompute_score(&weights, 0.5);
        assert_eq!(item.catalyst_score, 10.0);
    }

    #[test]
    fn cycle_stats_accounting() {
        let mut stats = CycleStats::new(1);
        stats.fetched = 10;
        stats.alerts_sent = 3;
        stats.alerts_failed = 1;
        stats.dropped_error = 1;
        stats.skip("no_ticker");
        stats.skip("no_ticker");
        stats.skip("stale");
        stats.skip("stale");
        stats.skip("stale");
        assert!(stats.accounting_balances());
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint([1u8; 20]);
        assert_eq!(fp.to_hex().len(), 40);
        assert_eq!(fp.to_string(), fp.to_hex());
    }
}
