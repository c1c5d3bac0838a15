//! Filter Gates: the fixed-order accept/reject pipeline applied to a
//! classified, sentimented, enriched item before it is formatted and
//! posted (spec.md §4.13).
//!
//! Each gate is a pure function of (item, enrichment, config); a `Gates`
//! runs them in order and stops at the first rejection, incrementing a
//! named counter the orchestrator folds into `CycleStats::skip`.

use std::collections::HashMap;

use crate::config::Config;
use crate::models::{EnrichmentRecord, ScoredItem};

const DERIVATIVE_SUFFIXES: &[&str] = &["W", "WS", "R", "RT", "U"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Reject(&'static str),
}

pub struct Gates<'a> {
    config: &'a Config,
}

impl<'a> Gates<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Runs the 12 gates in spec order, returning the first rejection (if
    /// any). Counters belong to the caller, not this function, so the
    /// orchestrator can fold them straight into `CycleStats`.
    pub fn evaluate(&self, scored: &ScoredItem, enrichment: Option<&EnrichmentRecord>) -> GateOutcome {
        let Some(ticker) = scored.primary_ticker.as_deref() else {
            return GateOutcome::Reject("skipped_no_ticker");
        };

        if is_crypto_ticker(ticker) && !self.config.crypto_watchlist.iter().any(|t| t == ticker) {
            return GateOutcome::Reject("skipped_crypto_unwatchlisted");
        }

        let relevance = scored
            .relevance_scores
            .get(ticker)
            .copied()
            .unwrap_or(0.0);
        if relevance < self.config.min_relevance {
            return GateOutcome::Reject("skipped_low_relevance");
        }

        if let Some(ceiling) = self.config.price_ceiling {
            if let Some(price) = enrichment.and_then(|e| e.last_price) {
                if price > ceiling {
                    return GateOutcome::Reject("skipped_price_gate");
                }
            }
        }
        if let Some(price) = enrichment.and_then(|e| e.last_price) {
            if price < self.config.price_floor {
                return GateOutcome::Reject("skipped_price_floor");
            }
        }

        if self.config.ignore_instrument_tickers && is_derivative_instrument(ticker) {
            return GateOutcome::Reject("skipped_derivative_instrument");
        }

        if self
            .config
            .skip_sources
            .iter()
            .any(|s| s == &scored.item.source)
        {
            return GateOutcome::Reject("skipped_source_skiplist");
        }

        if scored.catalyst_score < self.config.min_score {
            return GateOutcome::Reject("skipped_low_score");
        }

        let sentiment_abs = scored
            .sentiment
            .aggregate
            .map(|s| s.value.abs())
            .unwrap_or(0.0);
        if sentiment_abs < self.config.min_sent_abs {
            return GateOutcome::Reject("skipped_low_sentiment");
        }

        if !category_allowed(&self.config.categories_allow, &scored.keyword_hits) {
            return GateOutcome::Reject("skipped_category_not_allowed");
        }

        if !self.config.allow_otc && is_otc_source(&scored.item.source) {
            return GateOutcome::Reject("skipped_otc_disabled");
        }

        if let Some(avg_volume) = enrichment.and_then(|e| e.avg_volume) {
            if avg_volume < self.config.min_avg_volume {
                return GateOutcome::Reject("skipped_low_volume");
            }
        }

        GateOutcome::Pass
    }
}

fn is_crypto_ticker(ticker: &str) -> bool {
    const CRYPTO_SUFFIXES: &[&str] = &["-USD", "-USDT", "-BTC"];
    CRYPTO_SUFFIXES.iter().any(|s| ticker.ends_with(s))
}

/// Warrants/rights/units conventionally trail the common-stock ticker with
/// a single-letter (or short) suffix after a separator.
fn is_derivative_instrument(ticker: &str) -> bool {
    if let Some((_, suffix)) = ticker.rsplit_once(['.', '-']) {
        return DERIVATIVE_SUFFIXES.contains(&suffix);
    }
    false
}

fn is_otc_source(source: &str) -> bool {
    source.eq_ignore_ascii_case("otc") || source.starts_with("otc_")
}

fn category_allowed(allow_list: &[String], keyword_hits: &HashMap<String, f64>) -> bool {
    if allow_list.iter().any(|c| c == "*") {
        return true;
    }
    keyword_hits.keys().any(|category| allow_list.contains(category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, NewsItem, SentimentBundle, SentimentScore};
    use std::collections::HashMap;

    fn scored_with(ticker: &str, score: f64, relevance: f64) -> ScoredItem {
        ScoredItem {
            item: NewsItem {
                source: "prnewswire".to_string(),
                source_id: "1".to_string(),
                canonical_url: "https://example.com".to_string(),
                title: "title".to_string(),
                summary: "summary".to_string(),
                published_at: chrono::Utc::now(),
                tickers: vec![ticker.to_string()],
                raw_fields: HashMap::new(),
            },
            fingerprint: Fingerprint([0u8; 20]),
            primary_ticker: Some(ticker.to_string()),
            secondary_tickers: vec![],
            keyword_hits: [("fda".to_string(), score)].into_iter().collect(),
            catalyst_score: score,
            sentiment: SentimentBundle {
                aggregate: Some(SentimentScore { value: 0.5, confidence: 0.8 }),
                ..Default::default()
            },
            relevance_scores: [(ticker.to_string(), relevance)].into_iter().collect(),
            classification_ts: chrono::Utc::now(),
            source_weight: 1.0,
        }
    }

    #[test]
    fn rejects_item_with_no_primary_ticker() {
        let config = Config::default();
        let gates = Gates::new(&config);
        let mut scored = scored_with("ACME", 5.0, 80.0);
        scored.primary_ticker = None;
        assert_eq!(gates.evaluate(&scored, None), GateOutcome::Reject("skipped_no_ticker"));
    }

    #[test]
    fn rejects_below_min_score() {
        let mut config = Config::default();
        config.min_score = 2.0;
        let gates = Gates::new(&config);
        let scored = scored_with("ACME", 0.5, 80.0);
        assert_eq!(gates.evaluate(&scored, None), GateOutcome::Reject("skipped_low_score"));
    }

    #[test]
    fn rejects_above_price_ceiling() {
        let mut config = Config::default();
        config.price_ceiling = Some(10.0);
        let gates = Gates::new(&config);
        let scored = scored_with("ACME", 5.0, 80.0);
        let enrichment = EnrichmentRecord {
            last_price: Some(42.10),
            ..EnrichmentRecord::empty("ACME")
        };
        assert_eq!(
            gates.evaluate(&scored, Some(&enrichment)),
            GateOutcome::Reject("skipped_price_gate")
        );
    }

    #[test]
    fn passes_when_all_gates_clear() {
        let config = Config::default();
        let gates = Gates::new(&config);
        let scored = scored_with("ACME", 5.0, 80.0);
        let enrichment = EnrichmentRecord {
            last_price: Some(3.0),
            avg_volume: Some(1_000_000.0),
            ..EnrichmentRecord::empty("ACME")
        };
        assert_eq!(gates.evaluate(&scored, Some(&enrichment)), GateOutcome::Pass);
    }

    #[test]
    fn rejects_derivative_instrument_suffix() {
        let config = Config::default();
        let gates = Gates::new(&config);
        let scored = scored_with("ACME-W", 5.0, 80.0);
        assert_eq!(
            gates.evaluate(&scored, None),
            GateOutcome::Reject("skipped_derivative_instrument")
        );
    }

    #[test]
    fn allows_derivative_instrument_when_ignore_disabled() {
        let mut config = Config::default();
        config.ignore_instrument_tickers = false;
        let gates = Gates::new(&config);
        let scored = scored_with("ACME-W", 5.0, 80.0);
        let enrichment = EnrichmentRecord {
            last_price: Some(3.0),
            avg_volume: Some(1_000_000.0),
            ..EnrichmentRecord::empty("ACME-W")
        };
        assert_eq!(gates.evaluate(&scored, Some(&enrichment)), GateOutcome::Pass);
    }

    #[test]
    fn rejects_unwatchlisted_crypto() {
        let config = Config::default();
        let gates = Gates::new(&config);
        let scored = scored_with("BTC-USD", 5.0, 80.0);
        assert_eq!(
            gates.evaluate(&scored, None),
            GateOutcome::Reject("skipped_crypto_unwatchlisted")
        );
    }
}
