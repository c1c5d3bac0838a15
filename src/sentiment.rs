//! Sentiment Aggregator: combine local lexicon, ML, external vendor, and
//! price-action sentiment into a single weighted aggregate (spec.md §4.7).
//!
//! Each source is independently optional and bounded-timeout; missing
//! sources drop out of the mean and the remaining weights are renormalized
//! rather than treating a gap as zero sentiment — the same "nil, not zero"
//! discipline the teacher applies to missing market-data fields in
//! `signals/enrichment.rs`.

use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::models::{NewsItem, SentimentBundle, SentimentScore};

const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
pub struct SentimentWeights {
    pub local: f64,
    pub ml: f64,
    pub external: f64,
    pub premarket: f64,
}

impl Default for SentimentWeights {
    fn default() -> Self {
        Self {
            local: 0.30,
            ml: 0.35,
            external: 0.20,
            premarket: 0.15,
        }
    }
}

/// A small VADER-style lexicon: positive/negative word lists with a fixed
/// per-hit magnitude, always available and cheap enough to run inline.
fn local_lexicon_score(text: &str) -> SentimentScore {
    const POSITIVE: &[&str] = &[
        "approval", "beats", "surge", "record", "growth", "upgrade", "breakthrough", "wins",
        "strong", "raises",
    ];
    const NEGATIVE: &[&str] = &[
        "recall", "delay", "miss", "downgrade", "lawsuit", "investigation", "halt", "decline",
        "warns", "cuts",
    ];

    let lower = text.to_lowercase();
    let pos = POSITIVE.iter().filter(|w| lower.contains(*w)).count() as f64;
    let neg = NEGATIVE.iter().filter(|w| lower.contains(*w)).count() as f64;

    let total = pos + neg;
    let value = if total == 0.0 { 0.0 } else { (pos - neg) / total };

    SentimentScore {
        value: value.clamp(-1.0, 1.0),
        confidence: 0.5,
    }
}

/// Stand-in for a batched FinBERT-style scorer. Spec.md §4.7: "batched,
/// batch size 10, called once per cycle". The batching itself lives in the
/// orchestrator (which groups items before calling this); this function
/// scores one already-batched item and derives confidence from the
/// logit margin the caller supplies.
pub fn ml_score_from_logits(positive_logit: f64, negative_logit: f64) -> SentimentScore {
    let diff = positive_logit - negative_logit;
    let value = diff.tanh();
    let margin = diff.abs();
    SentimentScore {
        value,
        confidence: (margin / (margin + 1.0)).clamp(0.0, 1.0),
    }
}

pub struct SentimentAggregator {
    weights: SentimentWeights,
    source_timeout: Duration,
}

impl SentimentAggregator {
    pub fn new(weights: SentimentWeights) -> Self {
        Self {
            weights,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// Combines whatever sources are available. `ml`, `external`, and
    /// `premarket` are supplied by the caller (they each require their own
    /// network/ML round trip the orchestrator batches separately); `local`
    /// is always computed here since it has zero external dependency.
    pub async fn aggregate(
        &self,
        item: &NewsItem,
        ml: Option<SentimentScore>,
        external: Option<SentimentScore>,
        premarket: Option<SentimentScore>,
    ) -> SentimentBundle {
        let text = format!("{} {}", item.title, item.summary);

        let local = match timeout(self.source_timeout, async { local_lexicon_score(&text) }).await {
            Ok(score) => Some(score),
            Err(_) => {
                warn!(source = %item.source, "local sentiment lexicon timed out");
                None
            }
        };

        let weighted: Vec<(f64, SentimentScore)> = [
            (self.weights.local, local),
            (self.weights.ml, ml),
            (self.weights.external, external),
            (self.weights.premarket, premarket),
        ]
        .into_iter()
        .filter_map(|(w, score)| score.map(|s| (w, s)))
        .collect();

        let aggregate = if weighted.is_empty() {
            None
        } else {
            let total_weight: f64 = weighted.iter().map(|(w, _)| w).sum();
            if total_weight <= 0.0 {
                None
            } else {
                let value = weighted.iter().map(|(w, s)| w * s.value).sum::<f64>() / total_weight;
                let confidence =
                    weighted.iter().map(|(w, s)| w * s.confidence).sum::<f64>() / total_weight;
                Some(SentimentScore {
                    value: value.clamp(-1.0, 1.0),
                    confidence: confidence.clamp(0.0, 1.0),
                })
            }
        };

        SentimentBundle {
            local,
            ml,
            external,
            premarket,
            aggregate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(title: &str, summary: &str) -> NewsItem {
        NewsItem {
            source: "prnewswire".to_string(),
            source_id: "id-1".to_string(),
            canonical_url: "https://example.com".to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            published_at: chrono::Utc::now(),
            tickers: vec![],
            raw_fields: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn local_only_yields_bounded_aggregate() {
        let aggregator = SentimentAggregator::new(SentimentWeights::default());
        let item = item("Acme wins FDA approval, strong growth expected", "record quarter");
        let bundle = aggregator.aggregate(&item, None, None, None).await;
        assert!(bundle.local.is_some());
        let aggregate = bundle.aggregate.unwrap();
        assert!(aggregate.value >= -1.0 && aggregate.value <= 1.0);
        assert!(aggregate.value > 0.0);
    }

    #[tokio::test]
    async fn missing_sources_renormalize_rather_than_zero_out() {
        let aggregator = SentimentAggregator::new(SentimentWeights::default());
        let item = item("Acme recalls product after investigation", "decline in sales");
        let external = SentimentScore { value: 0.9, confidence: 0.8 };
        let bundle = aggregator.aggregate(&item, None, Some(external), None).await;
        let aggregate = bundle.aggregate.unwrap();
        // local is negative, external is strongly positive with no ml/premarket;
        // renormalized weights should pull toward a blend, not toward zero.
        assert_ne!(aggregate.value, 0.0);
    }

    #[test]
    fn ml_score_confidence_grows_with_margin() {
        let narrow = ml_score_from_logits(0.1, 0.0);
        let wide = ml_score_from_logits(5.0, 0.0);
        assert!(wide.confidence > narrow.confidence);
    }
}
