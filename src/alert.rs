//! Alert Formatter: render a ScoredItem + EnrichmentRecord (+ optional SEC
//! analysis) into a deterministic, chat-platform-ready Alert (spec.md §4.11).

use crate::llm::Analysis;
use crate::models::{Alert, Embed, EmbedField, EnrichmentRecord, ScoredItem};

const COLOR_NEUTRAL: u32 = 0x95_A5_A6;
const COLOR_POSITIVE: u32 = 0x2E_CC_71;
const COLOR_NEGATIVE: u32 = 0xE7_4C_3C;

/// 10 discrete cells representing sentiment in [-1, 1] (spec.md §4.11).
fn sentiment_gauge(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "??????????".to_string();
    };
    let filled = (((value + 1.0) / 2.0) * 10.0).round().clamp(0.0, 10.0) as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(10 - filled))
}

fn embed_color(catalyst_score: f64, sentiment_aggregate: Option<f64>) -> u32 {
    match sentiment_aggregate {
        Some(v) if v > 0.15 => COLOR_POSITIVE,
        Some(v) if v < -0.15 => COLOR_NEGATIVE,
        _ if catalyst_score >= 5.0 => COLOR_POSITIVE,
        _ => COLOR_NEUTRAL,
    }
}

pub struct AlertFormatter;

impl AlertFormatter {
    pub fn format(
        scored: &ScoredItem,
        ticker: &str,
        enrichment: Option<&EnrichmentRecord>,
        sec_analysis: Option<&Analysis>,
        trade_plan_enabled: bool,
    ) -> Alert {
        let aggregate = scored.sentiment.aggregate.map(|s| s.value);
        let mut fields = vec![
            EmbedField {
                name: "Ticker".to_string(),
                value: format!("${ticker}"),
                inline: true,
            },
            EmbedField {
                name: "Catalyst".to_string(),
                value: primary_category(scored),
                inline: true,
            },
            EmbedField {
                name: "Sentiment".to_string(),
                value: sentiment_gauge(aggregate),
                inline: true,
            },
        ];

        if let Some(enrichment) = enrichment {
            if let Some(price) = enrichment.last_price {
                let change = enrichment.change_pct.unwrap_or(0.0);
                fields.push(EmbedField {
                    name: "Price".to_string(),
                    value: format!("${price:.2} ({change:+.1}%)"),
                    inline: true,
                });
            }
            if let Some(rvol) = enrichment.rvol_multiplier {
                fields.push(EmbedField {
                    name: "RVOL".to_string(),
                    value: format!("{rvol:.1}x"),
                    inline: true,
                });
            }
            if let Some(float_shares) = enrichment.float_shares {
                fields.push(EmbedField {
                    name: "Float".to_string(),
                    value: format_shares(float_shares),
                    inline: true,
                });
            }
        }

        if trade_plan_enabled {
            if let Some(hint) = trade_plan_hint(enrichment) {
                fields.push(EmbedField {
                    name: "Trade plan".to_string(),
                    value: hint,
                    inline: false,
                });
            }
        }

        if scored.item.is_sec() {
            fields.push(EmbedField {
                name: "Filing".to_string(),
                value: scored
                    .item
                    .raw_fields
                    .get("form_type")
                    .map(|v| format!("{v:?}"))
                    .unwrap_or_else(|| "unknown".to_string()),
                inline: true,
            });
            if let Some(analysis) = sec_analysis {
                fields.push(EmbedField {
                    name: "Analysis tier".to_string(),
                    value: analysis.model_used.clone(),
                    inline: true,
                });
                fields.push(EmbedField {
                    name: "Extracted summary".to_string(),
                    value: truncate(&analysis.summary, 200),
                    inline: false,
                });
                if !analysis.extracted_metrics.is_empty() {
                    let mut metrics: Vec<(&String, &String)> = analysis.extracted_metrics.iter().collect();
                    metrics.sort_by_key(|(k, _)| k.as_str());
                    let value = metrics
                        .into_iter()
                        .map(|(k, v)| format!("{k}: {v}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    fields.push(EmbedField {
                        name: "Extracted metrics".to_string(),
                        value: truncate(&value, 200),
                        inline: false,
                    });
                }
            }
        }

        let embed = Embed {
            title: truncate(&scored.item.title, 256),
            url: Some(scored.item.canonical_url.clone()),
            color: embed_color(scored.catalyst_score, aggregate),
            fields,
            footer: Some(scored.item.source.clone()),
            timestamp: scored.item.published_at,
        };

        Alert {
            ticker: ticker.to_string(),
            title: scored.item.title.clone(),
            link: scored.item.canonical_url.clone(),
            content_text: format!("${ticker}: {}", truncate(&scored.item.title, 120)),
            embed,
            components: None,
            idempotency_key: scored.fingerprint.to_hex(),
        }
    }
}

/// A rough entry/stop/target hint off the last traded price, gated behind
/// `trade_plan_enabled` (spec.md §4.11). Not a recommendation engine: stop
/// is 5% below entry, target is 15% above, in line with the sub-$10
/// catalyst-trade risk sizing this crate targets.
fn trade_plan_hint(enrichment: Option<&EnrichmentRecord>) -> Option<String> {
    let price = enrichment?.last_price?;
    if price <= 0.0 {
        return None;
    }
    let stop = price * 0.95;
    let target = price * 1.15;
    Some(format!("Entry ~${price:.2} | Stop ~${stop:.2} | Target ~${target:.2}"))
}

fn primary_category(scored: &ScoredItem) -> String {
    scored
        .keyword_hits
        .keys()
        .max_by(|a, b| {
            scored.keyword_hits[*a]
                .partial_cmp(&scored.keyword_hits[*b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
        .unwrap_or_else(|| "general".to_string())
}

fn format_shares(shares: f64) -> String {
    if shares >= 1_000_000.0 {
        format!("{:.1}M", shares / 1_000_000.0)
    } else if shares >= 1_000.0 {
        format!("{:.1}K", shares / 1_000.0)
    } else {
        format!("{shares:.0}")
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, NewsItem, SentimentBundle, SentimentScore};
    use std::collections::HashMap;

    fn scored_item() -> ScoredItem {
        ScoredItem {
            item: NewsItem {
                source: "prnewswire".to_string(),
                source_id: "pr-1".to_string(),
                canonical_url: "https://example.com/a".to_string(),
                title: "Acme Corp Announces FDA Approval".to_string(),
                summary: "summary".to_string(),
                published_at: chrono::Utc::now(),
                tickers: vec!["ACME".to_string()],
                raw_fields: HashMap::new(),
            },
            fingerprint: Fingerprint([9u8; 20]),
            primary_ticker: Some("ACME".to_string()),
            secondary_tickers: vec![],
            keyword_hits: [("fda".to_string(), 3.0)].into_iter().collect(),
            catalyst_score: 3.0,
            sentiment: SentimentBundle {
                aggregate: Some(SentimentScore { value: 0.4, confidence: 0.7 }),
                ..Default::default()
            },
            relevance_scores: HashMap::new(),
            classification_ts: chrono::Utc::now(),
            source_weight: 1.0,
        }
    }

    #[test]
    fn idempotency_key_matches_fingerprint_hex() {
        let scored = scored_item();
        let alert = AlertFormatter::format(&scored, "ACME", None, None, false);
        assert_eq!(alert.idempotency_key, scored.fingerprint.to_hex());
    }

    #[test]
    fn embed_includes_price_fields_when_enrichment_present() {
        let scored = scored_item();
        let enrichment = EnrichmentRecord {
            ticker: "ACME".to_string(),
            last_price: Some(4.2),
            change_pct: Some(12.5),
            rvol_multiplier: Some(5.1),
            float_shares: Some(3_200_000.0),
            ..Default::default()
        };
        let alert = AlertFormatter::format(&scored, "ACME", Some(&enrichment), None, false);
        let names: Vec<&str> = alert.embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"Price"));
        assert!(names.contains(&"RVOL"));
        assert!(names.contains(&"Float"));
    }

    #[test]
    fn trade_plan_hint_omitted_when_disabled() {
        let scored = scored_item();
        let enrichment = EnrichmentRecord {
            ticker: "ACME".to_string(),
            last_price: Some(4.0),
            ..Default::default()
        };
        let alert = AlertFormatter::format(&scored, "ACME", Some(&enrichment), None, false);
        assert!(!alert.embed.fields.iter().any(|f| f.name == "Trade plan"));
    }

    #[test]
    fn trade_plan_hint_included_when_enabled_and_price_known() {
        let scored = scored_item();
        let enrichment = EnrichmentRecord {
            ticker: "ACME".to_string(),
            last_price: Some(4.0),
            ..Default::default()
        };
        let alert = AlertFormatter::format(&scored, "ACME", Some(&enrichment), None, true);
        let plan = alert.embed.fields.iter().find(|f| f.name == "Trade plan");
        assert_eq!(plan.map(|f| f.value.as_str()), Some("Entry ~$4.00 | Stop ~$3.80 | Target ~$4.60"));
    }

    #[test]
    fn sentiment_gauge_is_ten_cells() {
        assert_eq!(sentiment_gauge(Some(1.0)).len(), 10);
        assert_eq!(sentiment_gauge(Some(-1.0)), "-".repeat(10));
        assert_eq!(sentiment_gauge(None).len(), 10);
    }

    #[test]
    fn truncate_respects_max_len() {
        let long = "a".repeat(300);
        assert_eq!(truncate(&long, 256).chars().count(), 256);
    }
}
