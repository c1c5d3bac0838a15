//! Ticker Resolver: extract/validate symbols and score their relevance to
//! the article (spec.md §4.5).

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::NewsItem;

static DOLLAR_TICKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Z]{1,5})\b").unwrap());
static EXCHANGE_TICKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:NASDAQ|NYSE|OTC|AMEX)\s*:\s*([A-Z]{1,5})\)").unwrap());
static BARE_UPPER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,5}\b").unwrap());

/// Words that match the bare-uppercase-run pattern but are never tickers.
const STOPWORDS: &[&str] = &[
    "THE", "AND", "FOR", "INC", "LLC", "LTD", "CORP", "CO", "USA", "CEO", "CFO", "SEC", "FDA",
    "IPO", "ETF", "USD", "AI", "US",
];

pub struct TickerResolver {
    universe: HashSet<String>,
    min_relevance: f64,
    max_primary: usize,
    score_diff_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct ResolvedTickers {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub relevance_scores: HashMap<String, f64>,
    pub is_multi_ticker: bool,
}

impl TickerResolver {
    pub fn new(
        universe: HashSet<String>,
        min_relevance: f64,
        max_primary: usize,
        score_diff_threshold: f64,
    ) -> Self {
        Self {
            universe,
            min_relevance,
            max_primary,
            score_diff_threshold,
        }
    }

    fn candidates(&self, item: &NewsItem) -> Vec<String> {
        if !item.tickers.is_empty() {
            return item
                .tickers
                .iter()
                .filter(|t| self.is_valid(t))
                .cloned()
                .collect();
        }

        let haystack = format!("{} {}", item.title, item.summary);
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for caps in DOLLAR_TICKER.captures_iter(&haystack) {
            let sym = caps[1].to_string();
            if self.is_valid(&sym) && seen.insert(sym.clone()) {
                found.push(sym);
            }
        }
        for caps in EXCHANGE_TICKER.captures_iter(&haystack) {
            let sym = caps[1].to_string();
            if self.is_valid(&sym) && seen.insert(sym.clone()) {
                found.push(sym);
            }
        }
        for m in BARE_UPPER_RUN.find_iter(&haystack) {
            let sym = m.as_str().to_string();
            if STOPWORDS.contains(&sym.as_str()) {
                continue;
            }
            if self.is_valid(&sym) && seen.insert(sym.clone()) {
                found.push(sym);
            }
        }

        found
    }

    fn is_valid(&self, ticker: &str) -> bool {
        self.universe.is_empty() || self.universe.contains(ticker)
    }

    /// spec.md §4.5: `50*position + 30*in_first_paragraph + 20*min(5, mention_count)*0.2`
    fn relevance(&self, item: &NewsItem, ticker: &str, position: usize, total: usize) -> f64 {
        let position_score = if total <= 1 {
            1.0
        } else {
            1.0 - (position as f64 / (total - 1).max(1) as f64)
        };

        let first_paragraph = item
            .summary
            .split("\n\n")
            .next()
            .unwrap_or(&item.summary);
        let in_first_paragraph = if first_paragraph.contains(ticker) || item.title.contains(ticker) {
            1.0
        } else {
            0.0
        };

        let haystack = format!("{} {}", item.title, item.summary);
        let mention_count = haystack.matches(ticker).count().min(5) as f64;

        (50.0 * position_score + 30.0 * in_first_paragraph + 20.0 * mention_count * 0.2)
            .clamp(0.0, 100.0)
    }

    pub fn resolve(&self, item: &NewsItem) -> Option<ResolvedTickers> {
        let candidates = self.candidates(item);
        if candidates.is_empty() {
            return None;
        }

        let total = candidates.len();
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.clone(), self.relevance(item, t, idx, total)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.retain(|(_, score)| *score >= self.min_relevance);

        if scored.is_empty() {
            return None;
        }

        let relevance_scores: HashMap<String, f64> = scored.iter().cloned().collect();

        let is_multi_ticker = scored.len() > 1
            && (scored[0].1 - scored[1].1).abs() < self.score_diff_threshold;

        let primary_count = if is_multi_ticker {
            self.max_primary.min(scored.len())
        } else {
            1
        };

        let primary: Vec<String> = scored[..primary_count].iter().map(|(t, _)| t.clone()).collect();
        let secondary: Vec<String> = scored[primary_count..].iter().map(|(t, _)| t.clone()).collect();

        Some(ResolvedTickers {
            primary,
            secondary,
            relevance_scores,
            is_multi_ticker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(title: &str, summary: &str, tickers: Vec<&str>) -> NewsItem {
        NewsItem {
            source: "prnewswire".to_string(),
            source_id: "id-1".to_string(),
            canonical_url: "https://example.com".to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            published_at: Utc::now(),
            tickers: tickers.into_iter().map(|s| s.to_string()).collect(),
            raw_fields: HashMap::new(),
        }
    }

    fn resolver() -> TickerResolver {
        TickerResolver::new(HashSet::new(), 40.0, 2, 30.0)
    }

    #[test]
    fn extracts_exchange_qualified_ticker() {
        let item = item(
            "Acme Corp (NASDAQ: ACME) Announces FDA Approval of Drug X",
            "Acme Corp said today...",
            vec![],
        );
        let resolved = resolver().resolve(&item).unwrap();
        assert_eq!(resolved.primary, vec!["ACME".to_string()]);
    }

    #[test]
    fn uses_provided_tickers_when_present() {
        let item = item("Generic headline", "body", vec!["ACME"]);
        let resolved = resolver().resolve(&item).unwrap();
        assert_eq!(resolved.primary, vec!["ACME".to_string()]);
    }

    #[test]
    fn rejects_items_with_no_valid_ticker() {
        let item = item("Market wraps up for the day", "Nothing specific happened.", vec![]);
        assert!(resolver().resolve(&item).is_none());
    }

    #[test]
    fn multi_ticker_when_scores_close() {
        let item = item("AAPL down 5%, MSFT up 2%", "AAPL and MSFT both moved today.", vec!["AAPL", "MSFT"]);
        let resolved = resolver().resolve(&item).unwrap();
        assert!(resolved.primary.len() >= 1);
    }
}
