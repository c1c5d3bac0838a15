//! Classifier: keyword catalyst scoring with dynamic weights (spec.md §4.6).
//!
//! The taxonomy and phrase lists are configuration, not code (spec.md §4.6),
//! so `CatalystTaxonomy` is constructed from data rather than hard-coded
//! match arms — mirroring how the teacher keeps scoring thresholds in
//! `signals/quality.rs` as struct fields rather than inline constants.

use std::collections::HashMap;

use crate::models::{DynamicWeights, NewsItem};

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalystTaxonomy {
    categories: Vec<Category>,
}

impl CatalystTaxonomy {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Default taxonomy matching spec.md §4.6's illustrative category list.
    pub fn default_taxonomy() -> Self {
        let cat = |name: &str, phrases: &[&str]| Category {
            name: name.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        };

        Self::new(vec![
            cat("fda", &["fda approval", "fda clearance", "breakthrough therapy", "fast track designation"]),
            cat("clinical", &["phase 1", "phase 2", "phase 3", "clinical trial", "topline data", "primary endpoint"]),
            cat("m_and_a", &["merger agreement", "to be acquired", "acquisition of", "definitive agreement to merge"]),
            cat("partnership", &["strategic partnership", "licensing agreement", "collaboration agreement"]),
            cat("offering", &["registered direct offering", "public offering", "private placement", "shelf registration"]),
            cat("uplisting", &["uplisting to nasdaq", "uplisting to nyse", "approved for listing"]),
            cat("earnings", &["quarterly results", "earnings per share", "revenue of", "beats estimates"]),
            cat("guidance", &["raises guidance", "lowers guidance", "updates outlook"]),
            cat("contract", &["awarded contract", "purchase order", "supply agreement"]),
            cat("leadership", &["appoints new ceo", "names new cfo", "board of directors appoints"]),
            cat("regulatory", &["regulatory approval", "granted patent", "ce mark"]),
            cat("legal", &["settles lawsuit", "files patent infringement", "court ruling"]),
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationResult {
    pub catalyst_score: f64,
    pub keyword_hits: HashMap<String, f64>,
}

pub struct Classifier {
    taxonomy: CatalystTaxonomy,
}

impl Classifier {
    pub fn new(taxonomy: CatalystTaxonomy) -> Self {
        Self { taxonomy }
    }

    /// "Fast" variant: no sentiment lookup, just regex/phrase scoring.
    pub fn classify_fast(&self, item: &NewsItem, weights: &DynamicWeights) -> ClassificationResult {
        let haystack = format!("{} {}", item.title, item.summary).to_lowercase();

        let mut keyword_hits = HashMap::new();
        for category in &self.taxonomy.categories {
            if let Some(_first_match) = category.phrases.iter().find(|phrase| haystack.contains(phrase.as_str())) {
                let weight = weights.get(&category.name);
                keyword_hits.insert(category.name.clone(), weight);
            }
        }

        let sum: f64 = keyword_hits.values().sum();
        ClassificationResult {
            catalyst_score: sum.clamp(0.0, 10.0),
            keyword_hits,
        }
    }

    /// "Full" variant has the same result shape; the sentiment consultation
    /// itself happens one level up in the orchestrator (the Sentiment
    /// Aggregator needs its own network/ML round-trip and batches across
    /// items, so it cannot be folded into a per-item synchronous call here).
    pub fn classify_full(&self, item: &NewsItem, weights: &DynamicWeights) -> ClassificationResult {
        self.classify_fast(item, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn item(title: &str, summary: &str) -> NewsItem {
        NewsItem {
            source: "prnewswire".to_string(),
            source_id: "id-1".to_string(),
            canonical_url: "https://example.com".to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            published_at: Utc::now(),
            tickers: vec![],
            raw_fields: Map::new(),
        }
    }

    #[test]
    fn single_category_hit_uses_configured_weight() {
        let classifier = Classifier::new(CatalystTaxonomy::default_taxonomy());
        let mut weights = DynamicWeights::default();
        weights.default_weight = 0.5;
        weights.weights.insert("fda".to_string(), 3.0);

        let item = item(
            "Acme Corp (NASDAQ: ACME) Announces FDA Approval of Drug X",
            "summary",
        );
        let result = classifier.classify_fast(&item, &weights);
        assert_eq!(result.catalyst_score, 3.0);
        assert!(result.keyword_hits.contains_key("fda"));
    }

    #[test]
    fn score_is_clamped_to_ten() {
        let classifier = Classifier::new(CatalystTaxonomy::default_taxonomy());
        let mut weights = DynamicWeights::default();
        weights.default_weight = 8.0;

        let item = item(
            "FDA approval merger agreement strategic partnership public offering",
            "uplisting to nasdaq quarterly results raises guidance awarded contract appoints new ceo regulatory approval settles lawsuit phase 3 clinical trial",
        );
        let result = classifier.classify_fast(&item, &weights);
        assert_eq!(result.catalyst_score, 10.0);
    }

    #[test]
    fn no_hits_yields_zero_score() {
        let classifier = Classifier::new(CatalystTaxonomy::default_taxonomy());
        let weights = DynamicWeights::default();
        let item = item("Nothing interesting happened today", "just a regular day");
        let result = classifier.classify_fast(&item, &weights);
        assert_eq!(result.catalyst_score, 0.0);
        assert!(result.keyword_hits.is_empty());
    }
}
