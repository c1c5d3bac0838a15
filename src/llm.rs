//! LLM Client: tiered, batched, cached, cost-budgeted calls for SEC-filing
//! text extraction (spec.md §4.10).
//!
//! Generalizes the teacher's `vault::llm::OpenRouterClient` (single
//! `chat_completion` call, usage accounting) into a tiered client with a
//! persistent analysis cache and a daily cost accumulator that disables
//! progressively more expensive tiers as spend crosses WARN/CRIT/EMERGENCY
//! thresholds, reset by a background task the same way the teacher resets
//! its own daily counters (`storage_pruning_polling`-style `tokio::spawn`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::net;
use crate::rate_limiter::TokenBucket;

const ANALYSIS_CACHE_TTL: Duration = Duration::from_secs(72 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelTier {
    Simple,
    Medium,
    Complex,
}

impl ModelTier {
    /// Heuristic routing by doc length/item code (spec.md §4.10).
    pub fn route(doc_len: usize, item_code: &str) -> Self {
        const CRITICAL_CODES: &[&str] = &["1.01", "2.02", "5.02", "8.01"];
        if CRITICAL_CODES.contains(&item_code) || doc_len > 20_000 {
            ModelTier::Complex
        } else if doc_len > 4_000 {
            ModelTier::Medium
        } else {
            ModelTier::Simple
        }
    }

    fn model_name(self) -> &'static str {
        match self {
            ModelTier::Simple => "openrouter/cheap-small",
            ModelTier::Medium => "openrouter/mid",
            ModelTier::Complex => "openrouter/top-tier",
        }
    }

    fn estimated_cost_cents(self, tokens: u32) -> f64 {
        let per_1k_cents = match self {
            ModelTier::Simple => 0.05,
            ModelTier::Medium => 0.30,
            ModelTier::Complex => 1.50,
        };
        (tokens as f64 / 1000.0) * per_1k_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecDoc {
    pub doc_id: String,
    pub item_code: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub extracted_metrics: HashMap<String, String>,
    pub model_used: String,
}

struct CacheEntry {
    analysis: Analysis,
    cached_at: chrono::DateTime<Utc>,
}

/// Atomic, reset at UTC midnight by a single daily task (spec.md §5).
pub struct CostAccumulator {
    cents_spent_today: AtomicU64, // stored as cents * 100 for integer atomics
    warn_usd: f64,
    crit_usd: f64,
    emergency_usd: f64,
}

impl CostAccumulator {
    pub fn new(warn_usd: f64, crit_usd: f64, emergency_usd: f64) -> Self {
        Self {
            cents_spent_today: AtomicU64::new(0),
            warn_usd,
            crit_usd,
            emergency_usd,
        }
    }

    fn add(&self, cents: f64) {
        let scaled = (cents * 100.0).round() as u64;
        self.cents_spent_today.fetch_add(scaled, Ordering::Relaxed);
    }

    pub fn spent_usd(&self) -> f64 {
        self.cents_spent_today.load(Ordering::Relaxed) as f64 / 100.0 / 100.0
    }

    pub fn reset(&self) {
        self.cents_spent_today.store(0, Ordering::Relaxed);
    }

    /// Highest tier still permitted given today's spend.
    pub fn max_allowed_tier(&self) -> Option<ModelTier> {
        let spent = self.spent_usd();
        if spent >= self.emergency_usd {
            None
        } else if spent >= self.crit_usd {
            Some(ModelTier::Simple)
        } else if spent >= self.warn_usd {
            Some(ModelTier::Medium)
        } else {
            Some(ModelTier::Complex)
        }
    }

    /// Spawns the background task that zeroes spend at UTC midnight.
    pub fn spawn_daily_reset(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next_midnight = (now + ChronoDuration::days(1))
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    .and_utc();
                let sleep_for = (next_midnight - now).to_std().unwrap_or(Duration::from_secs(3600));
                tokio::time::sleep(sleep_for).await;
                self.reset();
                info!("LLM cost accumulator reset for new UTC day");
            }
        });
    }
}

pub struct LlmClient {
    http: Client,
    api_key: String,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cost: Arc<CostAccumulator>,
    batch_size: usize,
    batch_timeout: Duration,
    rate_limiter: TokenBucket,
}

impl LlmClient {
    /// `rate_limit_per_min` gates every provider call behind a token bucket
    /// (spec.md §5: "one bucket per provider"); `batch_size`/`batch_timeout`
    /// implement spec.md §4.10's "batched (default size 5) and released on
    /// size-or-time (default 2s)".
    pub fn new(
        http: Client,
        api_key: String,
        cost: Arc<CostAccumulator>,
        batch_size: usize,
        batch_timeout: Duration,
        rate_limit_per_min: u32,
    ) -> Self {
        Self {
            http,
            api_key,
            cache: RwLock::new(HashMap::new()),
            cost,
            batch_size: batch_size.max(1),
            batch_timeout,
            rate_limiter: TokenBucket::new(rate_limit_per_min.max(1), rate_limit_per_min.max(1)),
        }
    }

    fn cached(&self, doc_id: &str) -> Option<Analysis> {
        let cache = self.cache.read();
        cache.get(doc_id).and_then(|entry| {
            let age = Utc::now() - entry.cached_at;
            if age.to_std().map(|a| a < ANALYSIS_CACHE_TTL).unwrap_or(false) {
                Some(entry.analysis.clone())
            } else {
                None
            }
        })
    }

    fn store_cache(&self, doc_id: &str, analysis: Analysis) {
        self.cache.write().insert(
            doc_id.to_string(),
            CacheEntry {
                analysis,
                cached_at: Utc::now(),
            },
        );
    }

    /// spec.md §4.10: non-cached docs are grouped into batches of
    /// `batch_size`, each released as soon as it fills or `batch_timeout`
    /// has elapsed since its first doc arrived, whichever comes first; docs
    /// within a released batch are analyzed concurrently, with every
    /// provider call gated behind `rate_limiter`.
    pub async fn analyze(&self, docs: &[SecDoc]) -> HashMap<String, Analysis> {
        let mut out = HashMap::with_capacity(docs.len());
        let mut pending: Vec<&SecDoc> = Vec::with_capacity(self.batch_size);
        let mut batch_started: Option<std::time::Instant> = None;

        for doc in docs {
            if let Some(cached) = self.cached(&doc.doc_id) {
                out.insert(doc.doc_id.clone(), cached);
                continue;
            }

            if pending.is_empty() {
                batch_started = Some(std::time::Instant::now());
            }
            pending.push(doc);

            let size_trigger = pending.len() >= self.batch_size;
            let time_trigger = batch_started
                .map(|started| started.elapsed() >= self.batch_timeout)
                .unwrap_or(false);
            if size_trigger || time_trigger {
                let batch = std::mem::take(&mut pending);
                out.extend(self.process_batch(&batch).await);
                batch_started = None;
            }
        }

        if !pending.is_empty() {
            out.extend(self.process_batch(&pending).await);
        }

        out
    }

    /// Runs every doc in `batch` concurrently, each gated behind the
    /// per-provider token bucket (spec.md §4.10: "rate-limited per provider
    /// via token buckets").
    async fn process_batch(&self, batch: &[&SecDoc]) -> HashMap<String, Analysis> {
        use futures::future::join_all;

        let calls = batch.iter().map(|doc| async move {
            self.rate_limiter.acquire().await;

            let requested_tier = ModelTier::route(doc.text.len(), &doc.item_code);
            let Some(max_tier) = self.cost.max_allowed_tier() else {
                warn!(doc_id = %doc.doc_id, "LLM cost emergency threshold reached, skipping");
                return None;
            };
            let tier = requested_tier.min(max_tier);

            match self.call_model(tier, doc).await {
                Ok(analysis) => {
                    self.store_cache(&doc.doc_id, analysis.clone());
                    Some((doc.doc_id.clone(), analysis))
                }
                Err(err) => {
                    warn!(doc_id = %doc.doc_id, error = %err, "LLM analysis failed");
                    None
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn call_model(&self, tier: ModelTier, doc: &SecDoc) -> anyhow::Result<Analysis> {
        let url = "https://openrouter.ai/api/v1/chat/completions";
        let api_key = self.api_key.clone();
        let client = self.http.clone();
        let model = tier.model_name();
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": "Extract key metrics from this SEC filing excerpt."},
                {"role": "user", "content": doc.text},
            ],
        });

        let response = net::execute_with_retry("llm", Duration::from_secs(15), net::default_max_retries(), || {
            client
                .post(url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
        })
        .await?;

        let parsed: serde_json::Value = response.json().await?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let estimated_tokens = (doc.text.len() / 4) as u32;
        self.cost.add(tier.estimated_cost_cents(estimated_tokens));

        Ok(Analysis {
            summary: content,
            extracted_metrics: HashMap::new(),
            model_used: model.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_critical_item_codes_to_complex_tier() {
        assert_eq!(ModelTier::route(100, "5.02"), ModelTier::Complex);
        assert_eq!(ModelTier::route(100, "9.01"), ModelTier::Simple);
        assert_eq!(ModelTier::route(10_000, "9.01"), ModelTier::Medium);
    }

    #[test]
    fn cost_accumulator_disables_tiers_progressively() {
        let accumulator = CostAccumulator::new(5.0, 10.0, 20.0);
        assert_eq!(accumulator.max_allowed_tier(), Some(ModelTier::Complex));
        accumulator.add(600.0); // $6.00
        assert_eq!(accumulator.max_allowed_tier(), Some(ModelTier::Medium));
        accumulator.add(500.0); // total $11.00
        assert_eq!(accumulator.max_allowed_tier(), Some(ModelTier::Simple));
        accumulator.add(1000.0); // total $21.00
        assert_eq!(accumulator.max_allowed_tier(), None);
    }

    #[test]
    fn reset_clears_spend() {
        let accumulator = CostAccumulator::new(5.0, 10.0, 20.0);
        accumulator.add(2500.0);
        accumulator.reset();
        assert_eq!(accumulator.spent_usd(), 0.0);
    }

    #[tokio::test]
    async fn analyze_skips_docs_once_emergency_threshold_reached() {
        let cost = Arc::new(CostAccumulator::new(5.0, 10.0, 20.0));
        cost.add(2500.0); // $25: past emergency
        let client = LlmClient::new(
            Client::new(),
            "test-key".to_string(),
            cost,
            5,
            Duration::from_millis(50),
            60,
        );
        let docs = vec![SecDoc {
            doc_id: "doc-1".to_string(),
            item_code: "9.01".to_string(),
            text: "filing text".to_string(),
        }];
        let out = client.analyze(&docs).await;
        assert!(out.is_empty());
    }

    #[test]
    fn batch_size_and_timeout_are_never_zero() {
        let cost = Arc::new(CostAccumulator::new(5.0, 10.0, 20.0));
        let client = LlmClient::new(Client::new(), "k".to_string(), cost, 0, Duration::ZERO, 0);
        assert_eq!(client.batch_size, 1);
    }
}
