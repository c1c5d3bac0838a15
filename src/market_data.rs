//! Market-Data Client: cached batch price + RVOL/VWAP/float queries
//! (spec.md §4.8).
//!
//! Per-key cache with a per-field TTL (teacher's pattern of a short
//! critical section per key, `signals/enrichment.rs`), provider priority
//! fallback with per-provider [`CircuitBreaker`] and [`TokenBucket`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::rate_limiter::TokenBucket;

const PRICE_TTL: Duration = Duration::from_secs(60);
const FLOAT_TTL: Duration = Duration::from_secs(24 * 3600);
const RVOL_TTL: Duration = Duration::from_secs(5 * 60);
const VWAP_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceQuote {
    pub price: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RvolResult {
    pub avg_volume: f64,
    pub rvol_multiplier: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatResult {
    pub float_shares: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VwapResult {
    pub vwap: f64,
}

/// One upstream market-data vendor. Implementations are expected to be
/// stateless; caching and rate limiting live in [`MarketDataClient`], not here.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn price(&self, ticker: &str) -> anyhow::Result<PriceQuote>;
    async fn rvol(&self, ticker: &str) -> anyhow::Result<RvolResult>;
    async fn float(&self, ticker: &str) -> anyhow::Result<FloatResult>;
    async fn vwap(&self, ticker: &str) -> anyhow::Result<VwapResult>;
}

struct CacheEntry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

struct FieldCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Copy> FieldCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            let age = Utc::now() - entry.fetched_at;
            if age.to_std().map(|a| a < self.ttl).unwrap_or(false) {
                Some(entry.value)
            } else {
                None
            }
        })
    }

    fn put(&self, key: &str, value: T) {
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at: Utc::now(),
            },
        );
    }
}

struct ProviderSlot {
    provider: Arc<dyn MarketDataProvider>,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
}

/// Ordered priority list of providers (spec.md §4.8: "vendor A -> vendor B
/// -> vendor C, short-circuiting on the first success").
pub struct MarketDataClient {
    providers: Vec<ProviderSlot>,
    price_cache: FieldCache<PriceQuote>,
    rvol_cache: FieldCache<RvolResult>,
    float_cache: FieldCache<FloatResult>,
    vwap_cache: FieldCache<VwapResult>,
}

impl MarketDataClient {
    pub fn new(providers: Vec<(Arc<dyn MarketDataProvider>, u32, u32)>) -> Self {
        let providers = providers
            .into_iter()
            .map(|(provider, rate_capacity, rate_per_min)| ProviderSlot {
                provider,
                breaker: CircuitBreaker::new(3, Duration::from_secs(5 * 60)),
                bucket: TokenBucket::new(rate_capacity, rate_per_min),
            })
            .collect();

        Self {
            providers,
            price_cache: FieldCache::new(PRICE_TTL),
            rvol_cache: FieldCache::new(RVOL_TTL),
            float_cache: FieldCache::new(FLOAT_TTL),
            vwap_cache: FieldCache::new(VWAP_TTL),
        }
    }

    async fn fallthrough<T, F, Fut>(&self, cache: &FieldCache<T>, key: &str, call: F) -> Option<T>
    where
        T: Copy,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        if let Some(cached) = cache.get(key) {
            return Some(cached);
        }

        for slot in &self.providers {
            if !slot.breaker.allow_request() {
                continue;
            }
            if !slot.bucket.try_acquire() {
                continue;
            }
            match call(slot.provider.clone()).await {
                Ok(value) => {
                    slot.breaker.record_success();
                    cache.put(key, value);
                    return Some(value);
                }
                Err(err) => {
                    warn!(provider = slot.provider.name(), ticker = key, error = %err, "market-data call failed");
                    slot.breaker.record_failure();
                }
            }
        }

        None
    }

    pub async fn get_price(&self, ticker: &str) -> Option<PriceQuote> {
        self.fallthrough(&self.price_cache, ticker, |p| async move { p.price(ticker).await }).await
    }

    pub async fn get_rvol(&self, ticker: &str) -> Option<RvolResult> {
        self.fallthrough(&self.rvol_cache, ticker, |p| async move { p.rvol(ticker).await }).await
    }

    pub async fn get_float(&self, ticker: &str) -> Option<FloatResult> {
        self.fallthrough(&self.float_cache, ticker, |p| async move { p.float(ticker).await }).await
    }

    pub async fn get_vwap(&self, ticker: &str) -> Option<VwapResult> {
        self.fallthrough(&self.vwap_cache, ticker, |p| async move { p.vwap(ticker).await }).await
    }

    /// spec.md §4.8: fans out concurrently, bounded by `deadline`, returns
    /// partial results on timeout rather than failing the whole batch.
    pub async fn batch_get_prices(
        &self,
        tickers: &[String],
        deadline: Duration,
    ) -> HashMap<String, PriceQuote> {
        let futures = tickers.iter().map(|ticker| async move {
            (ticker.clone(), self.get_price(ticker).await)
        });

        let results = match tokio::time::timeout(deadline, futures::future::join_all(futures)).await {
            Ok(results) => results,
            Err(_) => {
                warn!(tickers = tickers.len(), "batch price fetch exceeded cycle deadline");
                Vec::new()
            }
        };

        results
            .into_iter()
            .filter_map(|(ticker, quote)| quote.map(|q| (ticker, q)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        name: String,
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl MarketDataProvider for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn price(&self, _ticker: &str) -> anyhow::Result<PriceQuote> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("simulated failure");
            }
            Ok(PriceQuote { price: 4.20, change_pct: 1.5 })
        }

        async fn rvol(&self, _ticker: &str) -> anyhow::Result<RvolResult> {
            Ok(RvolResult::default())
        }

        async fn float(&self, _ticker: &str) -> anyhow::Result<FloatResult> {
            Ok(FloatResult::default())
        }

        async fn vwap(&self, _ticker: &str) -> anyhow::Result<VwapResult> {
            Ok(VwapResult::default())
        }
    }

    #[tokio::test]
    async fn caches_successful_price_lookup() {
        let provider: Arc<dyn MarketDataProvider> = Arc::new(FlakyProvider {
            name: "vendor_a".to_string(),
            fail_times: AtomicU32::new(0),
        });
        let client = MarketDataClient::new(vec![(provider, 10, 600)]);
        let first = client.get_price("ACME").await.unwrap();
        assert_eq!(first.price, 4.20);
        let second = client.get_price("ACME").await.unwrap();
        assert_eq!(second.price, first.price);
    }

    #[tokio::test]
    async fn falls_through_to_second_provider_on_failure() {
        let failing: Arc<dyn MarketDataProvider> = Arc::new(FlakyProvider {
            name: "vendor_a".to_string(),
            fail_times: AtomicU32::new(100),
        });
        let working: Arc<dyn MarketDataProvider> = Arc::new(FlakyProvider {
            name: "vendor_b".to_string(),
            fail_times: AtomicU32::new(0),
        });
        let client = MarketDataClient::new(vec![(failing, 10, 600), (working, 10, 600)]);
        let result = client.get_price("ACME").await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn batch_price_returns_partial_on_short_deadline() {
        let provider: Arc<dyn MarketDataProvider> = Arc::new(FlakyProvider {
            name: "vendor_a".to_string(),
            fail_times: AtomicU32::new(0),
        });
        let client = MarketDataClient::new(vec![(provider, 10, 600)]);
        let tickers = vec!["ACME".to_string(), "OTHR".to_string()];
        let prices = client.batch_get_prices(&tickers, Duration::from_secs(5)).await;
        assert_eq!(prices.len(), 2);
    }
}
