//! Enrichment Pool: fan-out-compute-fan-in float/RVOL/VWAP enrichment for
//! the unique tickers of a cycle (spec.md §4.9).
//!
//! Directly generalizes the teacher's `DomeEnrichmentService`
//! (`signals/enrichment.rs`): one `Arc<Semaphore>` per inner pool bounding
//! concurrency, a per-ticker timeout, and the three inner fan-outs run in
//! parallel via `tokio::join!`. Per-ticker failures are swallowed into a
//! nil field rather than aborting the batch — the classifier treats a
//! missing multiplier as neutral (1.0), so there is nothing to propagate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

use crate::market_data::MarketDataClient;
use crate::models::EnrichmentRecord;

pub struct EnrichmentPoolConfig {
    pub float_workers: usize,
    pub rvol_workers: usize,
    pub vwap_workers: usize,
    pub per_ticker_timeout: Duration,
}

impl Default for EnrichmentPoolConfig {
    fn default() -> Self {
        Self {
            float_workers: 10,
            rvol_workers: 15,
            vwap_workers: 15,
            per_ticker_timeout: Duration::from_secs(30),
        }
    }
}

pub struct EnrichmentPool {
    market_data: Arc<MarketDataClient>,
    float_sem: Arc<Semaphore>,
    rvol_sem: Arc<Semaphore>,
    vwap_sem: Arc<Semaphore>,
    per_ticker_timeout: Duration,
}

impl EnrichmentPool {
    pub fn new(market_data: Arc<MarketDataClient>, config: EnrichmentPoolConfig) -> Self {
        Self {
            market_data,
            float_sem: Arc::new(Semaphore::new(config.float_workers.max(1))),
            rvol_sem: Arc::new(Semaphore::new(config.rvol_workers.max(1))),
            vwap_sem: Arc::new(Semaphore::new(config.vwap_workers.max(1))),
            per_ticker_timeout: config.per_ticker_timeout,
        }
    }

    /// Idempotent and stateless across cycles: takes the unique tickers of
    /// the current cycle and returns whatever enrichment arrived in time.
    pub async fn enrich(&self, tickers: &[String]) -> HashMap<String, EnrichmentRecord> {
        let prices = self
            .market_data
            .batch_get_prices(tickers, self.per_ticker_timeout)
            .await;

        let (float_results, rvol_results, vwap_results) = tokio::join!(
            self.fan_out_float(tickers),
            self.fan_out_rvol(tickers),
            self.fan_out_vwap(tickers),
        );

        let mut out = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            let mut record = EnrichmentRecord::empty(ticker);
            let mut sources = Vec::new();

            if let Some(quote) = prices.get(ticker) {
                record.last_price = Some(quote.price);
                record.change_pct = Some(quote.change_pct);
                sources.push("price".to_string());
            }
            if let Some(float) = float_results.get(ticker) {
                record.float_shares = Some(float.float_shares);
                sources.push("float".to_string());
            }
            if let Some(rvol) = rvol_results.get(ticker) {
                record.avg_volume = Some(rvol.avg_volume);
                record.rvol_multiplier = Some(rvol.rvol_multiplier);
                sources.push("rvol".to_string());
            }
            if let Some(vwap) = vwap_results.get(ticker) {
                record.vwap = Some(vwap.vwap);
                sources.push("vwap".to_string());
            }

            record.as_of = Some(chrono::Utc::now());
            record.sources_used = sources;
            out.insert(ticker.clone(), record);
        }

        out
    }

    async fn fan_out_float(&self, tickers: &[String]) -> HashMap<String, crate::market_data::FloatResult> {
        let futures = tickers.iter().map(|ticker| {
            let sem = self.float_sem.clone();
            let market_data = self.market_data.clone();
            let per_ticker_timeout = self.per_ticker_timeout;
            let ticker = ticker.clone();
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (ticker, None);
                };
                let result = timeout(per_ticker_timeout, market_data.get_float(&ticker)).await;
                match result {
                    Ok(Some(value)) => (ticker, Some(value)),
                    Ok(None) => (ticker, None),
                    Err(_) => {
                        warn!(ticker, "float enrichment timed out");
                        (ticker, None)
                    }
                }
            }
        });
        join_all(futures)
            .await
            .into_iter()
            .filter_map(|(ticker, value)| value.map(|v| (ticker, v)))
            .collect()
    }

    async fn fan_out_rvol(&self, tickers: &[String]) -> HashMap<String, crate::market_data::RvolResult> {
        let futures = tickers.iter().map(|ticker| {
            let sem = self.rvol_sem.clone();
            let market_data = self.market_data.clone();
            let per_ticker_timeout = self.per_ticker_timeout;
            let ticker = ticker.clone();
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (ticker, None);
                };
                let result = timeout(per_ticker_timeout, market_data.get_rvol(&ticker)).await;
                match result {
                    Ok(Some(value)) => (ticker, Some(value)),
                    Ok(None) => (ticker, None),
                    Err(_) => {
                        warn!(ticker, "rvol enrichment timed out");
                        (ticker, None)
                    }
                }
            }
        });
        join_all(futures)
            .await
            .into_iter()
            .filter_map(|(ticker, value)| value.map(|v| (ticker, v)))
            .collect()
    }

    async fn fan_out_vwap(&self, tickers: &[String]) -> HashMap<String, crate::market_data::VwapResult> {
        let futures = tickers.iter().map(|ticker| {
            let sem = self.vwap_sem.clone();
            let market_data = self.market_data.clone();
            let per_ticker_timeout = self.per_ticker_timeout;
            let ticker = ticker.clone();
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (ticker, None);
                };
                let result = timeout(per_ticker_timeout, market_data.get_vwap(&ticker)).await;
                match result {
                    Ok(Some(value)) => (ticker, Some(value)),
                    Ok(None) => (ticker, None),
                    Err(_) => {
                        warn!(ticker, "vwap enrichment timed out");
                        (ticker, None)
                    }
                }
            }
        });
        join_all(futures)
            .await
            .into_iter()
            .filter_map(|(ticker, value)| value.map(|v| (ticker, v)))
            .collect()
    }
}
