//! A generic HTTP JSON market-data vendor, implementing
//! [`crate::market_data::MarketDataProvider`] (spec.md §4.8).
//!
//! Grounded on the teacher's `DomeScraper` (`scrapers/dome.rs`): a
//! `Client` + `base_url` + `api_key`, one small struct per upstream
//! response shape, retried via [`crate::net::execute_with_retry`]. Several
//! of these, constructed with different base URLs/keys, form the priority
//! fallback chain `MarketDataClient` expects.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::market_data::{FloatResult, MarketDataProvider, PriceQuote, RvolResult, VwapResult};
use crate::net;

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
    #[serde(default)]
    change_pct: f64,
}

#[derive(Debug, Deserialize)]
struct RvolResponse {
    avg_volume: f64,
    rvol_multiplier: f64,
}

#[derive(Debug, Deserialize)]
struct FloatResponse {
    float_shares: f64,
}

#[derive(Debug, Deserialize)]
struct VwapResponse {
    vwap: f64,
}

pub struct VendorQuoteProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl VendorQuoteProvider {
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key,
            request_timeout,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, ticker: &str) -> anyhow::Result<T> {
        let url = format!("{}/{path}?symbol={ticker}", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let response = net::execute_with_retry(&self.name, self.request_timeout, 2, || {
            let mut request = client.get(&url);
            if let Some(key) = &api_key {
                request = request.bearer_auth(key);
            }
            request.send()
        })
        .await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MarketDataProvider for VendorQuoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn price(&self, ticker: &str) -> anyhow::Result<PriceQuote> {
        let resp: QuoteResponse = self.get_json("quote", ticker).await?;
        Ok(PriceQuote { price: resp.price, change_pct: resp.change_pct })
    }

    async fn rvol(&self, ticker: &str) -> anyhow::Result<RvolResult> {
        let resp: RvolResponse = self.get_json("rvol", ticker).await?;
        Ok(RvolResult { avg_volume: resp.avg_volume, rvol_multiplier: resp.rvol_multiplier })
    }

    async fn float(&self, ticker: &str) -> anyhow::Result<FloatResult> {
        let resp: FloatResponse = self.get_json("float", ticker).await?;
        Ok(FloatResult { float_shares: resp.float_shares })
    }

    async fn vwap(&self, ticker: &str) -> anyhow::Result<VwapResult> {
        let resp: VwapResponse = self.get_json("vwap", ticker).await?;
        Ok(VwapResult { vwap: resp.vwap })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_name_and_base_url() {
        let provider = VendorQuoteProvider::new(
            "vendor_a",
            reqwest::Client::new(),
            "https://vendor-a.example.com",
            None,
            Duration::from_secs(5),
        );
        assert_eq!(provider.name(), "vendor_a");
    }
}
