//! Vendor JSON news feed source with a documented field mapping and the
//! same conditional-GET support as `RssFeedSource` (spec.md §4.2).
//!
//! Grounded on the vendor-JSON loader-with-caching pattern in
//! `other_examples/.../news_loader.rs.rs`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;

use super::FeedSource;
use crate::models::{NewsItem, RawFieldValue};
use crate::net;

#[derive(Debug, Deserialize)]
struct VendorArticle {
    id: String,
    headline: String,
    #[serde(default)]
    summary: String,
    url: String,
    published_utc: DateTime<Utc>,
    #[serde(default)]
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VendorResponse {
    #[serde(default)]
    results: Vec<VendorArticle>,
}

pub struct VendorJsonFeedSource {
    client: Client,
    url: String,
    name: String,
    weight: f64,
    timeout: Duration,
    last_etag: Mutex<Option<String>>,
}

impl VendorJsonFeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, weight: f64, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
            name: name.into(),
            weight,
            timeout,
            last_etag: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FeedSource for VendorJsonFeedSource {
    async fn fetch(&self) -> anyhow::Result<Vec<NewsItem>> {
        let etag = self.last_etag.lock().clone();
        let url = self.url.clone();
        let client = self.client.clone();
        let etag_header = etag.clone();

        let response = net::execute_with_retry(&self.name, self.timeout, net::default_max_retries(), || {
            let mut req = client.get(&url);
            if let Some(ref tag) = etag_header {
                req = req.header(reqwest::header::IF_NONE_MATCH, tag);
            }
            req.send()
        })
        .await?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(Vec::new());
        }

        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let parsed: VendorResponse = response.json().await?;

        let items = parsed
            .results
            .into_iter()
            .map(|a| NewsItem {
                source: self.name.clone(),
                source_id: a.id,
                canonical_url: a.url,
                title: a.headline,
                summary: a.summary,
                published_at: a.published_utc,
                tickers: a.tickers,
                raw_fields: HashMap::from([(
                    "feed_kind".to_string(),
                    RawFieldValue::Str("vendor_json".to_string()),
                )]),
            })
            .collect();

        if let Some(tag) = new_etag {
            *self.last_etag.lock() = Some(tag);
        }

        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_vendor_payload_field_mapping() {
        let json = r#"{"results":[{"id":"a1","headline":"Acme wins FDA approval","summary":"s","url":"https://x","published_utc":"2024-01-01T00:00:00Z","tickers":["ACME"]}]}"#;
        let parsed: VendorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].tickers, vec!["ACME".to_string()]);
    }
}
