//! SEC EDGAR full-text/filing feed source. Stores the accession number in
//! `raw_fields` so fingerprinting can key SEC items on `(cik,
//! accession_number)` instead of fuzzy title matching (spec.md §4.2,
//! SPEC_FULL.md Open Questions).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::FeedSource;
use crate::models::{NewsItem, RawFieldValue};
use crate::net;

#[derive(Debug, Deserialize)]
struct EdgarEntry {
    accession_number: String,
    cik: String,
    form_type: String,
    company_name: String,
    filed_at: DateTime<Utc>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct EdgarResponse {
    #[serde(default)]
    filings: Vec<EdgarEntry>,
}

pub struct SecFeedSource {
    client: Client,
    url: String,
    name: String,
    weight: f64,
    timeout: Duration,
}

impl SecFeedSource {
    pub fn new(url: impl Into<String>, weight: f64, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("catalyst-bot/0.1 (contact: ops@example.com)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
            name: "sec_edgar".to_string(),
            weight,
            timeout,
        }
    }
}

#[async_trait]
impl FeedSource for SecFeedSource {
    async fn fetch(&self) -> anyhow::Result<Vec<NewsItem>> {
        let url = self.url.clone();
        let client = self.client.clone();

        let response =
            net::execute_with_retry(&self.name, self.timeout, net::default_max_retries(), || {
                client.get(&url).send()
            })
            .await?;

        let parsed: EdgarResponse = response.json().await?;

        let items = parsed
            .filings
            .into_iter()
            .map(|f| {
                let mut raw_fields = HashMap::new();
                raw_fields.insert(
                    "accession_number".to_string(),
                    RawFieldValue::Str(f.accession_number.clone()),
                );
                raw_fields.insert("cik".to_string(), RawFieldValue::Str(f.cik.clone()));
                raw_fields.insert("form_type".to_string(), RawFieldValue::Str(f.form_type.clone()));

                NewsItem {
                    source: "sec_filing".to_string(),
                    source_id: f.accession_number,
                    canonical_url: f.url,
                    title: format!("{} files {}", f.company_name, f.form_type),
                    summary: String::new(),
                    published_at: f.filed_at,
                    tickers: Vec::new(),
                    raw_fields,
                }
            })
            .collect();

        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}
