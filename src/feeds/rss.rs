//! RSS/Atom feed source via `feed-rs`, with conditional GET (`ETag`/
//! `If-Modified-Since`) so unchanged feeds cost a 304 instead of a full
//! re-parse (spec.md §4.2).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, warn};

use super::FeedSource;
use crate::models::{NewsItem, RawFieldValue};
use crate::net;

#[derive(Default)]
struct ConditionalState {
    etag: Option<String>,
    last_modified: Option<String>,
}

pub struct RssFeedSource {
    client: Client,
    url: String,
    name: String,
    weight: f64,
    timeout: Duration,
    state: Mutex<ConditionalState>,
}

impl RssFeedSource {
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
            state: Mutex::new(ConditionalState::default()),
        }
    }

    fn strip_html(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut in_tag = false;
        for ch in input.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => out.push(ch),
                _ => {}
            }
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self) -> anyhow::Result<Vec<NewsItem>> {
        let (etag, last_modified) = {
            let state = self.state.lock();
            (state.etag.clone(), state.last_modified.clone())
        };

        let url = self.url.clone();
        let client = self.client.clone();
        let etag_header = etag.clone();
        let last_modified_header = last_modified.clone();

        let response = net::execute_with_retry(&self.name, self.timeout, net::default_max_retries(), || {
            let mut req = client.get(&url);
            if let Some(ref tag) = etag_header {
                req = req.header(reqwest::header::IF_NONE_MATCH, tag);
            }
            if let Some(ref lm) = last_modified_header {
                req = req.header(reqwest::header::IF_MODIFIED_SINCE, lm);
            }
            req.send()
        })
        .await?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            debug!(source = %self.name, "feed not modified since last fetch");
            return Ok(Vec::new());
        }

        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let new_last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await?;
        let feed = feed_rs::parser::parse(&body[..])
            .map_err(|err| anyhow::anyhow!("feed parse error for {}: {err}", self.name))?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "(untitled)".to_string());
            let summary = entry
                .summary
                .map(|s| Self::strip_html(&s.content))
                .unwrap_or_default();
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let published_at = entry
                .published
                .or(entry.updated)
                .unwrap_or_else(Utc::now);

            items.push(NewsItem {
                source: self.name.clone(),
                source_id: entry.id,
                canonical_url: link,
                title,
                summary,
                published_at,
                tickers: Vec::new(),
                raw_fields: HashMap::from([(
                    "feed_kind".to_string(),
                    RawFieldValue::Str("rss".to_string()),
                )]),
            });
        }

        {
            let mut state = self.state.lock();
            if new_etag.is_some() {
                state.etag = new_etag;
            }
            if new_last_modified.is_some() {
                state.last_modified = new_last_modified;
            }
        }

        if items.is_empty() {
            warn!(source = %self.name, "feed returned zero entries");
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
    fn strip_html_removes_tags_and_collapses_whitespace() {
        let input = "<p>Hello   <b>world</b></p>\n<br/>again";
        assert_eq!(RssFeedSource::strip_html(input), "Hello world again");
    }

    #[test]
    fn construction_sets_name_and_weight() {
        let source = RssFeedSource::new("globenewswire", "https://example.com/rss", 1.2, Duration::from_secs(5));
        assert_eq!(source.name(), "globenewswire");
        assert_eq!(source.weight(), 1.2);
    }
}
