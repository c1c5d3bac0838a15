//! Webhook Poster: rate-limited, retrying HTTP POST to the alert channel
//! (spec.md §4.12).
//!
//! The retry/backoff shape is the same as the teacher's
//! `DomeScraper::execute_with_retry` ([`crate::net::execute_with_retry`]),
//! capped here at 3s per spec.md §4.12 rather than the general 30s cap,
//! and bounded to 2 retries rather than 5. Per-key rate limiting and jitter
//! are layered in front of the POST itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::models::Alert;
use crate::rate_limiter::TokenBucket;

const MAX_RETRIES: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<WebhookEmbed<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WebhookEmbed<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    color: u32,
    fields: Vec<WebhookField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<WebhookFooter<'a>>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct WebhookFooter<'a> {
    text: &'a str,
}

#[derive(Debug)]
pub enum PostOutcome {
    Posted { message_id: Option<String> },
    Failed { status: Option<u16> },
}

pub struct WebhookPoster {
    client: Client,
    url: String,
    jitter_ms: u64,
    key_rate_limit_per_min: u32,
    /// spec.md §4.12: "key = (ticker, title, canonical_url)" — one token
    /// bucket per distinct key, created lazily on first use. `Arc` so a
    /// bucket can be cloned out from under the lock before `acquire`
    /// awaits, instead of holding the lock across an await point.
    key_buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl WebhookPoster {
    pub fn new(client: Client, url: String, jitter_ms: u64, key_rate_limit_per_min: u32) -> Self {
        Self {
            client,
            url,
            jitter_ms,
            key_rate_limit_per_min,
            key_buckets: Mutex::new(HashMap::new()),
        }
    }

    fn rate_limit_key(alert: &Alert) -> String {
        format!("{}\u{0}{}\u{0}{}", alert.ticker, alert.title, alert.link)
    }

    fn key_bucket(&self, alert: &Alert) -> Arc<TokenBucket> {
        let key = Self::rate_limit_key(alert);
        let rate = self.key_rate_limit_per_min;
        let mut buckets = self.key_buckets.lock();
        buckets
            .entry(key)
            .or_insert_with(|| Arc::new(TokenBucket::new(rate, rate)))
            .clone()
    }

    /// spec.md §4.12: 429/5xx get bounded retry capped at 3s between
    /// attempts; 4xx (non-429) never retry. On success, never re-posts the
    /// same idempotency key once a 2xx response is observed.
    pub async fn post(&self, alert: &Alert) -> PostOutcome {
        if self.key_rate_limit_per_min > 0 {
            let bucket = self.key_bucket(alert);
            bucket.acquire().await;
        }

        if self.jitter_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
            sleep(Duration::from_millis(jitter)).await;
        }

        let body = WebhookBody {
            content: Some(alert.content_text.as_str()),
            embeds: vec![WebhookEmbed {
                title: alert.embed.title.as_str(),
                url: alert.embed.url.as_deref(),
                color: alert.embed.color,
                fields: alert
                    .embed
                    .fields
                    .iter()
                    .map(|f| WebhookField {
                        name: f.name.as_str(),
                        value: f.value.as_str(),
                        inline: f.inline,
                    })
                    .collect(),
                footer: alert.embed.footer.as_deref().map(|text| WebhookFooter { text }),
                timestamp: alert.embed.timestamp.to_rfc3339(),
            }],
            components: alert.components.as_ref(),
        };

        let mut backoff = Duration::from_millis(200);

        for attempt in 0..=MAX_RETRIES {
            let response = self.client.post(&self.url).json(&body).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let message_id = response
                            .json::<serde_json::Value>()
                            .await
                            .ok()
                            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(String::from)));
                        info!(idempotency_key = %alert.idempotency_key, "alert posted");
                        return PostOutcome::Posted { message_id };
                    }

                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or(backoff);
                        warn!(attempt, "webhook rate limited, honoring retry-after");
                        sleep(retry_after.min(MAX_BACKOFF)).await;
                    } else if status.is_server_error() {
                        warn!(attempt, status = %status, "webhook server error, retrying");
                        sleep(backoff).await;
                    } else {
                        warn!(status = %status, "webhook permanent error, not retrying");
                        return PostOutcome::Failed { status: Some(status.as_u16()) };
                    }
                }
                Err(err) => {
                    warn!(attempt, error = %err, "webhook post failed");
                    sleep(backoff).await;
                }
            }

            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        PostOutcome::Failed { status: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Embed, EmbedField};

    fn sample_alert() -> Alert {
        Alert {
            ticker: "ACME".to_string(),
            title: "Acme wins FDA approval".to_string(),
            link: "https://example.com".to_string(),
            content_text: "$ACME: Acme wins FDA approval".to_string(),
            embed: Embed {
                title: "Acme wins FDA approval".to_string(),
                url: Some("https://example.com".to_string()),
                color: 0x2ECC71,
                fields: vec![EmbedField {
                    name: "Ticker".to_string(),
                    value: "$ACME".to_string(),
                    inline: true,
                }],
                footer: Some("prnewswire".to_string()),
                timestamp: chrono::Utc::now(),
            },
            components: None,
            idempotency_key: "abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn fails_permanently_against_unreachable_host_without_hanging() {
        let client = Client::new();
        let poster = WebhookPoster::new(client, "http://127.0.0.1:1".to_string(), 0, 0);
        let alert = sample_alert();
        let outcome = poster.post(&alert).await;
        assert!(matches!(outcome, PostOutcome::Failed { .. }));
    }

    #[test]
    fn rate_limit_key_is_scoped_to_ticker_title_and_link() {
        let poster = WebhookPoster::new(Client::new(), "http://127.0.0.1:1".to_string(), 0, 60);
        let a = sample_alert();
        let mut b = sample_alert();
        b.ticker = "OTHR".to_string();

        let bucket_a = poster.key_bucket(&a);
        let bucket_a_again = poster.key_bucket(&a);
        let bucket_b = poster.key_bucket(&b);

        assert!(Arc::ptr_eq(&bucket_a, &bucket_a_again));
        assert!(!Arc::ptr_eq(&bucket_a, &bucket_b));
    }
}
