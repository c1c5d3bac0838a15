//! Feed Fetchers: heterogeneous ingestion sources, each behind one small
//! capability trait (spec.md §4.2, §9 "Plugin-like per-source behavior").
//!
//! Grounded on the `NewsProvider` trait pattern (`other_examples/
//! .../news_aggregator.rs.rs`) and the teacher's one-struct-per-source style
//! in `scrapers/dome.rs`.

mod rss;
mod sec;
mod vendor_json;

pub use rss::RssFeedSource;
pub use sec::SecFeedSource;
pub use vendor_json::VendorJsonFeedSource;

use async_trait::async_trait;

use crate::models::NewsItem;

/// A single ingestion source. `fetch` returns whatever is new since the
/// previous call — conditional-GET state, if any, is kept inside the
/// implementation, not passed in, since callers only care about new items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<NewsItem>>;

    fn name(&self) -> &str;

    /// Relative trust weight for conflicting metadata across sources
    /// (spec.md §4.2); higher wins on ties.
    fn weight(&self) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch(&self) -> anyhow::Result<Vec<NewsItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn trait_object_is_dyn_safe_and_callable() {
        let source: Box<dyn FeedSource> = Box::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let items = source.fetch().await.unwrap();
        assert!(items.is_empty());
        assert_eq!(source.weight(), 1.0);
    }
}
