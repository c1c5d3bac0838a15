//! Cycle Orchestrator: wires every component into the per-cycle pipeline
//! (spec.md §4.1, §4.14, §4.15; SPEC_FULL.md §4.1 expansion).
//!
//! Single-threaded across cycles (spec.md §5: "no overlap"). Shutdown is a
//! `tokio::sync::watch<bool>` flag threaded through the loop, the idiomatic
//! equivalent of the teacher's `Arc`-shared shutdown state in `main.rs`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::dedup;
use crate::enrichment::EnrichmentPool;
use crate::events_log::{Event, EventsLog};
use crate::feeds::FeedSource;
use crate::fingerprint;
use crate::gates::{GateOutcome, Gates};
use crate::health::HealthState;
use crate::llm::{Analysis, LlmClient, SecDoc};
use crate::models::{Alert, CycleStats, NewsItem, ScoredItem, SeenRecord};
use crate::seen_store::SeenStore;
use crate::sentiment::SentimentAggregator;
use crate::webhook::{PostOutcome, WebhookPoster};
use crate::{alert::AlertFormatter, classifier::Classifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarketSession {
    Open,
    Extended,
    Closed,
}

/// UTC-offset approximation of US market hours (no DST handling — good
/// enough for cadence selection, not a trading-hours source of truth).
fn market_session(now: chrono::DateTime<Utc>) -> MarketSession {
    let minutes_of_day = now.hour() * 60 + now.minute();
    const OPEN: u32 = 13 * 60 + 30; // 09:30 ET
    const CLOSE: u32 = 20 * 60; // 16:00 ET
    const PRE: u32 = 9 * 60; // 04:00 ET
    const POST: u32 = 24 * 60; // 20:00 ET
    if minutes_of_day >= OPEN && minutes_of_day < CLOSE {
        MarketSession::Open
    } else if minutes_of_day >= PRE && minutes_of_day < POST {
        MarketSession::Extended
    } else {
        MarketSession::Closed
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    sources: Vec<Box<dyn FeedSource>>,
    seen_store: SeenStore,
    ticker_resolver: crate::ticker_resolver::TickerResolver,
    classifier: Classifier,
    sentiment: SentimentAggregator,
    enrichment: EnrichmentPool,
    webhook: WebhookPoster,
    admin_webhook: Option<WebhookPoster>,
    events_log: EventsLog,
    health: Arc<HealthState>,
    llm: Option<LlmClient>,
    cycle_counter: AtomicU64,
    consecutive_empty_cycles: AtomicU64,
    deferred: tokio::sync::Mutex<VecDeque<ScoredItem>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        sources: Vec<Box<dyn FeedSource>>,
        seen_store: SeenStore,
        ticker_resolver: crate::ticker_resolver::TickerResolver,
        classifier: Classifier,
        sentiment: SentimentAggregator,
        enrichment: EnrichmentPool,
        webhook: WebhookPoster,
        admin_webhook: Option<WebhookPoster>,
        events_log: EventsLog,
        health: Arc<HealthState>,
        llm: Option<LlmClient>,
    ) -> Self {
        Self {
            config,
            sources,
            seen_store,
            ticker_resolver,
            classifier,
            sentiment,
            enrichment,
            webhook,
            admin_webhook,
            events_log,
            health,
            llm,
            cycle_counter: AtomicU64::new(0),
            consecutive_empty_cycles: AtomicU64::new(0),
            deferred: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Batches every SEC-sourced item among `items` through the LLM client,
    /// keyed by fingerprint hex (spec.md §4.10: batched, cached analysis).
    /// Returns an empty map when no LLM client is configured or none of
    /// `items` came from a SEC feed.
    async fn run_llm_analysis(&self, items: &[ScoredItem]) -> HashMap<String, Analysis> {
        let Some(llm) = &self.llm else {
            return HashMap::new();
        };

        let batch: Vec<SecDoc> = items
            .iter()
            .filter(|scored| scored.item.is_sec())
            .map(|scored| {
                let item_code = match scored.item.raw_fields.get("form_type") {
                    Some(crate::models::RawFieldValue::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                SecDoc {
                    doc_id: scored.fingerprint.to_hex(),
                    item_code,
                    text: format!("{}\n\n{}", scored.item.title, scored.item.summary),
                }
            })
            .collect();

        if batch.is_empty() {
            return HashMap::new();
        }

        llm.analyze(&batch).await
    }

    /// Runs cycles until `shutdown` flips true. When `config.once` is set,
    /// runs exactly one cycle regardless of the shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.run_cycle().await;

            if self.config.once {
                return;
            }
            if *shutdown.borrow() {
                info!("shutdown signal observed, not starting a new cycle");
                return;
            }

            let cadence = self.cadence_for(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(cadence) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    fn cadence_for(&self, now: chrono::DateTime<Utc>) -> Duration {
        match market_session(now) {
            MarketSession::Open => Duration::from_secs(self.config.market_open_cycle_sec),
            MarketSession::Extended => Duration::from_secs(self.config.extended_hours_cycle_sec),
            MarketSession::Closed => Duration::from_secs(self.config.market_closed_cycle_sec),
        }
    }

    async fn run_cycle(&self) {
        let cycle_id = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let correlation_id = Uuid::new_v4();
        let started_at = std::time::Instant::now();

        async move {
            let stats = self.execute_cycle(cycle_id).await;
            let duration_ms = started_at.elapsed().as_millis() as u64;

            if !stats.accounting_balances() {
                warn!(cycle_id, "cycle accounting did not balance");
            }

            if stats.is_empty_cycle() {
                let consecutive = self.consecutive_empty_cycles.fetch_add(1, Ordering::SeqCst) + 1;
                if consecutive as u32 >= self.config.alert_consecutive_empty_cycles {
                    self.notify_admin(&format!(
                        "{consecutive} consecutive empty cycles (cycle {cycle_id})"
                    ))
                    .await;
                }
                self.health.record_cycle(stats.clone(), consecutive as u32);
            } else {
                self.consecutive_empty_cycles.store(0, Ordering::SeqCst);
                self.health.record_cycle(stats.clone(), 0);
            }

            self.events_log.record(&Event::CycleCompleted {
                cycle_id,
                fetched: stats.fetched,
                alerts_sent: stats.alerts_sent,
                duration_ms,
            });

            info!(
                cycle_id,
                fetched = stats.fetched,
                deduped = stats.deduped,
                alerts_sent = stats.alerts_sent,
                alerts_failed = stats.alerts_failed,
                duration_ms,
                "cycle completed"
            );
        }
        .instrument(info_span!("cycle", cycle_id, %correlation_id))
        .await;
    }

    async fn execute_cycle(&self, cycle_id: u64) -> CycleStats {
        let mut stats = CycleStats::new(cycle_id);

        let weights = crate::weights::load(
            &self.config.dynamic_weights_path,
            self.config.default_category_weight,
        )
        .await;

        let fetched_items = self.fetch_all().await;
        stats.fetched = fetched_items.len() as u64;

        let mut deferred = self.deferred.lock().await;
        let carried_over: Vec<ScoredItem> = deferred.drain(..).collect();
        drop(deferred);
        stats.fetched += carried_over.len() as u64;

        // Remember which fingerprints were carried over so the final
        // ranking pass can give them FIFO priority instead of letting a
        // low-score-but-old item get re-sorted behind fresh high scorers
        // every cycle (spec.md §5: "across cycles, ordering is by cycle
        // arrival"; SPEC_FULL.md's Open-Questions resolution).
        let carried_fingerprints: std::collections::HashSet<crate::models::Fingerprint> =
            carried_over.iter().map(|s| s.fingerprint).collect();

        let mut scaffolds: Vec<ScoredItem> = Vec::with_capacity(fetched_items.len() + carried_over.len());
        for (item, source_weight) in fetched_items {
            if self.passes_intake(&item) {
                scaffolds.push(scaffold(item, source_weight));
            } else {
                stats.skip("skipped_stale");
            }
        }
        scaffolds.extend(carried_over);

        let (deduped, dedup_stats) = dedup::dedup_cycle(scaffolds, self.config.fuzzy_similarity_threshold);
        stats.deduped = (dedup_stats.exact_collapsed + dedup_stats.fuzzy_collapsed) as u64;
        for _ in 0..stats.deduped {
            // Collapsed duplicates never reach a gate; fold them into the
            // skipped-by-reason map so P6's fetched == sent+failed+Σskipped
            // + dropped_error holds even on cycles with exact/fuzzy collisions.
            stats.skip("skipped_duplicate");
        }

        let mut resolved = Vec::with_capacity(deduped.len());
        for mut scored in deduped {
            match self.seen_store.contains(&scored.fingerprint.to_hex()) {
                Ok(true) => {
                    stats.skip("skipped_already_seen");
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "seen-store lookup failed, treating as unseen");
                }
            }

            let Some(resolution) = self.ticker_resolver.resolve(&scored.item) else {
                stats.skip("skipped_no_ticker");
                continue;
            };
            scored.primary_ticker = resolution.primary.first().cloned();
            scored.secondary_tickers = resolution
                .primary
                .iter()
                .skip(1)
                .chain(resolution.secondary.iter())
                .cloned()
                .collect();
            scored.relevance_scores = resolution.relevance_scores;
            resolved.push(scored);
        }

        let unique_tickers: Vec<String> = {
            let mut set = std::collections::HashSet::new();
            for scored in &resolved {
                if let Some(t) = &scored.primary_ticker {
                    set.insert(t.clone());
                }
            }
            set.into_iter().collect()
        };
        // spec.md §4.8: batch price/enrichment must return within a single
        // cycle deadline, with partial results on timeout; missing fields
        // are nil and scoring proceeds (gates/classifier treat them as
        // neutral), so a timed-out enrichment degrades to an empty map
        // rather than failing the cycle.
        let enrichment = match tokio::time::timeout(
            self.config.cycle_deadline(),
            self.enrichment.enrich(&unique_tickers),
        )
        .await
        {
            Ok(map) => map,
            Err(_) => {
                warn!("enrichment exceeded cycle deadline, proceeding with no enrichment data");
                HashMap::new()
            }
        };
        stats.enriched = enrichment.len() as u64;

        let mut classified = Vec::with_capacity(resolved.len());
        for mut scored in resolved {
            let result = self.classifier.classify_full(&scored.item, &weights);
            scored.keyword_hits = result.keyword_hits;
            scored.catalyst_score = result.catalyst_score;
            scored.sentiment = self.sentiment.aggregate(&scored.item, None, None, None).await;
            scored.classification_ts = Utc::now();
            stats.classified += 1;
            classified.push(scored);
        }

        let mut passing = Vec::new();
        let gates = Gates::new(&self.config);
        for scored in classified {
            let ticker_enrichment = scored
                .primary_ticker
                .as_ref()
                .and_then(|t| enrichment.get(t));
            match gates.evaluate(&scored, ticker_enrichment) {
                GateOutcome::Pass => passing.push(scored),
                GateOutcome::Reject(reason) => {
                    stats.skip(reason);
                    self.events_log.record(&Event::ItemRejected {
                        gate: reason,
                        source: &scored.item.source,
                        cycle_id,
                    });
                }
            }
        }

        // Carried-over items post FIFO (oldest first) ahead of this
        // cycle's fresh arrivals, which are still ranked by score; only
        // once every deferred item has a shot at a slot does the cap
        // start eating into the freshly classified ones. This keeps a
        // low-score-but-old deferred item from being starved indefinitely
        // by a stream of higher-scoring new items every cycle.
        let (mut deferred_passing, mut new_passing): (Vec<ScoredItem>, Vec<ScoredItem>) = passing
            .into_iter()
            .partition(|s| carried_fingerprints.contains(&s.fingerprint));
        deferred_passing.sort_by_key(|s| s.item.published_at);
        new_passing.sort_by(|a, b| {
            b.catalyst_score
                .partial_cmp(&a.catalyst_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.item.published_at.cmp(&a.item.published_at))
        });

        let cap = self.config.max_alerts_per_cycle;
        let mut to_post: Vec<ScoredItem> = Vec::with_capacity(cap.min(deferred_passing.len() + new_passing.len()));
        let mut overflow: Vec<ScoredItem> = Vec::new();

        let deferred_take = deferred_passing.len().min(cap);
        to_post.extend(deferred_passing.drain(..deferred_take));
        overflow.extend(deferred_passing);

        let remaining_cap = cap.saturating_sub(to_post.len());
        let new_take = new_passing.len().min(remaining_cap);
        to_post.extend(new_passing.drain(..new_take));
        overflow.extend(new_passing);

        if !overflow.is_empty() {
            let mut deferred = self.deferred.lock().await;
            let overflow_len = overflow.len();
            deferred.extend(overflow);
            info!(overflow = overflow_len, "deferring excess alerts to next cycle");
        }

        let sec_analyses = self.run_llm_analysis(&to_post).await;

        for scored in &to_post {
            let ticker = scored.primary_ticker.clone().unwrap_or_default();
            let ticker_enrichment = enrichment.get(&ticker);
            let sec_analysis = sec_analyses.get(&scored.fingerprint.to_hex());
            let alert: Alert = AlertFormatter::format(
                scored,
                &ticker,
                ticker_enrichment,
                sec_analysis,
                self.config.trade_plan_enabled,
            );

            match self.webhook.post(&alert).await {
                PostOutcome::Posted { .. } => {
                    stats.alerts_sent += 1;
                    self.events_log.record(&Event::AlertPosted {
                        ticker: &ticker,
                        idempotency_key: &alert.idempotency_key,
                        catalyst_score: scored.catalyst_score,
                        cycle_id,
                    });
                    if let Err(err) = self.seen_store.record(&SeenRecord {
                        fingerprint: scored.fingerprint.to_hex(),
                        first_seen_at: Utc::now(),
                        source: scored.item.source.clone(),
                        weight: scored.source_weight.round() as i32,
                    }) {
                        warn!(error = %err, "seen-store write failed after successful post");
                    }
                }
                PostOutcome::Failed { status } => {
                    stats.alerts_failed += 1;
                    self.events_log.record(&Event::AlertFailed {
                        ticker: &ticker,
                        idempotency_key: &alert.idempotency_key,
                        status,
                        cycle_id,
                    });
                }
            }
        }

        stats
    }

    /// Fetches every source concurrently, tagging each item with its
    /// source's trust weight (spec.md §3 `SeenRecord.weight`) so dedup can
    /// later prefer the higher-weighted source on a collision.
    async fn fetch_all(&self) -> Vec<(NewsItem, f64)> {
        use futures::future::join_all;
        use tokio::sync::Semaphore;

        let sem = Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1)));
        let futures = self.sources.iter().map(|source| {
            let sem = sem.clone();
            let timeout = self.config.fetch_timeout();
            let weight = source.weight();
            async move {
                let Ok(_permit) = sem.acquire().await else {
                    return Vec::new();
                };
                let items = match tokio::time::timeout(timeout, source.fetch()).await {
                    Ok(Ok(items)) => items,
                    Ok(Err(err)) => {
                        warn!(source = source.name(), error = %err, "feed fetch failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(source = source.name(), "feed fetch timed out");
                        Vec::new()
                    }
                };
                items.into_iter().map(|item| (item, weight)).collect::<Vec<_>>()
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }

    fn passes_intake(&self, item: &NewsItem) -> bool {
        if !item.is_well_formed() {
            return false;
        }
        let age = Utc::now() - item.published_at;
        let max_age_minutes = if item.is_sec() {
            self.config.max_sec_filing_age_minutes
        } else {
            self.config.max_article_age_minutes
        };
        age.num_minutes() <= max_age_minutes
    }

    async fn notify_admin(&self, message: &str) {
        let Some(admin_webhook) = &self.admin_webhook else {
            return;
        };
        let alert = Alert {
            ticker: "ADMIN".to_string(),
            title: "Orchestrator notice".to_string(),
            link: String::new(),
            content_text: message.to_string(),
            embed: crate::models::Embed {
                title: "Orchestrator notice".to_string(),
                url: None,
                color: 0xE6_7E_22,
                fields: vec![],
                footer: None,
                timestamp: Utc::now(),
            },
            components: None,
            idempotency_key: format!("admin-{}", Utc::now().timestamp()),
        };
        let _ = admin_webhook.post(&alert).await;
    }
}

fn scaffold(item: NewsItem, source_weight: f64) -> ScoredItem {
    let primary_ticker = item.tickers.first().cloned();
    let fingerprint = fingerprint::compute(&item);
    ScoredItem {
        item,
        fingerprint,
        primary_ticker,
        secondary_tickers: Vec::new(),
        keyword_hits: HashMap::new(),
        catalyst_score: 0.0,
        sentiment: Default::default(),
        relevance_scores: HashMap::new(),
        classification_ts: Utc::now(),
        source_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn market_session_open_during_regular_hours() {
        let noon_utc = chrono::Utc.with_ymd_and_hms(2026, 7, 30, 15, 0, 0).unwrap();
        assert_eq!(market_session(noon_utc), MarketSession::Open);
    }

    #[test]
    fn market_session_closed_overnight() {
        let midnight_utc = chrono::Utc.with_ymd_and_hms(2026, 7, 30, 3, 0, 0).unwrap();
        assert_eq!(market_session(midnight_utc), MarketSession::Closed);
    }

    #[test]
    fn scaffold_populates_fingerprint_from_first_ticker() {
        let item = NewsItem {
            source: "prnewswire".to_string(),
            source_id: "1".to_string(),
            canonical_url: "https://example.com".to_string(),
            title: "Acme wins FDA approval".to_string(),
            summary: "summary".to_string(),
            published_at: Utc::now(),
            tickers: vec!["ACME".to_string()],
            raw_fields: HashMap::new(),
        };
        let scored = scaffold(item, 1.0);
        assert_eq!(scored.primary_ticker, Some("ACME".to_string()));
        assert_eq!(scored.source_weight, 1.0);
    }
}
